use dashmap::DashMap;
use std::hash::Hash;

/// What a signaling connection is currently bound to.
///
/// Both fields are empty on registration. A publishing connection has only
/// `stream_id` set, a playing one has both. While `pending` is set the connection has
/// reserved `stream_id` but the command that claimed it has not finished yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub stream_id: String,
    pub subscriber_id: String,
    pub pending: bool,
}

impl SessionInfo {
    pub fn is_idle(&self) -> bool {
        !self.pending && self.stream_id.is_empty() && self.subscriber_id.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_publishing(&self) -> bool {
        !self.pending && !self.stream_id.is_empty() && self.subscriber_id.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        !self.pending && !self.subscriber_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.stream_id.clear();
        self.subscriber_id.clear();
        self.pending = false;
    }
}

/// Registry of signaling connections keyed by an opaque handle.
///
/// Only guarantees safe concurrent access to the map. Keeping a binding consistent
/// with the routers is up to the signaling layer.
#[derive(Debug)]
pub struct Sessions<K>
where
    K: Eq + Hash,
{
    sessions: DashMap<K, SessionInfo, ahash::RandomState>,
}

impl<K> Sessions<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            sessions: DashMap::default(),
        }
    }

    /// Register a handle with an empty binding, resetting any previous one.
    pub fn add(&self, handle: K) {
        self.sessions.insert(handle, SessionInfo::default());
    }

    /// Snapshot of the handle's binding, `None` if the handle is unknown.
    pub fn get(&self, handle: &K) -> Option<SessionInfo> {
        self.sessions.get(handle).map(|s| s.value().clone())
    }

    /// Reserve an idle handle for `stream_id`, leaving the binding pending.
    ///
    /// The idle check and the reservation happen under the same entry guard, so of two
    /// concurrent callers at most one succeeds. Returns `None` if the handle is unknown
    /// and the current binding if it is not idle.
    pub fn try_bind(&self, handle: &K, stream_id: &str) -> Option<Result<(), SessionInfo>> {
        let mut entry = self.sessions.get_mut(handle)?;
        let info = entry.value_mut();
        if !info.is_idle() {
            return Some(Err(info.clone()));
        }

        info.stream_id = stream_id.to_string();
        info.pending = true;
        Some(Ok(()))
    }

    /// Mutate the handle's binding in place.
    ///
    /// Returns `None` without calling `f` if the handle is unknown.
    pub fn update<R>(&self, handle: &K, f: impl FnOnce(&mut SessionInfo) -> R) -> Option<R> {
        self.sessions.get_mut(handle).map(|mut s| f(s.value_mut()))
    }

    pub fn remove(&self, handle: &K) -> Option<SessionInfo> {
        self.sessions.remove(handle).map(|(_, info)| info)
    }

    pub fn contains(&self, handle: &K) -> bool {
        self.sessions.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<K> Default for Sessions<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
