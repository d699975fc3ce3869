use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::RegistryError;
use crate::router::MediaRouter;

/// Registry of live routers keyed by routing-domain id.
///
/// Entries are never evicted on their own. Whoever stops a router removes it.
#[derive(Debug)]
pub struct Routers {
    routers: DashMap<String, Arc<MediaRouter>, ahash::RandomState>,
}

impl Routers {
    pub fn new() -> Self {
        Self {
            routers: DashMap::default(),
        }
    }

    /// Look up a router. Returns `None` for unknown ids.
    pub fn get(&self, router_id: &str) -> Option<Arc<MediaRouter>> {
        self.routers.get(router_id).map(|r| Arc::clone(r.value()))
    }

    /// Register a router under its own id.
    ///
    /// Returns an error if a router with the same id is already registered.
    pub fn add(&self, router: Arc<MediaRouter>) -> Result<(), RegistryError> {
        use dashmap::mapref::entry::Entry;

        match self.routers.entry(router.id().to_string()) {
            Entry::Occupied(slot) => Err(RegistryError::RouterAlreadyExists(slot.key().clone())),
            Entry::Vacant(slot) => {
                info!(
                    router_id = %router.id(),
                    origin = router.is_origin(),
                    "Router registered"
                );
                slot.insert(router);
                Ok(())
            }
        }
    }

    /// Remove a router. Unknown ids are ignored.
    pub fn remove(&self, router_id: &str) -> Option<Arc<MediaRouter>> {
        let removed = self.routers.remove(router_id).map(|(_, router)| router);
        if removed.is_some() {
            info!(router_id = %router_id, "Router unregistered");
        }
        removed
    }

    pub fn contains(&self, router_id: &str) -> bool {
        self.routers.contains_key(router_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.routers.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}

impl Default for Routers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Capabilities, Endpoint};
    use crate::loopback::LoopbackEngine;

    fn router(id: &str) -> Arc<MediaRouter> {
        let endpoint: Arc<dyn Endpoint> = Arc::new(LoopbackEngine::new());
        Arc::new(MediaRouter::new(id, endpoint, Capabilities::new(), true))
    }

    #[test]
    fn test_add_and_get() {
        let routers = Routers::new();
        routers.add(router("r1")).unwrap();

        assert_eq!(routers.get("r1").unwrap().id(), "r1");
        assert!(routers.contains("r1"));
        assert_eq!(routers.len(), 1);
    }

    #[test]
    fn test_get_unknown_is_none() {
        let routers = Routers::new();
        assert!(routers.get("missing").is_none());
        assert!(routers.is_empty());
    }

    #[test]
    fn test_remove_then_get() {
        let routers = Routers::new();
        routers.add(router("r1")).unwrap();

        assert!(routers.remove("r1").is_some());
        assert!(routers.get("r1").is_none());
        assert!(routers.remove("r1").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let routers = Routers::new();
        let first = router("r1");
        routers.add(Arc::clone(&first)).unwrap();

        let result = routers.add(router("r1"));
        assert!(matches!(result, Err(RegistryError::RouterAlreadyExists(id)) if id == "r1"));
        assert!(Arc::ptr_eq(&routers.get("r1").unwrap(), &first));
    }

    #[test]
    fn test_re_add_after_remove() {
        let routers = Routers::new();
        routers.add(router("r1")).unwrap();
        routers.remove("r1");

        routers.add(router("r1")).unwrap();
        assert_eq!(routers.ids(), vec!["r1".to_string()]);
    }
}
