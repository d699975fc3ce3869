use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::engine::{
    Answer, Capabilities, Endpoint, IncomingTrack, MediaKind, Offer, OutgoingStream, OutgoingTrack,
    Transport,
};
use crate::error::{Precondition, RouterError};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

/// Observable lifecycle phase of a [`MediaRouter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPhase {
    /// No publisher yet.
    Empty,
    /// A publisher is live, with `subscribers` consumers attached.
    Publishing { subscribers: usize },
    /// Torn down. Every later create call is rejected.
    Stopped,
}

struct RouterState {
    publisher: Option<Arc<Publisher>>,
    subscribers: HashMap<String, Arc<Subscriber>>,
    origin_url: Option<Url>,
    stopped: bool,
}

/// Output of one offer/answer exchange, before any stream is created on the transport.
struct Negotiated {
    offer: Box<dyn Offer>,
    transport: Arc<dyn Transport>,
    answer: Box<dyn Answer>,
}

/// One routing domain: at most one publisher fanned out to any number of subscribers.
///
/// All mutable state sits behind a single lock. Negotiation with the engine runs
/// outside of it; the lock is only taken to snapshot the publisher and to mutate
/// the publisher slot or the subscriber map.
pub struct MediaRouter {
    id: String,
    origin: bool,
    capabilities: Capabilities,
    endpoint: Arc<dyn Endpoint>,
    state: Mutex<RouterState>,
}

impl MediaRouter {
    pub fn new(
        id: impl Into<String>,
        endpoint: Arc<dyn Endpoint>,
        capabilities: Capabilities,
        origin: bool,
    ) -> Self {
        Self {
            id: id.into(),
            origin,
            capabilities,
            endpoint,
            state: Mutex::new(RouterState {
                publisher: None,
                subscribers: HashMap::new(),
                origin_url: None,
                stopped: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this router is the authoritative origin of its stream rather than a relay.
    pub fn is_origin(&self) -> bool {
        self.origin
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn publisher(&self) -> Option<Arc<Publisher>> {
        self.state.lock().publisher.clone()
    }

    /// Install a publisher built elsewhere, typically from relayed tracks.
    ///
    /// Returns the publisher it replaced, which the caller is responsible for stopping.
    /// Replacing is refused while subscribers are attached to the current publisher.
    pub fn set_publisher(
        &self,
        publisher: Arc<Publisher>,
    ) -> Result<Option<Arc<Publisher>>, RouterError> {
        let mut state = self.state.lock();
        self.check_replaceable(&state)?;

        info!(
            router_id = %self.id,
            publisher_id = %publisher.id(),
            "Publisher set"
        );
        Ok(state.publisher.replace(publisher))
    }

    pub fn set_origin_url(&self, url: Url) {
        self.state.lock().origin_url = Some(url);
    }

    pub fn origin_url(&self) -> Option<Url> {
        self.state.lock().origin_url.clone()
    }

    /// Snapshot of the current subscribers keyed by id.
    pub fn subscribers(&self) -> HashMap<String, Arc<Subscriber>> {
        self.state.lock().subscribers.clone()
    }

    pub fn subscriber(&self, subscriber_id: &str) -> Option<Arc<Subscriber>> {
        self.state.lock().subscribers.get(subscriber_id).cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn phase(&self) -> RouterPhase {
        let state = self.state.lock();
        if state.stopped {
            RouterPhase::Stopped
        } else if state.publisher.is_some() {
            RouterPhase::Publishing {
                subscribers: state.subscribers.len(),
            }
        } else {
            RouterPhase::Empty
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Negotiate `sdp` as the router's inbound stream and install it as the publisher.
    ///
    /// Returns the publisher and the serialized answer. A previous publisher without
    /// subscribers is replaced and stopped.
    pub fn create_publisher(&self, sdp: &str) -> Result<(Arc<Publisher>, String), RouterError> {
        self.check_replaceable(&self.state.lock())?;

        let negotiated = self.negotiate(sdp)?;
        let publisher = match Self::open_incoming(&negotiated) {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                negotiated.transport.stop();
                return Err(e);
            }
        };

        let previous = {
            let mut state = self.state.lock();
            match self.check_replaceable(&state) {
                Ok(()) => state.publisher.replace(Arc::clone(&publisher)),
                Err(e) => {
                    drop(state);
                    publisher.stop();
                    return Err(e.into());
                }
            }
        };

        if let Some(previous) = previous {
            info!(
                router_id = %self.id,
                previous_id = %previous.id(),
                "Replacing publisher"
            );
            previous.stop();
        }

        info!(
            router_id = %self.id,
            publisher_id = %publisher.id(),
            audio = publisher.audio_track().is_some(),
            video = publisher.video_track().is_some(),
            "Publisher created"
        );

        Ok((publisher, negotiated.answer.to_sdp()))
    }

    /// Negotiate `sdp` as a new consumer of the current publisher.
    ///
    /// The outgoing stream gets an audio leg exactly when the publisher has an audio
    /// track, and likewise for video. Fails with [`Precondition::NoPublisher`] and
    /// touches nothing when there is no publisher.
    pub fn create_subscriber(&self, sdp: &str) -> Result<(Arc<Subscriber>, String), RouterError> {
        let publisher = {
            let state = self.state.lock();
            if state.stopped {
                return Err(self.stopped_error().into());
            }
            state
                .publisher
                .clone()
                .ok_or_else(|| Precondition::NoPublisher {
                    router_id: self.id.clone(),
                })?
        };

        let mut negotiated = self.negotiate(sdp)?;

        let subscriber_id = Uuid::new_v4().to_string();
        let outgoing = match Self::open_outgoing(&negotiated.transport, &subscriber_id, &publisher)
        {
            Ok(outgoing) => outgoing,
            Err(e) => {
                negotiated.transport.stop();
                return Err(e);
            }
        };

        let subscriber = Arc::new(Subscriber::new(
            subscriber_id.clone(),
            publisher.id().to_string(),
            Arc::clone(&outgoing),
            Arc::clone(&negotiated.transport),
        ));

        {
            let mut state = self.state.lock();
            let rejection = if state.stopped {
                Some(self.stopped_error())
            } else {
                match &state.publisher {
                    Some(current) if Arc::ptr_eq(current, &publisher) => None,
                    _ => Some(Precondition::PublisherChanged {
                        router_id: self.id.clone(),
                        expected: publisher.id().to_string(),
                    }),
                }
            };

            if let Some(reason) = rejection {
                drop(state);
                warn!(
                    router_id = %self.id,
                    subscriber_id = %subscriber_id,
                    error = %reason,
                    "Discarding negotiated subscriber"
                );
                subscriber.stop();
                return Err(reason.into());
            }

            state
                .subscribers
                .insert(subscriber_id.clone(), Arc::clone(&subscriber));
        }

        negotiated.answer.add_stream(outgoing.stream_info());

        info!(
            router_id = %self.id,
            subscriber_id = %subscriber_id,
            publisher_id = %publisher.id(),
            "Subscriber added"
        );

        Ok((subscriber, negotiated.answer.to_sdp()))
    }

    /// Stop and remove a subscriber. Unknown ids are ignored.
    ///
    /// Returns whether a subscriber was removed.
    pub fn stop_subscriber(&self, subscriber_id: &str) -> bool {
        let removed = self.state.lock().subscribers.remove(subscriber_id);

        match removed {
            Some(subscriber) => {
                subscriber.stop();
                info!(
                    router_id = %self.id,
                    subscriber_id = %subscriber_id,
                    "Subscriber removed"
                );
                true
            }
            None => {
                debug!(
                    router_id = %self.id,
                    subscriber_id = %subscriber_id,
                    "Subscriber not found, nothing to stop"
                );
                false
            }
        }
    }

    /// Stop the publisher and every subscriber, then clear them, in one lock acquisition.
    ///
    /// The router stays stopped afterwards. Returns `false` when it already was.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }
        state.stopped = true;

        if let Some(publisher) = state.publisher.take() {
            publisher.stop();
        }

        let subscribers = std::mem::take(&mut state.subscribers);
        for subscriber in subscribers.values() {
            subscriber.stop();
        }

        info!(
            router_id = %self.id,
            subscribers = subscribers.len(),
            "Router stopped"
        );
        true
    }

    fn check_replaceable(&self, state: &RouterState) -> Result<(), Precondition> {
        if state.stopped {
            return Err(self.stopped_error());
        }

        if let Some(current) = &state.publisher {
            if !state.subscribers.is_empty() {
                return Err(Precondition::PublisherHasSubscribers {
                    router_id: self.id.clone(),
                    publisher_id: current.id().to_string(),
                    subscribers: state.subscribers.len(),
                });
            }
        }

        Ok(())
    }

    fn stopped_error(&self) -> Precondition {
        Precondition::Stopped {
            router_id: self.id.clone(),
        }
    }

    fn negotiate(&self, sdp: &str) -> Result<Negotiated, RouterError> {
        let offer = self.endpoint.parse_offer(sdp)?;
        let transport = self.endpoint.create_transport(offer.as_ref())?;
        transport.set_remote_properties(
            offer.media(MediaKind::Audio),
            offer.media(MediaKind::Video),
        );

        let answer = match offer.answer(
            &transport.local_ice_info(),
            &transport.local_dtls_info(),
            &self.endpoint.local_candidates(),
            &self.capabilities,
        ) {
            Ok(answer) => answer,
            Err(e) => {
                transport.stop();
                return Err(e.into());
            }
        };
        transport.set_local_properties(
            answer.media(MediaKind::Audio),
            answer.media(MediaKind::Video),
        );

        Ok(Negotiated {
            offer,
            transport,
            answer,
        })
    }

    fn open_incoming(negotiated: &Negotiated) -> Result<Publisher, RouterError> {
        let info = negotiated.offer.first_stream().ok_or_else(|| {
            RouterError::MalformedOffer("offer does not announce a media stream".to_string())
        })?;
        let incoming = negotiated.transport.create_incoming_stream(&info)?;

        Ok(Publisher::new(incoming, Arc::clone(&negotiated.transport)))
    }

    fn open_outgoing(
        transport: &Arc<dyn Transport>,
        subscriber_id: &str,
        publisher: &Publisher,
    ) -> Result<Arc<dyn OutgoingStream>, RouterError> {
        let audio = publisher.audio_track();
        let video = publisher.video_track();
        let outgoing =
            transport.create_outgoing_stream(subscriber_id, audio.is_some(), video.is_some())?;

        let attached = [(MediaKind::Audio, audio), (MediaKind::Video, video)]
            .into_iter()
            .filter_map(|(kind, source)| source.map(|source| (kind, source)))
            .try_for_each(|(kind, source)| Self::attach_leg(outgoing.as_ref(), kind, source));

        if let Err(e) = attached {
            outgoing.stop();
            return Err(e);
        }

        Ok(outgoing)
    }

    fn attach_leg(
        outgoing: &dyn OutgoingStream,
        kind: MediaKind,
        source: &Arc<dyn IncomingTrack>,
    ) -> Result<(), RouterError> {
        let tracks: Vec<Arc<dyn OutgoingTrack>> = match kind {
            MediaKind::Audio => outgoing.audio_tracks(),
            MediaKind::Video => outgoing.video_tracks(),
        };
        let track = tracks.into_iter().next().ok_or_else(|| {
            RouterError::Negotiation(format!(
                "outgoing stream '{}' has no {kind} track",
                outgoing.id()
            ))
        })?;

        track.attach_to(source)?;
        Ok(())
    }
}

impl fmt::Debug for MediaRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaRouter")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Capability;
    use crate::loopback::{LoopbackEngine, OfferBuilder};
    use std::collections::HashSet;
    use std::thread;

    fn capabilities() -> Capabilities {
        Capabilities::new()
            .with(MediaKind::Audio, Capability::with_codecs(["opus"]))
            .with(MediaKind::Video, Capability::with_codecs(["vp8", "h264"]))
    }

    fn router_with(engine: &Arc<LoopbackEngine>, id: &str) -> MediaRouter {
        let endpoint: Arc<dyn Endpoint> = engine.clone();
        MediaRouter::new(id, endpoint, capabilities(), true)
    }

    fn publish_offer() -> String {
        OfferBuilder::publish("stream-1").audio().video().build()
    }

    fn play_offer() -> String {
        OfferBuilder::receive().audio().video().build()
    }

    #[test]
    fn test_publish_then_subscribe() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        assert_eq!(router.id(), "r1");
        assert!(router.is_origin());
        assert_eq!(router.phase(), RouterPhase::Empty);

        let (publisher, answer) = router.create_publisher(&publish_offer()).unwrap();
        assert_eq!(publisher.id(), "stream-1");
        assert!(!answer.is_empty());
        assert_eq!(router.phase(), RouterPhase::Publishing { subscribers: 0 });

        let (subscriber, answer) = router.create_subscriber(&play_offer()).unwrap();
        assert_eq!(subscriber.publisher_id(), publisher.id());
        assert!(answer.contains(&format!("a=msid:{}", subscriber.id())));
        assert_eq!(router.phase(), RouterPhase::Publishing { subscribers: 1 });
        assert!(router.subscriber(subscriber.id()).is_some());
    }

    #[test]
    fn test_subscribe_without_publisher() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");

        let result = router.create_subscriber(&play_offer());
        assert!(matches!(
            result,
            Err(RouterError::Precondition(Precondition::NoPublisher { .. }))
        ));
        assert_eq!(router.phase(), RouterPhase::Empty);
        assert!(router.subscribers().is_empty());
        assert!(engine.transports().is_empty());
    }

    #[test]
    fn test_audio_only_publisher_yields_audio_only_subscriber() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");

        let offer = OfferBuilder::publish("radio").audio().build();
        let (publisher, _) = router.create_publisher(&offer).unwrap();
        let (subscriber, _) = router.create_subscriber(&play_offer()).unwrap();

        let stream = subscriber.stream();
        assert_eq!(stream.audio_tracks().len(), 1);
        assert!(stream.video_tracks().is_empty());

        let transports = engine.transports();
        let outgoing = &transports[1].outgoing_streams()[0];
        let source = publisher.audio_track().unwrap().id().to_string();
        assert_eq!(outgoing.audio_legs()[0].attached_source(), Some(source));
    }

    #[test]
    fn test_stop_subscriber_twice() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        router.create_publisher(&publish_offer()).unwrap();
        let (subscriber, _) = router.create_subscriber(&play_offer()).unwrap();

        assert!(router.stop_subscriber(subscriber.id()));
        assert!(!router.stop_subscriber(subscriber.id()));
        assert!(subscriber.is_stopped());
        assert_eq!(router.subscriber_count(), 0);
        assert_eq!(engine.transports()[1].stop_count(), 1);
    }

    #[test]
    fn test_stop_clears_publisher_and_subscribers() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        let (publisher, _) = router.create_publisher(&publish_offer()).unwrap();
        let subscribers: Vec<_> = (0..5)
            .map(|_| router.create_subscriber(&play_offer()).unwrap().0)
            .collect();

        assert!(router.stop());
        assert!(router.publisher().is_none());
        assert!(router.subscribers().is_empty());
        assert_eq!(router.phase(), RouterPhase::Stopped);
        assert!(publisher.is_stopped());
        assert!(subscribers.iter().all(|s| s.is_stopped()));
        assert!(engine.transports().iter().all(|t| t.stop_count() == 1));

        assert!(!router.stop());
    }

    #[test]
    fn test_create_after_stop_is_rejected() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        router.stop();

        assert!(matches!(
            router.create_publisher(&publish_offer()),
            Err(RouterError::Precondition(Precondition::Stopped { .. }))
        ));
        assert!(matches!(
            router.create_subscriber(&play_offer()),
            Err(RouterError::Precondition(Precondition::Stopped { .. }))
        ));
    }

    #[test]
    fn test_concurrent_subscribers() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        router.create_publisher(&publish_offer()).unwrap();

        let ids: Vec<String> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        let (subscriber, _) = router.create_subscriber(&play_offer()).unwrap();
                        subscriber.id().to_string()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = ids.iter().cloned().collect();
        assert_eq!(unique.len(), 16);

        let registered = router.subscribers();
        assert_eq!(registered.len(), 16);
        assert!(ids.iter().all(|id| registered.contains_key(id)));
    }

    #[test]
    fn test_concurrent_stop_runs_once() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        router.create_publisher(&publish_offer()).unwrap();
        for _ in 0..4 {
            router.create_subscriber(&play_offer()).unwrap();
        }

        let stopped = thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| router.stop())).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|stopped| *stopped)
                .count()
        });

        assert_eq!(stopped, 1);
        assert!(engine.transports().iter().all(|t| t.stop_count() == 1));
    }

    #[test]
    fn test_malformed_offer() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");

        let result = router.create_publisher("not an offer");
        assert!(matches!(result, Err(RouterError::MalformedOffer(_))));
        assert_eq!(router.phase(), RouterPhase::Empty);
    }

    #[test]
    fn test_publish_offer_without_stream() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");

        let result = router.create_publisher(&OfferBuilder::receive().audio().build());
        assert!(matches!(result, Err(RouterError::MalformedOffer(_))));
        assert!(router.publisher().is_none());
        assert_eq!(engine.transports()[0].stop_count(), 1);
    }

    #[test]
    fn test_negotiation_failure_releases_transport() {
        let engine = Arc::new(LoopbackEngine::new());
        let endpoint: Arc<dyn Endpoint> = engine.clone();
        let router = MediaRouter::new(
            "r1",
            endpoint,
            Capabilities::new().with(MediaKind::Video, Capability::with_codecs(["av1"])),
            true,
        );

        let result = router.create_publisher(&publish_offer());
        assert!(matches!(result, Err(RouterError::Negotiation(_))));
        assert!(router.publisher().is_none());
        assert_eq!(engine.transports()[0].stop_count(), 1);
    }

    #[test]
    fn test_replace_publisher_without_subscribers() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        let (first, _) = router.create_publisher(&publish_offer()).unwrap();

        let offer = OfferBuilder::publish("stream-2").video().build();
        let (second, _) = router.create_publisher(&offer).unwrap();

        assert!(first.is_stopped());
        assert!(!second.is_stopped());
        assert_eq!(router.publisher().unwrap().id(), "stream-2");
    }

    #[test]
    fn test_replace_publisher_with_subscribers_is_rejected() {
        let engine = Arc::new(LoopbackEngine::new());
        let router = router_with(&engine, "r1");
        let (first, _) = router.create_publisher(&publish_offer()).unwrap();
        router.create_subscriber(&play_offer()).unwrap();

        let result = router.create_publisher(&OfferBuilder::publish("stream-2").audio().build());
        assert!(matches!(
            result,
            Err(RouterError::Precondition(
                Precondition::PublisherHasSubscribers { subscribers: 1, .. }
            ))
        ));

        let relay = Arc::new(Publisher::with_tracks("relay", None, None));
        assert!(router.set_publisher(relay).is_err());
        assert_eq!(router.publisher().unwrap().id(), first.id());
        assert!(!first.is_stopped());
    }

    #[test]
    fn test_set_publisher_from_relayed_tracks() {
        let engine = Arc::new(LoopbackEngine::new());
        let source = router_with(&engine, "origin");
        let (origin_publisher, _) = source.create_publisher(&publish_offer()).unwrap();

        let endpoint: Arc<dyn Endpoint> = engine.clone();
        let relay = MediaRouter::new("edge", endpoint, capabilities(), false);
        relay.set_origin_url(Url::parse("https://origin.example/stream-1").unwrap());

        let publisher = Arc::new(Publisher::with_tracks(
            origin_publisher.id(),
            origin_publisher.video_track().cloned(),
            origin_publisher.audio_track().cloned(),
        ));
        assert!(relay.set_publisher(publisher).unwrap().is_none());

        let (subscriber, _) = relay.create_subscriber(&play_offer()).unwrap();
        assert_eq!(subscriber.publisher_id(), "stream-1");
        assert!(!relay.is_origin());
        assert_eq!(
            relay.origin_url().unwrap().as_str(),
            "https://origin.example/stream-1"
        );

        relay.stop();
        assert!(!origin_publisher.is_stopped());
    }

    /// Runs a one-shot action right after a transport is created, while the router is
    /// negotiating outside its lock.
    struct InterruptingEndpoint {
        engine: Arc<LoopbackEngine>,
        action: parking_lot::Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl InterruptingEndpoint {
        fn arm(&self, action: impl FnOnce() + Send + 'static) {
            *self.action.lock() = Some(Box::new(action));
        }
    }

    impl Endpoint for InterruptingEndpoint {
        fn parse_offer(&self, sdp: &str) -> Result<Box<dyn Offer>, crate::EngineError> {
            self.engine.parse_offer(sdp)
        }

        fn create_transport(
            &self,
            offer: &dyn Offer,
        ) -> Result<Arc<dyn Transport>, crate::EngineError> {
            let transport = self.engine.create_transport(offer)?;
            let action = self.action.lock().take();
            if let Some(action) = action {
                action();
            }
            Ok(transport)
        }

        fn local_candidates(&self) -> Vec<crate::engine::Candidate> {
            self.engine.local_candidates()
        }
    }

    fn interrupted_router() -> (Arc<LoopbackEngine>, Arc<InterruptingEndpoint>, Arc<MediaRouter>) {
        let engine = Arc::new(LoopbackEngine::new());
        let endpoint = Arc::new(InterruptingEndpoint {
            engine: Arc::clone(&engine),
            action: parking_lot::Mutex::new(None),
        });
        let shared: Arc<dyn Endpoint> = endpoint.clone();
        let router = Arc::new(MediaRouter::new("r1", shared, capabilities(), true));
        (engine, endpoint, router)
    }

    #[test]
    fn test_router_stopped_during_subscriber_negotiation() {
        let (engine, endpoint, router) = interrupted_router();
        router.create_publisher(&publish_offer()).unwrap();

        let weak = Arc::downgrade(&router);
        endpoint.arm(move || {
            if let Some(router) = weak.upgrade() {
                router.stop();
            }
        });

        let result = router.create_subscriber(&play_offer());
        assert!(matches!(
            result,
            Err(RouterError::Precondition(Precondition::Stopped { .. }))
        ));
        assert_eq!(router.subscriber_count(), 0);
        assert_eq!(router.phase(), RouterPhase::Stopped);

        let transports = engine.transports();
        assert_eq!(transports.len(), 2);
        assert_eq!(transports[1].stop_count(), 1);
        assert_eq!(transports[1].outgoing_streams()[0].stop_count(), 1);
    }

    #[test]
    fn test_publisher_replaced_during_subscriber_negotiation() {
        let (engine, endpoint, router) = interrupted_router();
        let (first, _) = router.create_publisher(&publish_offer()).unwrap();

        let weak = Arc::downgrade(&router);
        let video = first.video_track().cloned();
        let audio = first.audio_track().cloned();
        endpoint.arm(move || {
            if let Some(router) = weak.upgrade() {
                let relayed = Arc::new(Publisher::with_tracks("stream-2", video, audio));
                router.set_publisher(relayed).unwrap();
            }
        });

        let result = router.create_subscriber(&play_offer());
        match result {
            Err(RouterError::Precondition(Precondition::PublisherChanged { expected, .. })) => {
                assert_eq!(expected, first.id());
            }
            other => panic!("expected PublisherChanged, got {other:?}"),
        }
        assert_eq!(router.subscriber_count(), 0);
        assert_eq!(router.publisher().unwrap().id(), "stream-2");

        let transports = engine.transports();
        assert_eq!(transports.len(), 2);
        assert_eq!(transports[1].stop_count(), 1);
    }
}
