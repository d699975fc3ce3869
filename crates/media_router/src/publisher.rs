use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::engine::{IncomingStream, IncomingTrack, Transport};

/// The single media producer of a routing domain.
///
/// A publisher either owns a negotiated incoming stream and its transport, or only
/// borrows tracks owned elsewhere (relaying another router's media). Audio-only and
/// video-only publishers are both valid.
pub struct Publisher {
    id: String,
    incoming: Option<Arc<dyn IncomingStream>>,
    video_track: Option<Arc<dyn IncomingTrack>>,
    audio_track: Option<Arc<dyn IncomingTrack>>,
    transport: Option<Arc<dyn Transport>>,
    stopped: AtomicBool,
}

impl Publisher {
    /// Wrap a negotiated incoming stream, taking its first video and first audio track.
    pub fn new(incoming: Arc<dyn IncomingStream>, transport: Arc<dyn Transport>) -> Self {
        let video_track = incoming.video_tracks().into_iter().next();
        let audio_track = incoming.audio_tracks().into_iter().next();

        Self {
            id: incoming.id().to_string(),
            incoming: Some(incoming),
            video_track,
            audio_track,
            transport: Some(transport),
            stopped: AtomicBool::new(false),
        }
    }

    /// Build a publisher from tracks owned by someone else. Stopping it releases nothing.
    pub fn with_tracks(
        id: impl Into<String>,
        video_track: Option<Arc<dyn IncomingTrack>>,
        audio_track: Option<Arc<dyn IncomingTrack>>,
    ) -> Self {
        Self {
            id: id.into(),
            incoming: None,
            video_track,
            audio_track,
            transport: None,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream(&self) -> Option<&Arc<dyn IncomingStream>> {
        self.incoming.as_ref()
    }

    pub fn video_track(&self) -> Option<&Arc<dyn IncomingTrack>> {
        self.video_track.as_ref()
    }

    pub fn audio_track(&self) -> Option<&Arc<dyn IncomingTrack>> {
        self.audio_track.as_ref()
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop the owned stream and transport.
    ///
    /// Only the first call reaches the engine; returns `false` for every later call.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Some(incoming) = &self.incoming {
            incoming.stop();
        }

        if let Some(transport) = &self.transport {
            transport.stop();
        }

        debug!(publisher_id = %self.id, "Publisher stopped");
        true
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .field("video", &self.video_track.as_ref().map(|t| t.id().to_string()))
            .field("audio", &self.audio_track.as_ref().map(|t| t.id().to_string()))
            .field("owns_transport", &self.transport.is_some())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Endpoint, MediaKind, Offer, StreamInfo};
    use crate::loopback::{LoopbackEngine, OfferBuilder};

    fn negotiated_stream(
        audio: bool,
        video: bool,
    ) -> (Arc<dyn IncomingStream>, Arc<dyn Transport>) {
        let engine = LoopbackEngine::new();
        let mut builder = OfferBuilder::publish("cam");
        if audio {
            builder = builder.audio();
        }
        if video {
            builder = builder.video();
        }
        let offer = engine.parse_offer(&builder.build()).unwrap();
        let transport = engine.create_transport(offer.as_ref()).unwrap();
        let info = offer.first_stream().unwrap();
        let incoming = transport.create_incoming_stream(&info).unwrap();
        (incoming, transport)
    }

    #[test]
    fn test_new_takes_first_tracks() {
        let (incoming, transport) = negotiated_stream(true, true);
        let publisher = Publisher::new(incoming, transport);

        assert_eq!(publisher.id(), "cam");
        assert_eq!(publisher.audio_track().unwrap().kind(), MediaKind::Audio);
        assert_eq!(publisher.video_track().unwrap().kind(), MediaKind::Video);
        assert!(publisher.transport().is_some());
        assert!(publisher.stream().is_some());
    }

    #[test]
    fn test_audio_only_publisher() {
        let (incoming, transport) = negotiated_stream(true, false);
        let publisher = Publisher::new(incoming, transport);

        assert!(publisher.audio_track().is_some());
        assert!(publisher.video_track().is_none());
    }

    #[test]
    fn test_stop_reaches_engine_once() {
        let engine = LoopbackEngine::new();
        let offer = engine
            .parse_offer(&OfferBuilder::publish("cam").video().build())
            .unwrap();
        let transport = engine.create_transport(offer.as_ref()).unwrap();
        let incoming = transport
            .create_incoming_stream(&StreamInfo::new("cam").with_track("v0", MediaKind::Video))
            .unwrap();
        let publisher = Publisher::new(incoming, transport);

        assert!(publisher.stop());
        assert!(!publisher.stop());
        assert!(publisher.is_stopped());

        let transports = engine.transports();
        assert_eq!(transports[0].stop_count(), 1);
        assert_eq!(transports[0].incoming_streams()[0].stop_count(), 1);
    }

    #[test]
    fn test_with_tracks_owns_nothing() {
        let (incoming, _transport) = negotiated_stream(true, true);
        let publisher = Publisher::with_tracks(
            "relay",
            incoming.video_tracks().into_iter().next(),
            None,
        );

        assert_eq!(publisher.id(), "relay");
        assert!(publisher.video_track().is_some());
        assert!(publisher.audio_track().is_none());
        assert!(publisher.stream().is_none());
        assert!(publisher.transport().is_none());
        assert!(publisher.stop());
    }
}
