//! Interface to the media transport engine.
//!
//! The router never parses SDP, gathers candidates or moves RTP itself. It drives an
//! engine through the traits below and only passes the engine's own values between
//! calls. Every engine object is shared behind an `Arc<dyn ...>` so publishers and
//! subscribers can hold on to them independently of the router.
//!
//! Engine calls may block. The router never holds its lock across negotiation.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::EngineError;

/// Kind of a media section or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A codec offered or accepted in a media section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
}

/// Negotiated parameters of one media section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub kind: MediaKind,
    pub codecs: Vec<Codec>,
}

/// What the router is willing to accept for one media kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capability {
    /// Accepted codec names, matched case-insensitively.
    pub codecs: Vec<String>,
    pub rtcp_feedback: Vec<String>,
    pub extensions: Vec<String>,
}

impl Capability {
    pub fn with_codecs<I, S>(codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codecs: codecs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn accepts(&self, codec: &str) -> bool {
        self.codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }
}

/// Capability set of a router, keyed by media kind. Opaque to the router itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    by_kind: HashMap<MediaKind, Capability>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: MediaKind, capability: Capability) -> Self {
        self.by_kind.insert(kind, capability);
        self
    }

    pub fn get(&self, kind: MediaKind) -> Option<&Capability> {
        self.by_kind.get(&kind)
    }
}

/// A track announced inside a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: MediaKind,
}

/// A stream announced in an offer or added to an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: String,
    pub tracks: Vec<TrackInfo>,
}

impl StreamInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, id: impl Into<String>, kind: MediaKind) -> Self {
        self.tracks.push(TrackInfo {
            id: id.into(),
            kind,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceInfo {
    pub ufrag: String,
    pub pwd: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtlsInfo {
    /// Hash function of the fingerprint, e.g. `sha-256`.
    pub hash: String,
    pub fingerprint: String,
}

/// A local ICE candidate advertised in answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u16,
    pub transport: String,
    pub priority: u32,
    pub address: IpAddr,
    pub port: u16,
}

impl Candidate {
    /// A UDP host candidate.
    pub fn host(address: IpAddr, port: u16) -> Self {
        Self {
            foundation: "1".to_string(),
            component: 1,
            transport: "udp".to_string(),
            priority: 2_130_706_431,
            address,
            port,
        }
    }
}

/// Entry point of the engine: parses offers and creates transports.
pub trait Endpoint: Send + Sync {
    fn parse_offer(&self, sdp: &str) -> Result<Box<dyn Offer>, EngineError>;

    fn create_transport(&self, offer: &dyn Offer) -> Result<Arc<dyn Transport>, EngineError>;

    fn local_candidates(&self) -> Vec<Candidate>;
}

/// A parsed remote offer.
pub trait Offer: Send + Sync {
    fn media(&self, kind: MediaKind) -> Option<MediaDescription>;

    /// The first stream announced by the remote side, if any.
    fn first_stream(&self) -> Option<StreamInfo>;

    fn answer(
        &self,
        ice: &IceInfo,
        dtls: &DtlsInfo,
        candidates: &[Candidate],
        capabilities: &Capabilities,
    ) -> Result<Box<dyn Answer>, EngineError>;
}

/// A local answer under construction.
pub trait Answer: Send + Sync {
    fn media(&self, kind: MediaKind) -> Option<MediaDescription>;

    fn add_stream(&mut self, stream: StreamInfo);

    /// Serialize the answer to the text sent back to the remote side.
    fn to_sdp(&self) -> String;
}

/// A negotiated media transport.
pub trait Transport: Send + Sync {
    fn set_remote_properties(
        &self,
        audio: Option<MediaDescription>,
        video: Option<MediaDescription>,
    );

    fn set_local_properties(
        &self,
        audio: Option<MediaDescription>,
        video: Option<MediaDescription>,
    );

    fn local_ice_info(&self) -> IceInfo;

    fn local_dtls_info(&self) -> DtlsInfo;

    fn create_incoming_stream(
        &self,
        info: &StreamInfo,
    ) -> Result<Arc<dyn IncomingStream>, EngineError>;

    fn create_outgoing_stream(
        &self,
        id: &str,
        audio: bool,
        video: bool,
    ) -> Result<Arc<dyn OutgoingStream>, EngineError>;

    /// Release the transport. Engines must tolerate repeated calls.
    fn stop(&self);
}

pub trait IncomingStream: Send + Sync {
    fn id(&self) -> &str;

    fn video_tracks(&self) -> Vec<Arc<dyn IncomingTrack>>;

    fn audio_tracks(&self) -> Vec<Arc<dyn IncomingTrack>>;

    fn stop(&self);
}

pub trait IncomingTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;
}

pub trait OutgoingStream: Send + Sync {
    fn id(&self) -> &str;

    fn video_tracks(&self) -> Vec<Arc<dyn OutgoingTrack>>;

    fn audio_tracks(&self) -> Vec<Arc<dyn OutgoingTrack>>;

    fn stream_info(&self) -> StreamInfo;

    fn stop(&self);
}

pub trait OutgoingTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Start forwarding media from `source` into this track.
    fn attach_to(&self, source: &Arc<dyn IncomingTrack>) -> Result<(), EngineError>;
}
