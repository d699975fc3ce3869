//! An in-memory transport engine.
//!
//! Understands just enough SDP to drive a [`MediaRouter`](crate::MediaRouter): the
//! version line, ICE credentials, the DTLS fingerprint, `m=` sections with their
//! `rtpmap` codecs and `msid` stream/track announcements. No packets are moved. Every
//! transport and stream it hands out is kept so callers can inspect stop calls and
//! track attachments afterwards.
//!
//! Meant for tests and demos: that record only shrinks through
//! [`LoopbackEngine::forget_stopped`], so a long-running process should not use it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::engine::{
    Answer, Candidate, Capabilities, Codec, DtlsInfo, Endpoint, IceInfo, IncomingStream,
    IncomingTrack, MediaDescription, MediaKind, Offer, OutgoingStream, OutgoingTrack, StreamInfo,
    TrackInfo, Transport,
};
use crate::error::EngineError;

const DEFAULT_RTC_PORT: u16 = 5000;
const MEDIA_PROTO: &str = "UDP/TLS/RTP/SAVPF";

fn malformed(reason: impl Into<String>) -> EngineError {
    EngineError::MalformedOffer(reason.into())
}

/// Engine entry point. Cheap to share behind an `Arc`.
///
/// Holds on to every transport it creates until [`LoopbackEngine::forget_stopped`].
#[derive(Debug)]
pub struct LoopbackEngine {
    candidates: Vec<Candidate>,
    transports: Mutex<Vec<Arc<LoopbackTransport>>>,
    next_transport: AtomicU64,
}

impl LoopbackEngine {
    /// An engine advertising a single localhost host candidate.
    pub fn new() -> Self {
        Self::with_candidates(vec![Candidate::host(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DEFAULT_RTC_PORT,
        )])
    }

    pub fn with_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            transports: Mutex::new(Vec::new()),
            next_transport: AtomicU64::new(0),
        }
    }

    /// Every transport created so far, in creation order.
    pub fn transports(&self) -> Vec<Arc<LoopbackTransport>> {
        self.transports.lock().clone()
    }

    /// Drop stopped transports from the record. Returns how many were dropped.
    pub fn forget_stopped(&self) -> usize {
        let mut transports = self.transports.lock();
        let before = transports.len();
        transports.retain(|t| !t.is_stopped());
        before - transports.len()
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for LoopbackEngine {
    fn parse_offer(&self, sdp: &str) -> Result<Box<dyn Offer>, EngineError> {
        Ok(Box::new(LoopbackOffer::parse(sdp)?))
    }

    fn create_transport(&self, _offer: &dyn Offer) -> Result<Arc<dyn Transport>, EngineError> {
        let n = self.next_transport.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::new(LoopbackTransport::new(n));
        self.transports.lock().push(Arc::clone(&transport));

        Ok(transport)
    }

    fn local_candidates(&self) -> Vec<Candidate> {
        self.candidates.clone()
    }
}

/// A parsed offer.
#[derive(Debug, Clone)]
pub struct LoopbackOffer {
    ice: IceInfo,
    dtls: Option<DtlsInfo>,
    sections: Vec<MediaDescription>,
    streams: Vec<StreamInfo>,
}

impl LoopbackOffer {
    pub fn parse(sdp: &str) -> Result<Self, EngineError> {
        let mut lines = sdp.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some("v=0") {
            return Err(malformed("missing 'v=0' version line"));
        }

        let mut ufrag = None;
        let mut pwd = None;
        let mut dtls = None;
        let mut sections: Vec<MediaDescription> = Vec::new();
        let mut streams: Vec<StreamInfo> = Vec::new();
        // Index of the section being read; `None` at session level or inside an
        // unsupported section.
        let mut current: Option<usize> = None;

        for line in lines {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(format!("invalid line '{line}'")))?;

            match key {
                "m" => {
                    current = match parse_media_line(value)? {
                        Some(section) => {
                            sections.push(section);
                            Some(sections.len() - 1)
                        }
                        None => None,
                    };
                }
                "a" => {
                    let (name, rest) = value.split_once(':').unwrap_or((value, ""));
                    match name {
                        "ice-ufrag" => ufrag = Some(rest.to_string()),
                        "ice-pwd" => pwd = Some(rest.to_string()),
                        "fingerprint" => {
                            let (hash, fingerprint) = rest
                                .split_once(' ')
                                .ok_or_else(|| malformed(format!("invalid fingerprint '{rest}'")))?;
                            dtls = Some(DtlsInfo {
                                hash: hash.to_string(),
                                fingerprint: fingerprint.to_string(),
                            });
                        }
                        "rtpmap" => {
                            if let Some(index) = current {
                                parse_rtpmap(rest, &mut sections[index])?;
                            }
                        }
                        "msid" => {
                            if let Some(index) = current {
                                parse_msid(rest, sections[index].kind, &mut streams)?;
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let (Some(ufrag), Some(pwd)) = (ufrag, pwd) else {
            return Err(malformed("missing ICE credentials"));
        };

        if sections.is_empty() {
            return Err(malformed("offer has no audio or video section"));
        }

        Ok(Self {
            ice: IceInfo { ufrag, pwd },
            dtls,
            sections,
            streams,
        })
    }

    pub fn ice(&self) -> &IceInfo {
        &self.ice
    }

    pub fn dtls(&self) -> Option<&DtlsInfo> {
        self.dtls.as_ref()
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }
}

/// Parses `<kind> <port> <proto> <payload types...>`. Returns `None` for media kinds
/// other than audio and video.
fn parse_media_line(value: &str) -> Result<Option<MediaDescription>, EngineError> {
    let mut fields = value.split_whitespace();
    let kind = match fields.next() {
        Some("audio") => MediaKind::Audio,
        Some("video") => MediaKind::Video,
        Some(_) => return Ok(None),
        None => return Err(malformed("empty media line")),
    };

    let (Some(_port), Some(_proto)) = (fields.next(), fields.next()) else {
        return Err(malformed(format!("incomplete media line '{value}'")));
    };

    let codecs = fields
        .map(|pt| {
            pt.parse::<u8>()
                .map(|payload_type| Codec {
                    payload_type,
                    name: String::new(),
                    clock_rate: 0,
                })
                .map_err(|_| malformed(format!("invalid payload type '{pt}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(MediaDescription { kind, codecs }))
}

/// Parses `<pt> <name>/<clock rate>[/<channels>]` into the matching codec of `section`.
fn parse_rtpmap(rest: &str, section: &mut MediaDescription) -> Result<(), EngineError> {
    let invalid = || malformed(format!("invalid rtpmap '{rest}'"));

    let (pt, encoding) = rest.split_once(' ').ok_or_else(invalid)?;
    let payload_type: u8 = pt.parse().map_err(|_| invalid())?;
    let mut parts = encoding.split('/');
    let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
    let clock_rate: u32 = parts
        .next()
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    if let Some(codec) = section
        .codecs
        .iter_mut()
        .find(|c| c.payload_type == payload_type)
    {
        codec.name = name.to_string();
        codec.clock_rate = clock_rate;
    }

    Ok(())
}

/// Parses `<stream id> <track id>` and records the track under its stream.
fn parse_msid(
    rest: &str,
    kind: MediaKind,
    streams: &mut Vec<StreamInfo>,
) -> Result<(), EngineError> {
    let (stream_id, track_id) = rest
        .split_once(' ')
        .ok_or_else(|| malformed(format!("invalid msid '{rest}'")))?;

    let track = TrackInfo {
        id: track_id.to_string(),
        kind,
    };
    match streams.iter_mut().find(|s| s.id == stream_id) {
        Some(stream) => stream.tracks.push(track),
        None => streams.push(StreamInfo {
            id: stream_id.to_string(),
            tracks: vec![track],
        }),
    }

    Ok(())
}

impl Offer for LoopbackOffer {
    fn media(&self, kind: MediaKind) -> Option<MediaDescription> {
        self.sections.iter().find(|s| s.kind == kind).cloned()
    }

    fn first_stream(&self) -> Option<StreamInfo> {
        self.streams.first().cloned()
    }

    fn answer(
        &self,
        ice: &IceInfo,
        dtls: &DtlsInfo,
        candidates: &[Candidate],
        capabilities: &Capabilities,
    ) -> Result<Box<dyn Answer>, EngineError> {
        let sections: Vec<MediaDescription> = self
            .sections
            .iter()
            .map(|offered| MediaDescription {
                kind: offered.kind,
                codecs: capabilities
                    .get(offered.kind)
                    .map(|cap| {
                        offered
                            .codecs
                            .iter()
                            .filter(|c| cap.accepts(&c.name))
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        if sections.iter().all(|s| s.codecs.is_empty()) {
            return Err(EngineError::Negotiation(
                "no codec in common with the offer".to_string(),
            ));
        }

        Ok(Box::new(LoopbackAnswer {
            ice: ice.clone(),
            dtls: dtls.clone(),
            candidates: candidates.to_vec(),
            sections,
            streams: Vec::new(),
        }))
    }
}

/// A local answer. Sections without a common codec are rendered as rejected.
#[derive(Debug, Clone)]
pub struct LoopbackAnswer {
    ice: IceInfo,
    dtls: DtlsInfo,
    candidates: Vec<Candidate>,
    sections: Vec<MediaDescription>,
    streams: Vec<StreamInfo>,
}

impl Answer for LoopbackAnswer {
    fn media(&self, kind: MediaKind) -> Option<MediaDescription> {
        self.sections
            .iter()
            .find(|s| s.kind == kind && !s.codecs.is_empty())
            .cloned()
    }

    fn add_stream(&mut self, stream: StreamInfo) {
        self.streams.push(stream);
    }

    fn to_sdp(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LoopbackAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v=0\r\n")?;
        write!(f, "o=- 0 0 IN IP4 0.0.0.0\r\n")?;
        write!(f, "s=-\r\n")?;
        write!(f, "t=0 0\r\n")?;
        write!(f, "a=ice-ufrag:{}\r\n", self.ice.ufrag)?;
        write!(f, "a=ice-pwd:{}\r\n", self.ice.pwd)?;
        write!(f, "a=fingerprint:{} {}\r\n", self.dtls.hash, self.dtls.fingerprint)?;

        for section in &self.sections {
            if section.codecs.is_empty() {
                write!(f, "m={} 0 {MEDIA_PROTO} 0\r\n", section.kind)?;
                write!(f, "a=inactive\r\n")?;
                continue;
            }

            let payload_types: Vec<String> = section
                .codecs
                .iter()
                .map(|c| c.payload_type.to_string())
                .collect();
            write!(f, "m={} 9 {MEDIA_PROTO} {}\r\n", section.kind, payload_types.join(" "))?;
            write!(f, "c=IN IP4 0.0.0.0\r\n")?;
            for codec in &section.codecs {
                write!(
                    f,
                    "a=rtpmap:{} {}/{}\r\n",
                    codec.payload_type, codec.name, codec.clock_rate
                )?;
            }
            for candidate in &self.candidates {
                write!(
                    f,
                    "a=candidate:{} {} {} {} {} {} typ host\r\n",
                    candidate.foundation,
                    candidate.component,
                    candidate.transport,
                    candidate.priority,
                    candidate.address,
                    candidate.port
                )?;
            }
            for stream in &self.streams {
                for track in stream.tracks.iter().filter(|t| t.kind == section.kind) {
                    write!(f, "a=msid:{} {}\r\n", stream.id, track.id)?;
                }
            }
        }

        Ok(())
    }
}

/// A transport. Records everything done to it.
#[derive(Debug)]
pub struct LoopbackTransport {
    id: String,
    ice: IceInfo,
    dtls: DtlsInfo,
    remote: Mutex<(Option<MediaDescription>, Option<MediaDescription>)>,
    local: Mutex<(Option<MediaDescription>, Option<MediaDescription>)>,
    incoming: Mutex<Vec<Arc<LoopbackIncomingStream>>>,
    outgoing: Mutex<Vec<Arc<LoopbackOutgoingStream>>>,
    stops: AtomicUsize,
}

impl LoopbackTransport {
    fn new(n: u64) -> Self {
        let fingerprint = Uuid::new_v4()
            .as_bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");

        Self {
            id: format!("transport-{n}"),
            ice: IceInfo {
                ufrag: format!("lb{n}"),
                pwd: Uuid::new_v4().simple().to_string(),
            },
            dtls: DtlsInfo {
                hash: "sha-256".to_string(),
                fingerprint,
            },
            remote: Mutex::new((None, None)),
            local: Mutex::new((None, None)),
            incoming: Mutex::new(Vec::new()),
            outgoing: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_count() > 0
    }

    /// Remote `(audio, video)` descriptions last set on the transport.
    pub fn remote_properties(&self) -> (Option<MediaDescription>, Option<MediaDescription>) {
        self.remote.lock().clone()
    }

    /// Local `(audio, video)` descriptions last set on the transport.
    pub fn local_properties(&self) -> (Option<MediaDescription>, Option<MediaDescription>) {
        self.local.lock().clone()
    }

    pub fn incoming_streams(&self) -> Vec<Arc<LoopbackIncomingStream>> {
        self.incoming.lock().clone()
    }

    pub fn outgoing_streams(&self) -> Vec<Arc<LoopbackOutgoingStream>> {
        self.outgoing.lock().clone()
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_stopped() {
            Err(EngineError::TransportClosed)
        } else {
            Ok(())
        }
    }
}

impl Transport for LoopbackTransport {
    fn set_remote_properties(
        &self,
        audio: Option<MediaDescription>,
        video: Option<MediaDescription>,
    ) {
        *self.remote.lock() = (audio, video);
    }

    fn set_local_properties(
        &self,
        audio: Option<MediaDescription>,
        video: Option<MediaDescription>,
    ) {
        *self.local.lock() = (audio, video);
    }

    fn local_ice_info(&self) -> IceInfo {
        self.ice.clone()
    }

    fn local_dtls_info(&self) -> DtlsInfo {
        self.dtls.clone()
    }

    fn create_incoming_stream(
        &self,
        info: &StreamInfo,
    ) -> Result<Arc<dyn IncomingStream>, EngineError> {
        self.ensure_open()?;

        let tracks_of = |kind: MediaKind| {
            info.tracks
                .iter()
                .filter(|t| t.kind == kind)
                .map(|t| {
                    Arc::new(LoopbackIncomingTrack {
                        id: t.id.clone(),
                        kind,
                    })
                })
                .collect::<Vec<_>>()
        };

        let stream = Arc::new(LoopbackIncomingStream {
            id: info.id.clone(),
            audio: tracks_of(MediaKind::Audio),
            video: tracks_of(MediaKind::Video),
            stops: AtomicUsize::new(0),
        });
        self.incoming.lock().push(Arc::clone(&stream));

        Ok(stream)
    }

    fn create_outgoing_stream(
        &self,
        id: &str,
        audio: bool,
        video: bool,
    ) -> Result<Arc<dyn OutgoingStream>, EngineError> {
        self.ensure_open()?;

        let leg = |kind: MediaKind| {
            Arc::new(LoopbackOutgoingTrack {
                id: format!("{id}-{kind}"),
                kind,
                attached: Mutex::new(None),
            })
        };

        let stream = Arc::new(LoopbackOutgoingStream {
            id: id.to_string(),
            audio: audio.then(|| leg(MediaKind::Audio)).into_iter().collect(),
            video: video.then(|| leg(MediaKind::Video)).into_iter().collect(),
            stops: AtomicUsize::new(0),
        });
        self.outgoing.lock().push(Arc::clone(&stream));

        Ok(stream)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct LoopbackIncomingTrack {
    id: String,
    kind: MediaKind,
}

impl IncomingTrack for LoopbackIncomingTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }
}

#[derive(Debug)]
pub struct LoopbackIncomingStream {
    id: String,
    audio: Vec<Arc<LoopbackIncomingTrack>>,
    video: Vec<Arc<LoopbackIncomingTrack>>,
    stops: AtomicUsize,
}

impl LoopbackIncomingStream {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }
}

impl IncomingStream for LoopbackIncomingStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_tracks(&self) -> Vec<Arc<dyn IncomingTrack>> {
        self.video
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn IncomingTrack>)
            .collect()
    }

    fn audio_tracks(&self) -> Vec<Arc<dyn IncomingTrack>> {
        self.audio
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn IncomingTrack>)
            .collect()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct LoopbackOutgoingTrack {
    id: String,
    kind: MediaKind,
    attached: Mutex<Option<String>>,
}

impl LoopbackOutgoingTrack {
    /// Id of the incoming track this leg forwards from, once attached.
    pub fn attached_source(&self) -> Option<String> {
        self.attached.lock().clone()
    }
}

impl OutgoingTrack for LoopbackOutgoingTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn attach_to(&self, source: &Arc<dyn IncomingTrack>) -> Result<(), EngineError> {
        if source.kind() != self.kind {
            return Err(EngineError::Negotiation(format!(
                "cannot attach {} track '{}' to {} track '{}'",
                self.kind,
                self.id,
                source.kind(),
                source.id()
            )));
        }

        *self.attached.lock() = Some(source.id().to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub struct LoopbackOutgoingStream {
    id: String,
    audio: Vec<Arc<LoopbackOutgoingTrack>>,
    video: Vec<Arc<LoopbackOutgoingTrack>>,
    stops: AtomicUsize,
}

impl LoopbackOutgoingStream {
    pub fn audio_legs(&self) -> Vec<Arc<LoopbackOutgoingTrack>> {
        self.audio.clone()
    }

    pub fn video_legs(&self) -> Vec<Arc<LoopbackOutgoingTrack>> {
        self.video.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }
}

impl OutgoingStream for LoopbackOutgoingStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn video_tracks(&self) -> Vec<Arc<dyn OutgoingTrack>> {
        self.video
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn OutgoingTrack>)
            .collect()
    }

    fn audio_tracks(&self) -> Vec<Arc<dyn OutgoingTrack>> {
        self.audio
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn OutgoingTrack>)
            .collect()
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id.clone(),
            tracks: self
                .audio
                .iter()
                .chain(self.video.iter())
                .map(|t| TrackInfo {
                    id: t.id.clone(),
                    kind: t.kind,
                })
                .collect(),
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::AcqRel);
    }
}

/// Builds offers the loopback engine understands.
///
/// ```
/// use media_router::loopback::OfferBuilder;
///
/// let offer = OfferBuilder::publish("cam").audio().video().build();
/// assert!(offer.contains("a=msid:cam cam-video"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct OfferBuilder {
    stream_id: Option<String>,
    audio: bool,
    video: bool,
}

impl OfferBuilder {
    /// An offer announcing a stream to be published.
    pub fn publish(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: Some(stream_id.into()),
            ..Default::default()
        }
    }

    /// A receive-only offer, as sent by a viewer.
    pub fn receive() -> Self {
        Self::default()
    }

    pub fn audio(mut self) -> Self {
        self.audio = true;
        self
    }

    pub fn video(mut self) -> Self {
        self.video = true;
        self
    }

    pub fn build(&self) -> String {
        let mut sdp = String::from(
            "v=0\r\n\
             o=- 1 1 IN IP4 127.0.0.1\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=ice-ufrag:remote\r\n\
             a=ice-pwd:remotepassword0000\r\n\
             a=fingerprint:sha-256 00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF\r\n",
        );

        if self.audio {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n");
            sdp.push_str("a=rtpmap:111 opus/48000/2\r\n");
            sdp.push_str("a=rtpmap:0 PCMU/8000\r\n");
            if let Some(stream_id) = &self.stream_id {
                sdp.push_str(&format!("a=msid:{stream_id} {stream_id}-audio\r\n"));
            }
        }

        if self.video {
            sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96 102\r\n");
            sdp.push_str("a=rtpmap:96 VP8/90000\r\n");
            sdp.push_str("a=rtpmap:102 H264/90000\r\n");
            if let Some(stream_id) = &self.stream_id {
                sdp.push_str(&format!("a=msid:{stream_id} {stream_id}-video\r\n"));
            }
        }

        sdp
    }
}
