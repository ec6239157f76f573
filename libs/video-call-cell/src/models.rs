// libs/video-call-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use shared_models::{AppointmentId, ParticipantInfo};

use crate::services::timer::format_duration;

// ==============================================================================
// ROOMS
// ==============================================================================

/// Signaling room scoping the two participants of one appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub const APPOINTMENT_PREFIX: &'static str = "appointment_";

    /// Deterministic room name; both sides derive it independently.
    pub fn for_appointment(appointment_id: &AppointmentId) -> Self {
        Self(format!("{}{}", Self::APPOINTMENT_PREFIX, appointment_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==============================================================================
// MEDIA
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Which track kinds to request from the capture hardware.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl MediaConstraints {
    pub fn kinds(&self) -> Vec<MediaKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.audio {
            kinds.push(MediaKind::Audio);
        }
        if self.video {
            kinds.push(MediaKind::Video);
        }
        kinds
    }
}

/// Per-kind enabled flags for the local tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
        }
    }
}

impl MediaState {
    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_enabled,
            MediaKind::Video => self.video_enabled,
        }
    }

    pub fn set(&mut self, kind: MediaKind, enabled: bool) {
        match kind {
            MediaKind::Audio => self.audio_enabled = enabled,
            MediaKind::Video => self.video_enabled = enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, cheaply clonable reference to a media stream.
///
/// The platform object behind the handle (a capture session, a remote track)
/// is carried as `dyn Any` so the rendering layer can downcast to whatever its
/// platform produces. Equality is by stream id and track kinds.
#[derive(Clone)]
pub struct MediaStreamHandle {
    id: StreamId,
    kinds: Vec<MediaKind>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl MediaStreamHandle {
    pub fn new(id: StreamId, kinds: Vec<MediaKind>, inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { id, kinds, inner }
    }

    /// Handle with no platform object attached.
    pub fn detached(id: StreamId, kinds: Vec<MediaKind>) -> Self {
        Self::new(id, kinds, Arc::new(()))
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn kinds(&self) -> &[MediaKind] {
        &self.kinds
    }

    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamHandle")
            .field("id", &self.id)
            .field("kinds", &self.kinds)
            .finish()
    }
}

impl PartialEq for MediaStreamHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kinds == other.kinds
    }
}

impl Eq for MediaStreamHandle {}

// ==============================================================================
// NEGOTIATION PAYLOADS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SdpType {
    #[serde(rename = "offer")]
    Offer,
    #[serde(rename = "answer")]
    Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none", default)]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

// ==============================================================================
// EVENTS
// ==============================================================================

/// Inbound events delivered by the signaling channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingEvent {
    PeerJoined { participant: ParticipantInfo },
    PeerLeft { user_id: String },
    OfferReceived { description: SessionDescription },
    AnswerReceived { description: SessionDescription },
    CandidateReceived { candidate: IceCandidate },
}

impl SignalingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SignalingEvent::PeerJoined { .. } => "peer_joined",
            SignalingEvent::PeerLeft { .. } => "peer_left",
            SignalingEvent::OfferReceived { .. } => "offer_received",
            SignalingEvent::AnswerReceived { .. } => "answer_received",
            SignalingEvent::CandidateReceived { .. } => "candidate_received",
        }
    }
}

/// Connectivity of the peer-to-peer transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportState {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "closed")]
    Closed,
}

/// Reports raised by a transport object while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    RemoteStream(MediaStreamHandle),
    StateChanged(TransportState),
}

// ==============================================================================
// OBSERVATION SURFACE
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Idle => "Idle",
            ConnectionStatus::Connecting => "Connecting…",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// What the call screen should be showing, derived from status and `call_started`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Initializing,
    WaitingForPeer,
    Live,
    /// The peer left before any media arrived.
    PeerLeft,
    /// Media had been flowing and the connection dropped.
    Interrupted,
    Failed,
}

/// Snapshot published to the presentation layer on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct CallObservation {
    pub status: ConnectionStatus,
    pub call_started: bool,
    pub duration_seconds: u64,
    pub local_stream: Option<MediaStreamHandle>,
    pub remote_stream: Option<MediaStreamHandle>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub last_error: Option<String>,
    pub room_id: Option<RoomId>,
}

impl Default for CallObservation {
    fn default() -> Self {
        let media = MediaState::default();
        Self {
            status: ConnectionStatus::Idle,
            call_started: false,
            duration_seconds: 0,
            local_stream: None,
            remote_stream: None,
            audio_enabled: media.audio_enabled,
            video_enabled: media.video_enabled,
            last_error: None,
            room_id: None,
        }
    }
}

impl CallObservation {
    pub fn phase(&self) -> CallPhase {
        match (self.status, self.call_started) {
            (ConnectionStatus::Idle, _) => CallPhase::Idle,
            (ConnectionStatus::Connecting, _) => CallPhase::Initializing,
            (ConnectionStatus::Connected, false) => CallPhase::WaitingForPeer,
            (ConnectionStatus::Connected, true) => CallPhase::Live,
            (ConnectionStatus::Disconnected, false) => CallPhase::PeerLeft,
            (ConnectionStatus::Disconnected, true) => CallPhase::Interrupted,
            (ConnectionStatus::Failed, _) => CallPhase::Failed,
        }
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_seconds)
    }

    pub fn media_state(&self) -> MediaState {
        MediaState {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
        }
    }
}
