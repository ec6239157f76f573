use thiserror::Error;

use shared_models::{AppointmentId, AppointmentStatus};

use crate::models::{MediaKind, RoomId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission to use the capture device was denied")]
    PermissionDenied,

    #[error("No {kind} capture device available")]
    NotFound { kind: MediaKind },

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Signaling service unreachable: {0}")]
    Unreachable(String),

    #[error("Room {room} already has two participants")]
    RoomFull { room: RoomId },

    #[error("Not joined to any room")]
    NotJoined,

    #[error("Signaling request rejected: {0}")]
    Rejected(String),

    #[error("Signaling request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport setup failed: {0}")]
    Setup(String),

    #[error("Session description error: {0}")]
    Description(String),

    #[error("ICE candidate error: {0}")]
    Candidate(String),

    #[error("Transport connection failed")]
    ConnectionFailed,

    #[error("Local stream is not supported by this transport")]
    UnsupportedStream,

    #[error("Transport already closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    RemoteLeft,
    TransportLost,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::RemoteLeft => f.write_str("remote participant left"),
            DisconnectReason::TransportLost => f.write_str("transport connection lost"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(#[from] DeviceError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Negotiation error: {0}")]
    Negotiation(#[from] TransportError),

    #[error("Peer disconnected: {reason}")]
    PeerDisconnected { reason: DisconnectReason },

    #[error("Appointment {appointment_id} is {status}; only confirmed appointments can start a call")]
    AppointmentNotConfirmed {
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    },

    #[error("Invalid call request: {0}")]
    InvalidRequest(String),

    #[error("Local media already acquired")]
    MediaAlreadyAcquired,

    #[error("Call controller is no longer running")]
    ControllerStopped,
}

impl CallError {
    /// Short message for the call screen. Never includes transport detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            CallError::MediaAcquisition(_) | CallError::MediaAlreadyAcquired => {
                "Unable to access camera or microphone. Please check your device permissions and try again."
            }
            CallError::Signaling(_) => {
                "Unable to reach the call service. Please check your connection and try again."
            }
            CallError::Negotiation(_) => {
                "Unable to establish a connection with the other participant."
            }
            CallError::PeerDisconnected {
                reason: DisconnectReason::RemoteLeft,
            } => "The other participant has left the call.",
            CallError::PeerDisconnected {
                reason: DisconnectReason::TransportLost,
            } => "Connection to the other participant was lost.",
            CallError::AppointmentNotConfirmed { .. } => {
                "Only confirmed appointments can start a video consultation."
            }
            CallError::InvalidRequest(_) => "This call cannot be started.",
            CallError::ControllerStopped => "The call has already been closed.",
        }
    }

    /// Errors that put the session into `failed`.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CallError::PeerDisconnected { .. })
    }
}
