// libs/video-call-cell/src/services/mod.rs

pub mod controller;
pub mod media;
pub mod peer;
pub mod signaling;
pub mod timer;
#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use controller::{CallServices, CallSessionController, CallSettings};
pub use media::{CapturedStream, MediaCapture, MediaDevices};
pub use peer::{PeerConnectionManager, PeerTransport, PeerTransportFactory, TransportEventSink};
pub use signaling::{InMemorySignalingClient, InMemorySignalingHub, SignalingClient};
pub use timer::{format_duration, CallTimer};
#[cfg(feature = "webrtc")]
pub use self::webrtc::{WebRtcLocalTracks, WebRtcPeerTransport, WebRtcRemoteStream, WebRtcTransportFactory};
