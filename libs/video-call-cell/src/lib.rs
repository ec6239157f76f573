// libs/video-call-cell/src/lib.rs
//! # Video Call Cell
//!
//! Runs the live audio/video consultation between the doctor and the patient
//! of one confirmed appointment.
//!
//! ## Features
//!
//! - **Call Session Controller**: `idle → connecting → connected → disconnected/failed` state machine
//! - **Media Capture**: local camera/microphone acquisition with in-place track toggles
//! - **Peer Connection Management**: offer/answer exchange with trickled ICE candidate buffering
//! - **Signaling Contract**: room join/leave and relays, with an in-process hub
//! - **Call Timer**: duration counted from the moment remote media arrives
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Video Call Cell                    |
//! +-----------------------------------------------------+
//! |  models.rs      |  Rooms, media, payloads, status   |
//! |  error.rs       |  Error taxonomy                   |
//! |  session.rs     |  Call request and session         |
//! |  services/      |  Runtime components               |
//! |    controller.rs|  Call session controller task     |
//! |    peer.rs      |  Peer connection manager          |
//! |    media.rs     |  Local media capture              |
//! |    signaling.rs |  Signaling contract + hub         |
//! |    timer.rs     |  Call duration timer              |
//! |    webrtc.rs    |  webrtc-rs transport (feature)    |
//! +-----------------------------------------------------+
//! ```
//!
//! The doctor always creates the offer once the patient shows up in the room;
//! the patient only ever answers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shared_config::AppConfig;
//! use shared_models::{AppointmentRef, AppointmentStatus, ParticipantInfo, ParticipantRole};
//! use video_call_cell::{
//!     CallError, CallRequest, CallServices, CallSessionController, CallSettings,
//!     InMemorySignalingHub, MediaDevices, PeerTransportFactory,
//! };
//!
//! # async fn example(
//! #     devices: Arc<dyn MediaDevices>,
//! #     transports: Arc<dyn PeerTransportFactory>,
//! # ) -> Result<(), CallError> {
//! let config = AppConfig::load();
//! let hub = InMemorySignalingHub::new();
//!
//! let request = CallRequest::new(
//!     AppointmentRef::new("A1", AppointmentStatus::Confirmed),
//!     ParticipantInfo::new("doctor-1", "Gregory House", ParticipantRole::Doctor),
//!     ParticipantInfo::new("patient-1", "Jane Doe", ParticipantRole::Patient),
//! );
//! let services = CallServices {
//!     signaling: Arc::new(hub.client()),
//!     devices,
//!     transports,
//! };
//!
//! let controller = CallSessionController::new(request, services, CallSettings::from_config(&config))?;
//! let mut updates = controller.subscribe();
//! controller.start();
//!
//! while updates.changed().await.is_ok() {
//!     let observation = updates.borrow().clone();
//!     println!("{} {}", observation.status, observation.formatted_duration());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Read through `shared_config::AppConfig`:
//! - `ICE_SERVER_URLS` - comma separated STUN/TURN URLs
//! - `CALL_TIMER_TICK_MS` - duration tick period (default 1000)
//! - `SIGNALING_TIMEOUT_SECS` - bound on room join/leave (default 10)
//! - `CALL_CAPTURE_AUDIO` / `CALL_CAPTURE_VIDEO` - requested track kinds (default true)

pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use error::{CallError, DeviceError, DisconnectReason, SignalingError, TransportError};
pub use models::*;
pub use services::*;
pub use session::{CallRequest, Session};
