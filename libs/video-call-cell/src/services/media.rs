// libs/video-call-cell/src/services/media.rs
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CallError, DeviceError};
use crate::models::{MediaConstraints, MediaKind, MediaState, MediaStreamHandle};

/// Host capture hardware.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens the requested tracks. Fails if any requested kind cannot be captured.
    async fn open(&self, constraints: &MediaConstraints) -> Result<Box<dyn CapturedStream>, DeviceError>;
}

/// A live capture session owning one track per kind.
pub trait CapturedStream: Send + Sync {
    fn handle(&self) -> MediaStreamHandle;

    /// Returns false when the stream has no track of that kind.
    fn set_enabled(&self, kind: MediaKind, enabled: bool) -> bool;

    fn stop(&self);
}

/// Owns the local stream for one session.
pub struct MediaCapture {
    devices: Arc<dyn MediaDevices>,
    stream: Option<Box<dyn CapturedStream>>,
    state: MediaState,
}

impl MediaCapture {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
            state: MediaState::default(),
        }
    }

    pub async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<MediaStreamHandle, CallError> {
        if self.stream.is_some() {
            return Err(CallError::MediaAlreadyAcquired);
        }

        debug!("Requesting local media: {:?}", constraints.kinds());
        let stream = self.devices.open(constraints).await.map_err(|e| {
            warn!("Local media acquisition failed: {}", e);
            CallError::MediaAcquisition(e)
        })?;

        let handle = stream.handle();
        for kind in handle.kinds() {
            stream.set_enabled(*kind, self.state.is_enabled(*kind));
        }

        info!("Acquired local stream {} ({:?})", handle.id(), handle.kinds());
        self.stream = Some(stream);
        Ok(handle)
    }

    /// Flips a track in place; no renegotiation since the track stays attached.
    pub fn set_track_enabled(&mut self, kind: MediaKind, enabled: bool) -> bool {
        self.state.set(kind, enabled);

        match &self.stream {
            Some(stream) => {
                let touched = stream.set_enabled(kind, enabled);
                if !touched {
                    debug!("Local stream has no {} track", kind);
                }
                touched
            }
            None => false,
        }
    }

    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Releasing local stream {}", stream.handle().id());
            stream.stop();
        }
    }

    pub fn handle(&self) -> Option<MediaStreamHandle> {
        self.stream.as_ref().map(|s| s.handle())
    }

    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    /// Seeds the enabled flags applied at acquisition time.
    pub fn with_state(mut self, state: MediaState) -> Self {
        self.state = state;
        self
    }
}

impl fmt::Debug for MediaCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCapture")
            .field("stream", &self.handle())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for MediaCapture {
    fn drop(&mut self) {
        self.release();
    }
}
