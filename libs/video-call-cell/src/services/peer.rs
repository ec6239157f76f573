// libs/video-call-cell/src/services/peer.rs
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CallError, TransportError};
use crate::models::{
    IceCandidate, MediaKind, MediaStreamHandle, RoomId, SessionDescription, StreamId, TransportEvent,
};
use crate::services::signaling::SignalingClient;

/// Callback through which a transport reports candidates, streams and connectivity.
pub type TransportEventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// The peer-to-peer transport object (an `RTCPeerConnection` or equivalent).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attaches the local tracks so they are negotiated in the next description.
    async fn attach_local_stream(&self, stream: &MediaStreamHandle) -> Result<(), TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds one fresh transport per session.
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    async fn create(&self, events: TransportEventSink) -> Result<Box<dyn PeerTransport>, TransportError>;
}

/// Drives offer/answer and candidate exchange over one transport.
///
/// Remote candidates that arrive before the remote description are queued and
/// applied in arrival order right after the description is set.
pub struct PeerConnectionManager {
    room: RoomId,
    transport: Option<Box<dyn PeerTransport>>,
    signaling: Arc<dyn SignalingClient>,
    pending_candidates: VecDeque<IceCandidate>,
    remote_description_set: bool,
    seen_streams: HashMap<StreamId, Vec<MediaKind>>,
}

impl PeerConnectionManager {
    pub fn new(room: RoomId, transport: Box<dyn PeerTransport>, signaling: Arc<dyn SignalingClient>) -> Self {
        Self {
            room,
            transport: Some(transport),
            signaling,
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            seen_streams: HashMap::new(),
        }
    }

    fn transport(&self) -> Result<&dyn PeerTransport, TransportError> {
        self.transport.as_deref().ok_or(TransportError::Closed)
    }

    pub async fn attach_local_stream(&self, stream: &MediaStreamHandle) -> Result<(), CallError> {
        self.transport()?.attach_local_stream(stream).await?;
        debug!("Attached local stream {} to transport", stream.id());
        Ok(())
    }

    /// Builds the local offer, applies it and relays it to the peer.
    pub async fn create_offer(&mut self) -> Result<(), CallError> {
        let transport = self.transport()?;
        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        self.signaling.send_offer(&self.room, &offer).await?;

        info!("Sent offer to room {}", self.room);
        Ok(())
    }

    /// Applies an inbound offer (answering it) or answer.
    pub async fn apply_remote_description(&mut self, description: SessionDescription) -> Result<(), CallError> {
        let is_offer = description.is_offer();
        self.transport()?.set_remote_description(description).await?;
        self.remote_description_set = true;
        debug!("Remote {} applied", if is_offer { "offer" } else { "answer" });

        self.flush_pending_candidates().await?;

        if is_offer {
            let transport = self.transport()?;
            let answer = transport.create_answer().await?;
            transport.set_local_description(answer.clone()).await?;
            self.signaling.send_answer(&self.room, &answer).await?;
            info!("Sent answer to room {}", self.room);
        }

        Ok(())
    }

    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), CallError> {
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            debug!(
                "Buffered remote candidate until remote description arrives ({} pending)",
                self.pending_candidates.len()
            );
            return Ok(());
        }

        self.transport()?.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn flush_pending_candidates(&mut self) -> Result<(), CallError> {
        if self.pending_candidates.is_empty() {
            return Ok(());
        }

        debug!("Flushing {} buffered remote candidates", self.pending_candidates.len());
        let mut first_error = None;
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.transport()?.add_ice_candidate(candidate).await {
                warn!("Buffered candidate rejected: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Relays a candidate gathered by the local transport.
    pub async fn relay_local_candidate(&self, candidate: &IceCandidate) -> Result<(), CallError> {
        self.transport()?;
        self.signaling.send_candidate(&self.room, candidate).await?;
        Ok(())
    }

    /// Returns the handle when its stream id is new or it carries a track kind
    /// not reported before. Audio and video of one stream arrive separately.
    pub fn accept_remote_stream(&mut self, stream: MediaStreamHandle) -> Option<MediaStreamHandle> {
        if self.transport.is_none() {
            return None;
        }

        match self.seen_streams.get_mut(stream.id()) {
            None => {
                info!("Remote stream {} arrived with {:?}", stream.id(), stream.kinds());
                self.seen_streams.insert(stream.id().clone(), stream.kinds().to_vec());
                Some(stream)
            }
            Some(known) => {
                let added: Vec<MediaKind> = stream
                    .kinds()
                    .iter()
                    .copied()
                    .filter(|k| !known.contains(k))
                    .collect();
                if added.is_empty() {
                    return None;
                }
                debug!("Remote stream {} gained {:?}", stream.id(), added);
                known.extend(added);
                Some(stream)
            }
        }
    }

    pub async fn close(&mut self) {
        self.pending_candidates.clear();
        self.remote_description_set = false;
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Transport close reported an error: {}", e);
            }
            info!("Closed peer transport for room {}", self.room);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }
}
