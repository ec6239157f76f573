// libs/video-call-cell/src/services/signaling.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::ParticipantInfo;

use crate::error::SignalingError;
use crate::models::{IceCandidate, RoomId, SessionDescription, SignalingEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const ROOM_CAPACITY: usize = 2;

/// Out-of-band channel used to find the peer and exchange negotiation payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalingClient: Send + Sync {
    async fn join_room(&self, room: &RoomId, participant: &ParticipantInfo) -> Result<(), SignalingError>;

    async fn leave_room(&self) -> Result<(), SignalingError>;

    async fn send_offer(&self, room: &RoomId, offer: &SessionDescription) -> Result<(), SignalingError>;

    async fn send_answer(&self, room: &RoomId, answer: &SessionDescription) -> Result<(), SignalingError>;

    async fn send_candidate(&self, room: &RoomId, candidate: &IceCandidate) -> Result<(), SignalingError>;

    /// Inbound events for whichever room this client is in.
    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent>;
}

// ==============================================================================
// IN-MEMORY IMPLEMENTATION
// ==============================================================================

struct RoomMember {
    client_id: Uuid,
    participant: ParticipantInfo,
    events: broadcast::Sender<SignalingEvent>,
}

/// Process-local signaling server: rooms of at most two members, relays
/// delivered to the other member only.
#[derive(Clone, Default)]
pub struct InMemorySignalingHub {
    rooms: Arc<RwLock<HashMap<RoomId, Vec<RoomMember>>>>,
    unreachable: Arc<AtomicBool>,
}

impl InMemorySignalingHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> InMemorySignalingClient {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        InMemorySignalingClient {
            client_id: Uuid::new_v4(),
            hub: self.clone(),
            events,
            current_room: Arc::new(RwLock::new(None)),
        }
    }

    /// Simulates an outage: every request fails with `Unreachable` until reset.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub async fn members(&self, room: &RoomId) -> Vec<ParticipantInfo> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.iter().map(|m| m.participant.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn active_rooms(&self) -> Vec<RoomId> {
        let rooms = self.rooms.read().await;
        rooms.keys().cloned().collect()
    }

    fn check_reachable(&self) -> Result<(), SignalingError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SignalingError::Unreachable("in-memory hub offline".into()));
        }
        Ok(())
    }

    async fn join(
        &self,
        room: &RoomId,
        client_id: Uuid,
        participant: &ParticipantInfo,
        events: &broadcast::Sender<SignalingEvent>,
    ) -> Result<(), SignalingError> {
        self.check_reachable()?;

        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();

        if members.iter().any(|m| m.client_id == client_id) {
            debug!("Client {} already in room {}", client_id, room);
            return Ok(());
        }
        if members.len() >= ROOM_CAPACITY {
            warn!("Rejecting join to full room {}", room);
            return Err(SignalingError::RoomFull { room: room.clone() });
        }

        // Announce in both directions so negotiation starts regardless of join order.
        for member in members.iter() {
            let _ = member.events.send(SignalingEvent::PeerJoined {
                participant: participant.clone(),
            });
            let _ = events.send(SignalingEvent::PeerJoined {
                participant: member.participant.clone(),
            });
        }

        members.push(RoomMember {
            client_id,
            participant: participant.clone(),
            events: events.clone(),
        });

        info!("{} joined room {} ({} members)", participant.display_name, room, members.len());
        Ok(())
    }

    async fn leave(&self, room: &RoomId, client_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return;
        };

        let Some(index) = members.iter().position(|m| m.client_id == client_id) else {
            return;
        };
        let leaving = members.remove(index);

        for member in members.iter() {
            let _ = member.events.send(SignalingEvent::PeerLeft {
                user_id: leaving.participant.user_id.clone(),
            });
        }

        info!("{} left room {}", leaving.participant.display_name, room);
        if members.is_empty() {
            rooms.remove(room);
        }
    }

    async fn relay(&self, room: &RoomId, from: Uuid, event: SignalingEvent) -> Result<(), SignalingError> {
        self.check_reachable()?;

        let rooms = self.rooms.read().await;
        let members = rooms.get(room).ok_or(SignalingError::NotJoined)?;
        if !members.iter().any(|m| m.client_id == from) {
            return Err(SignalingError::NotJoined);
        }

        debug!("Relaying {} in room {}", event.name(), room);
        for member in members.iter().filter(|m| m.client_id != from) {
            if member.events.send(event.clone()).is_err() {
                debug!("No subscriber for {} in room {}", member.participant.user_id, room);
            }
        }
        Ok(())
    }
}

/// One participant's connection to an [`InMemorySignalingHub`].
#[derive(Clone)]
pub struct InMemorySignalingClient {
    client_id: Uuid,
    hub: InMemorySignalingHub,
    events: broadcast::Sender<SignalingEvent>,
    current_room: Arc<RwLock<Option<RoomId>>>,
}

impl InMemorySignalingClient {
    pub async fn current_room(&self) -> Option<RoomId> {
        self.current_room.read().await.clone()
    }

    async fn joined_room(&self, room: &RoomId) -> Result<(), SignalingError> {
        match self.current_room.read().await.as_ref() {
            Some(current) if current == room => Ok(()),
            _ => Err(SignalingError::NotJoined),
        }
    }
}

#[async_trait]
impl SignalingClient for InMemorySignalingClient {
    async fn join_room(&self, room: &RoomId, participant: &ParticipantInfo) -> Result<(), SignalingError> {
        // Set before the hub announces us, so relays triggered by the announcement pass.
        *self.current_room.write().await = Some(room.clone());
        if let Err(e) = self.hub.join(room, self.client_id, participant, &self.events).await {
            *self.current_room.write().await = None;
            return Err(e);
        }
        Ok(())
    }

    async fn leave_room(&self) -> Result<(), SignalingError> {
        if let Some(room) = self.current_room.write().await.take() {
            self.hub.leave(&room, self.client_id).await;
        }
        Ok(())
    }

    async fn send_offer(&self, room: &RoomId, offer: &SessionDescription) -> Result<(), SignalingError> {
        self.joined_room(room).await?;
        self.hub
            .relay(room, self.client_id, SignalingEvent::OfferReceived { description: offer.clone() })
            .await
    }

    async fn send_answer(&self, room: &RoomId, answer: &SessionDescription) -> Result<(), SignalingError> {
        self.joined_room(room).await?;
        self.hub
            .relay(room, self.client_id, SignalingEvent::AnswerReceived { description: answer.clone() })
            .await
    }

    async fn send_candidate(&self, room: &RoomId, candidate: &IceCandidate) -> Result<(), SignalingError> {
        self.joined_room(room).await?;
        self.hub
            .relay(room, self.client_id, SignalingEvent::CandidateReceived { candidate: candidate.clone() })
            .await
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.events.subscribe()
    }
}
