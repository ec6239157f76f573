// libs/video-call-cell/src/session.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shared_models::{AppointmentId, AppointmentRef, ParticipantInfo};

use crate::error::CallError;
use crate::models::RoomId;

/// Everything needed to open a call for one appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallRequest {
    pub appointment: AppointmentRef,
    pub local: ParticipantInfo,
    pub remote: ParticipantInfo,
}

impl CallRequest {
    pub fn new(appointment: AppointmentRef, local: ParticipantInfo, remote: ParticipantInfo) -> Self {
        Self {
            appointment,
            local,
            remote,
        }
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if !self.appointment.is_confirmed() {
            return Err(CallError::AppointmentNotConfirmed {
                appointment_id: self.appointment.id.clone(),
                status: self.appointment.status,
            });
        }

        // Exactly one side may create the offer.
        if self.local.role == self.remote.role {
            return Err(CallError::InvalidRequest(format!(
                "both participants have role {}",
                self.local.role
            )));
        }

        if self.local.user_id.is_empty() {
            return Err(CallError::InvalidRequest("local participant has no user id".into()));
        }

        Ok(())
    }

    pub fn room_id(&self) -> RoomId {
        RoomId::for_appointment(&self.appointment.id)
    }
}

/// One live attempt at a call. Created on every accepted `start()`.
#[derive(Debug, Clone)]
pub struct Session {
    pub generation: u64,
    pub appointment_id: AppointmentId,
    pub room_id: RoomId,
    pub local: ParticipantInfo,
    pub remote: ParticipantInfo,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn open(request: &CallRequest, generation: u64) -> Self {
        Self {
            generation,
            appointment_id: request.appointment.id.clone(),
            room_id: request.room_id(),
            local: request.local.clone(),
            remote: request.remote.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.local.role.is_offer_initiator()
    }
}
