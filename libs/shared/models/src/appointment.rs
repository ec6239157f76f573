use serde::{Deserialize, Serialize};
use std::fmt;

/// Appointment identifier as issued by the booking API. Opaque; not necessarily a UUID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AppointmentId(String);

impl AppointmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppointmentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<uuid::Uuid> for AppointmentId {
    fn from(id: uuid::Uuid) -> Self {
        Self::new(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppointmentStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The slice of an appointment a call needs: who it is and whether it may be joined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentRef {
    pub id: AppointmentId,
    pub status: AppointmentStatus,
}

impl AppointmentRef {
    pub fn new(id: impl Into<AppointmentId>, status: AppointmentStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }
}
