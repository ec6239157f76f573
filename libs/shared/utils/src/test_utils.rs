use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{AppointmentId, AppointmentRef, AppointmentStatus, ParticipantInfo, ParticipantRole};

pub struct TestConfig {
    pub ice_server_urls: Vec<String>,
    pub call_timer_tick_ms: u64,
    pub signaling_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ice_server_urls: vec!["stun:stun.test.local:3478".to_string()],
            call_timer_tick_ms: 1000,
            signaling_timeout_secs: 5,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            ice_server_urls: self.ice_server_urls.clone(),
            call_timer_tick_ms: self.call_timer_tick_ms,
            signaling_timeout_secs: self.signaling_timeout_secs,
            capture_audio: true,
            capture_video: true,
        }
    }
}

pub struct TestParticipant {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub role: ParticipantRole,
}

impl TestParticipant {
    pub fn new(first_name: &str, last_name: &str, role: ParticipantRole) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role,
        }
    }

    pub fn doctor() -> Self {
        Self::new("Gregory", "House", ParticipantRole::Doctor)
    }

    pub fn patient() -> Self {
        Self::new("Jane", "Doe", ParticipantRole::Patient)
    }

    pub fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo::from_profile(self.id.clone(), &self.first_name, &self.last_name, self.role)
    }
}

pub struct TestAppointment;

impl TestAppointment {
    pub fn confirmed(id: &str) -> AppointmentRef {
        AppointmentRef::new(AppointmentId::new(id), AppointmentStatus::Confirmed)
    }

    pub fn with_status(id: &str, status: AppointmentStatus) -> AppointmentRef {
        AppointmentRef::new(AppointmentId::new(id), status)
    }

    pub fn random_confirmed() -> AppointmentRef {
        AppointmentRef::new(AppointmentId::from(Uuid::new_v4()), AppointmentStatus::Confirmed)
    }
}
