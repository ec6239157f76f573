use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role a participant plays in an appointment call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ParticipantRole {
    #[serde(rename = "doctor")]
    Doctor,
    #[serde(rename = "patient")]
    Patient,
}

impl ParticipantRole {
    /// The clinician always creates the initial offer; the patient only answers.
    pub fn is_offer_initiator(&self) -> bool {
        matches!(self, ParticipantRole::Doctor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Doctor => "doctor",
            ParticipantRole::Patient => "patient",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(ParticipantRole::Doctor),
            "patient" => Ok(ParticipantRole::Patient),
            other => Err(format!("Unknown participant role '{}'", other)),
        }
    }
}

/// Identity announced to the signaling room when joining a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userName")]
    pub display_name: String,
    pub role: ParticipantRole,
}

impl ParticipantInfo {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
        }
    }

    /// Builds the display name from profile first/last names.
    pub fn from_profile(
        user_id: impl Into<String>,
        first_name: &str,
        last_name: &str,
        role: ParticipantRole,
    ) -> Self {
        let display_name = format!("{} {}", first_name.trim(), last_name.trim())
            .trim()
            .to_string();
        Self::new(user_id, display_name, role)
    }
}
