pub mod appointment;
pub mod participant;

pub use appointment::{AppointmentId, AppointmentRef, AppointmentStatus};
pub use participant::{ParticipantInfo, ParticipantRole};
