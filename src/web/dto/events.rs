use serde::{Deserialize, Serialize};

use crate::model::entity::{Event, EventScheduleWithSeats, Registration};
use crate::services::attendance::AttendanceStatus;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct EventDetail {
    pub event: Event,
    pub schedules: Vec<EventScheduleWithSeats>,
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegistrationResponse {
    pub registration: Registration,
    pub status: AttendanceStatus,
}

impl From<Registration> for RegistrationResponse {
    fn from(registration: Registration) -> Self {
        let status = registration.status();
        Self {
            registration,
            status,
        }
    }
}
