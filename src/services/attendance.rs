use serde::{Deserialize, Serialize};

/// Where a registration stands. Derived from its flags, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Registered,
    Completed,
    Cancelled,
}

pub fn attendance_status(cancelled: bool, video_watched: bool, survey_completed: bool) -> AttendanceStatus {
    if cancelled {
        AttendanceStatus::Cancelled
    } else if video_watched && survey_completed {
        AttendanceStatus::Completed
    } else {
        AttendanceStatus::Registered
    }
}
