use serde::Serialize;

use crate::model::entity::ChecklistUpdate;
use crate::web::UserRole;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Checklist {
    pub test_passed: bool,
    pub survey_completed: bool,
    pub meeting_completed: bool,
}

impl Checklist {
    pub fn is_eligible(&self) -> bool {
        self.test_passed && self.survey_completed && self.meeting_completed
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.test_passed {
            missing.push("test_passed");
        }
        if !self.survey_completed {
            missing.push("survey_completed");
        }
        if !self.meeting_completed {
            missing.push("meeting_completed");
        }
        missing
    }
}

/// Admins decide anything. Others only requests for a tier strictly below their own.
pub fn can_decide(approver: UserRole, target: UserRole) -> bool {
    approver == UserRole::Admin || approver > target
}

/// The meeting is confirmed by staff. Applicants may only tick their own test and survey.
pub fn may_update(actor: UserRole, is_owner: bool, update: &ChecklistUpdate) -> bool {
    if actor.at_least(UserRole::Manager) {
        return true;
    }
    is_owner && update.meeting_completed.is_none()
}

/// A request only applies while the applicant still holds the role it was filed from.
pub fn still_applies(current: UserRole, from: UserRole, target: UserRole) -> bool {
    current == from && current < target
}
