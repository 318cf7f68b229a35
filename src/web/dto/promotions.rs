use serde::Serialize;

use crate::model::entity::PromotionRequest;

#[derive(Serialize, utoipa::ToSchema)]
pub struct PromotionResponse {
    pub request: PromotionRequest,
    pub eligible: bool,
    pub missing: Vec<String>,
}

impl From<PromotionRequest> for PromotionResponse {
    fn from(request: PromotionRequest) -> Self {
        let checklist = request.checklist();
        Self {
            eligible: checklist.is_eligible(),
            missing: checklist.missing().into_iter().map(String::from).collect(),
            request,
        }
    }
}
