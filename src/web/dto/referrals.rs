use serde::{Deserialize, Serialize};

use crate::model::entity::ReferredUserRow;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct ReferralOverview {
    pub referral_code: String,
    pub referred: Vec<ReferredUserRow>,
}
