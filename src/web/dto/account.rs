use serde::{Deserialize, Serialize};

use crate::model::entity::{Subscription, UserEntity};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub user: UserEntity,
    pub subscription_active: bool,
    pub subscription: Option<Subscription>,
}
