use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

/// Vendor statuses that grant access.
pub const ACTIVE_STATUSES: [&str; 2] = ["active", "trialing"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Subscription {
    id: Uuid,
    user_id: Uuid,
    stripe_subscription_id: String,
    price_id: Option<String>,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub stripe_subscription_id: String,
    pub price_id: Option<String>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

impl ResourceTyped for Subscription {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Subscription
    }
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn stripe_subscription_id(&self) -> &str {
        &self.stripe_subscription_id
    }

    pub fn price_id(&self) -> Option<&str> {
        self.price_id.as_deref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn current_period_end(&self) -> Option<&DateTime<Utc>> {
        self.current_period_end.as_ref()
    }

    pub fn cancel_at_period_end(&self) -> bool {
        self.cancel_at_period_end
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        is_active(&self.status, self.current_period_end, now)
    }
}

pub fn is_active(status: &str, period_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    ACTIVE_STATUSES.contains(&status) && period_end.is_none_or(|end| end > now)
}

impl Subscription {
    /// Insert or refresh the local copy of a vendor subscription.
    pub async fn upsert(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: SubscriptionUpsert,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (id, user_id, stripe_subscription_id, price_id, status, current_period_end, cancel_at_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                price_id = COALESCE(EXCLUDED.price_id, subscriptions.price_id),
                status = EXCLUDED.status,
                current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(&data.stripe_subscription_id)
        .bind(&data.price_id)
        .bind(&data.status)
        .bind(data.current_period_end)
        .bind(data.cancel_at_period_end)
        .fetch_one(mm.executor())
        .await?;

        Ok(result)
    }

    pub async fn latest_for_user(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        user_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn has_active(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        user_id: Uuid,
    ) -> DatabaseResult<bool> {
        let result: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscriptions
                WHERE user_id = $1
                AND status = ANY($2)
                AND (current_period_end IS NULL OR current_period_end > now())
            )
            "#,
        )
        .bind(user_id)
        .bind(&ACTIVE_STATUSES[..])
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn find_by_stripe_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        stripe_subscription_id: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM subscriptions WHERE stripe_subscription_id = $1")
            .bind(stripe_subscription_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Every stored subscription, terminal ones included, since the vendor may still report them
    /// differently than the last webhook did.
    pub async fn all(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM subscriptions ORDER BY created_at")
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl HasOwner for Subscription {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    #[test]
    fn active_statuses_grant_access() {
        let now = Utc::now();
        assert!(is_active("active", None, now));
        assert!(is_active("trialing", Some(now + Duration::days(3)), now));
    }

    #[test]
    fn ended_or_inactive_does_not() {
        let now = Utc::now();
        assert!(!is_active("active", Some(now - Duration::seconds(1)), now));
        assert!(!is_active("past_due", None, now));
        assert!(!is_active("canceled", Some(now + Duration::days(1)), now));
    }
}
