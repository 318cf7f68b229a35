use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Referral {
    id: Uuid,
    referrer_id: Uuid,
    referred_id: Uuid,
    created_at: DateTime<Utc>,
}

/// A referred user as seen by the referrer.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct ReferredUserRow {
    pub user_id: Uuid,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub subscribed: bool,
}

impl ResourceTyped for Referral {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Referral
    }
}

impl Referral {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn referrer_id(&self) -> Uuid {
        self.referrer_id
    }

    pub fn referred_id(&self) -> Uuid {
        self.referred_id
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub async fn create_in(
        conn: &mut PgConnection,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO referrals (id, referrer_id, referred_id) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(referrer_id)
        .bind(referred_id)
        .fetch_one(conn)
        .await?;
        Ok(result)
    }

    pub async fn referred_by(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        referrer_id: Uuid,
    ) -> DatabaseResult<Vec<ReferredUserRow>> {
        let result = sqlx::query_as(
            r#"
            SELECT
                u.id AS user_id,
                u.display_name,
                r.created_at AS joined_at,
                EXISTS (SELECT 1 FROM subscriptions s WHERE s.user_id = u.id) AS subscribed
            FROM referrals r
            JOIN users u ON u.id = r.referred_id
            WHERE r.referrer_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(referrer_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }
}
