use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Notification {
    id: Uuid,
    user_id: Uuid,
    title: String,
    body: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ResourceTyped for Notification {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Notification
    }
}

impl Notification {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO notifications (id, user_id, title, body) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(body)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }

    /// One row per recipient in a single statement.
    pub async fn broadcast(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        user_ids: &[Uuid],
        title: &str,
        body: &str,
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, body)
            SELECT gen_random_uuid(), uid, $2, $3 FROM UNNEST($1::UUID[]) AS uid
            "#,
        )
        .bind(user_ids)
        .bind(title)
        .bind(body)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn mine(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        unread_only: bool,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT 200
            "#,
        )
        .bind(actor.user_id())
        .bind(unread_only)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn mark_read(mut self, mm: &ModelManager) -> DatabaseResult<Self> {
        let read_at: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE notifications SET read_at = COALESCE(read_at, now()) WHERE id = $1 RETURNING read_at",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        self.read_at = Some(read_at);
        Ok(self)
    }
}

#[async_trait::async_trait]
impl HasOwner for Notification {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
