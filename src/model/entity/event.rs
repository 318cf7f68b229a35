use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::entity::roles_up_to;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::{AuthenticatedUser, UserRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Event {
    id: Uuid,
    title: String,
    description: String,
    required_role: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct EventCreate {
    pub title: String,
    pub description: String,
    pub required_role: Option<UserRole>,
}

impl ResourceTyped for Event {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Event
    }
}

impl Event {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn required_role(&self) -> UserRole {
        UserRole::from(self.required_role.as_str())
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }
}

#[async_trait]
impl CrudRepository<Event, EventCreate, uuid::Uuid> for Event {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: EventCreate,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO events (id, title, description, required_role) VALUES ($1,$2,$3,$4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.required_role.unwrap_or(UserRole::Member).to_string())
        .fetch_one(mm.executor())
        .await?;

        Ok(result)
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: EventCreate,
    ) -> DatabaseResult<Self> {
        let required_role = data.required_role.unwrap_or(self.required_role()).to_string();
        sqlx::query("UPDATE events SET title = $1, description = $2, required_role = $3 WHERE id = $4")
            .bind(&data.title)
            .bind(&data.description)
            .bind(&required_role)
            .bind(self.id)
            .execute(mm.executor())
            .await?;

        self.title = data.title;
        self.description = data.description;
        self.required_role = required_role;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }

    async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: uuid::Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    /// Only events the actor's tier may attend.
    async fn list(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM events WHERE required_role = ANY($1) ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(roles_up_to(actor.user_role()))
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE required_role = ANY($1)")
            .bind(roles_up_to(actor.user_role()))
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(Event, EventCreate, Uuid);

#[async_trait]
impl HasOwner for Event {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.id)
    }
}
