use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct EventSchedule {
    id: Uuid,
    event_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    location: String,
    capacity: i32,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct EventScheduleCreate {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
}

/// Schedule plus the number of live (not cancelled) registrations.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct EventScheduleWithSeats {
    pub id: Uuid,
    pub event_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub registered: i64,
}

impl ResourceTyped for EventSchedule {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::EventSchedule
    }
}

impl EventSchedule {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn starts_at(&self) -> &DateTime<Utc> {
        &self.starts_at
    }

    pub fn ends_at(&self) -> &DateTime<Utc> {
        &self.ends_at
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    pub async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        event_id: Uuid,
        data: EventScheduleCreate,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO event_schedules (id, event_id, starts_at, ends_at, location, capacity) VALUES ($1,$2,$3,$4,$5,$6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(data.starts_at)
        .bind(data.ends_at)
        .bind(&data.location)
        .bind(data.capacity)
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM event_schedules WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn all_by_event(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        event_id: Uuid,
    ) -> DatabaseResult<Vec<EventScheduleWithSeats>> {
        let result = sqlx::query_as(
            r#"
            SELECT
                s.id, s.event_id, s.starts_at, s.ends_at, s.location, s.capacity,
                COUNT(r.id) FILTER (WHERE r.cancelled_at IS NULL) AS registered
            FROM event_schedules s
            LEFT JOIN event_registrations r ON r.schedule_id = s.id
            WHERE s.event_id = $1
            GROUP BY s.id
            ORDER BY s.starts_at
            "#,
        )
        .bind(event_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }
}
