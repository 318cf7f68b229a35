use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{DatabaseError, ModelManager, error::DatabaseResult};
use crate::services::attendance::{AttendanceStatus, attendance_status};
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Registration {
    id: Uuid,
    schedule_id: Uuid,
    user_id: Uuid,
    video_watched: bool,
    survey_completed: bool,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// Partial attendance update; absent flags stay as they are.
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct AttendanceUpdate {
    pub video_watched: Option<bool>,
    pub survey_completed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct RosterRow {
    pub registration_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub video_watched: bool,
    pub survey_completed: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct MyRegistrationRow {
    pub registration_id: Uuid,
    pub schedule_id: Uuid,
    pub event_id: Uuid,
    pub event_title: String,
    pub starts_at: DateTime<Utc>,
    pub location: String,
    pub video_watched: bool,
    pub survey_completed: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ResourceTyped for Registration {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Registration
    }
}

impl Registration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schedule_id(&self) -> Uuid {
        self.schedule_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn video_watched(&self) -> bool {
        self.video_watched
    }

    pub fn survey_completed(&self) -> bool {
        self.survey_completed
    }

    pub fn cancelled_at(&self) -> Option<&DateTime<Utc>> {
        self.cancelled_at.as_ref()
    }

    pub fn status(&self) -> AttendanceStatus {
        attendance_status(
            self.cancelled_at.is_some(),
            self.video_watched,
            self.survey_completed,
        )
    }

    /// Takes a seat on `schedule_id`. The schedule row is locked for the duration of the
    /// transaction so two concurrent registrations cannot both claim the last seat.
    #[tracing::instrument(skip(mm))]
    pub async fn register(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        schedule_id: Uuid,
    ) -> DatabaseResult<Self> {
        let mut tx = mm.begin().await?;

        let capacity: i32 =
            sqlx::query_scalar("SELECT capacity FROM event_schedules WHERE id = $1 FOR UPDATE")
                .bind(schedule_id)
                .fetch_one(&mut *tx)
                .await?;

        let existing: Option<Self> = sqlx::query_as(
            "SELECT * FROM event_registrations WHERE schedule_id = $1 AND user_id = $2",
        )
        .bind(schedule_id)
        .bind(actor.user_id())
        .fetch_optional(&mut *tx)
        .await?;

        if matches!(&existing, Some(r) if r.cancelled_at.is_none()) {
            return Err(DatabaseError::Conflict("already registered"));
        }

        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE schedule_id = $1 AND cancelled_at IS NULL",
        )
        .bind(schedule_id)
        .fetch_one(&mut *tx)
        .await?;

        if taken >= i64::from(capacity) {
            return Err(DatabaseError::Conflict("schedule is full"));
        }

        let registration: Self = match existing {
            Some(previous) => {
                sqlx::query_as(
                    r#"
                    UPDATE event_registrations
                    SET cancelled_at = NULL, video_watched = FALSE, survey_completed = FALSE, created_at = now()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(previous.id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as(
                    "INSERT INTO event_registrations (id, schedule_id, user_id) VALUES ($1, $2, $3) RETURNING *",
                )
                .bind(Uuid::new_v4())
                .bind(schedule_id)
                .bind(actor.user_id())
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(registration)
    }

    pub async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM event_registrations WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_live(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        schedule_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM event_registrations WHERE schedule_id = $1 AND user_id = $2 AND cancelled_at IS NULL",
        )
        .bind(schedule_id)
        .bind(actor.user_id())
        .fetch_optional(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn cancel(mut self, mm: &ModelManager) -> DatabaseResult<Self> {
        let cancelled_at: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE event_registrations SET cancelled_at = now() WHERE id = $1 RETURNING cancelled_at",
        )
        .bind(self.id)
        .fetch_one(mm.executor())
        .await?;
        self.cancelled_at = Some(cancelled_at);
        Ok(self)
    }

    pub async fn update_attendance(
        mut self,
        mm: &ModelManager,
        data: AttendanceUpdate,
    ) -> DatabaseResult<Self> {
        let video_watched = data.video_watched.unwrap_or(self.video_watched);
        let survey_completed = data.survey_completed.unwrap_or(self.survey_completed);

        sqlx::query(
            "UPDATE event_registrations SET video_watched = $1, survey_completed = $2 WHERE id = $3",
        )
        .bind(video_watched)
        .bind(survey_completed)
        .bind(self.id)
        .execute(mm.executor())
        .await?;

        self.video_watched = video_watched;
        self.survey_completed = survey_completed;
        Ok(self)
    }

    pub async fn roster(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        schedule_id: Uuid,
    ) -> DatabaseResult<Vec<RosterRow>> {
        let result = sqlx::query_as(
            r#"
            SELECT
                r.id AS registration_id, u.id AS user_id, u.display_name, u.email,
                r.video_watched, r.survey_completed, r.cancelled_at
            FROM event_registrations r
            JOIN users u ON u.id = r.user_id
            WHERE r.schedule_id = $1
            ORDER BY r.created_at
            "#,
        )
        .bind(schedule_id)
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn mine(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
    ) -> DatabaseResult<Vec<MyRegistrationRow>> {
        let result = sqlx::query_as(
            r#"
            SELECT
                r.id AS registration_id, s.id AS schedule_id, e.id AS event_id,
                e.title AS event_title, s.starts_at, s.location,
                r.video_watched, r.survey_completed, r.cancelled_at
            FROM event_registrations r
            JOIN event_schedules s ON s.id = r.schedule_id
            JOIN events e ON e.id = s.event_id
            WHERE r.user_id = $1
            ORDER BY s.starts_at DESC
            "#,
        )
        .bind(actor.user_id())
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl HasOwner for Registration {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
