use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult};
use crate::web::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct LessonProgress {
    user_id: Uuid,
    lesson_id: Uuid,
    completed_at: DateTime<Utc>,
}

impl ResourceTyped for LessonProgress {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::LessonProgress
    }
}

impl LessonProgress {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn lesson_id(&self) -> Uuid {
        self.lesson_id
    }

    pub fn completed_at(&self) -> &DateTime<Utc> {
        &self.completed_at
    }

    /// Idempotent: marking a lesson twice keeps the first completion time.
    pub async fn mark_done(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        lesson_id: Uuid,
    ) -> DatabaseResult<Self> {
        sqlx::query(
            "INSERT INTO lesson_progress (user_id, lesson_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(actor.user_id())
        .bind(lesson_id)
        .execute(mm.executor())
        .await?;

        let row = sqlx::query_as(
            "SELECT * FROM lesson_progress WHERE user_id = $1 AND lesson_id = $2",
        )
        .bind(actor.user_id())
        .bind(lesson_id)
        .fetch_one(mm.executor())
        .await?;
        Ok(row)
    }

    /// Completed lessons among those the actor can currently see, so it never exceeds
    /// [`crate::model::entity::Lesson::count_visible`].
    pub async fn count_completed(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
    ) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM lesson_progress p
            JOIN lessons l ON l.id = p.lesson_id
            JOIN courses c ON c.id = l.course_id
            WHERE p.user_id = $1
            AND ($2 OR (c.published AND c.required_role = ANY($3)))
            "#,
        )
        .bind(actor.user_id())
        .bind(actor.is_admin())
        .bind(crate::model::entity::roles_up_to(actor.user_role()))
        .fetch_one(mm.executor())
        .await?;
        Ok(result)
    }
}

#[async_trait::async_trait]
impl HasOwner for LessonProgress {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
