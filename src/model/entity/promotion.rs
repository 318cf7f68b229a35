use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::entity::UserEntity;
use crate::model::repo::ResourceTyped;
use crate::model::{DatabaseError, ModelManager, Page, error::DatabaseResult};
use crate::services::promotion::{Checklist, can_decide, still_applies};
use crate::web::{AuthenticatedUser, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct PromotionRequest {
    id: Uuid,
    user_id: Uuid,
    from_role: String,
    target_role: String,
    test_passed: bool,
    survey_completed: bool,
    meeting_completed: bool,
    status: String,
    decided_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ChecklistUpdate {
    pub test_passed: Option<bool>,
    pub survey_completed: Option<bool>,
    pub meeting_completed: Option<bool>,
}

impl ResourceTyped for PromotionRequest {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::PromotionRequest
    }
}

impl PromotionRequest {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn from_role(&self) -> UserRole {
        UserRole::from(self.from_role.as_str())
    }

    pub fn target_role(&self) -> UserRole {
        UserRole::from(self.target_role.as_str())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn checklist(&self) -> Checklist {
        Checklist {
            test_passed: self.test_passed,
            survey_completed: self.survey_completed,
            meeting_completed: self.meeting_completed,
        }
    }

    pub async fn create(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        from_role: UserRole,
        target_role: UserRole,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO promotion_requests (id, user_id, from_role, target_role) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(actor.user_id())
        .bind(from_role.to_string())
        .bind(target_role.to_string())
        .fetch_one(mm.executor())
        .await
        .map_err(DatabaseError::from)
        .map_err(|e| {
            if e.is_conflict() {
                DatabaseError::Conflict("a promotion request is already pending")
            } else {
                e
            }
        })?;
        Ok(result)
    }

    pub async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM promotion_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn mine(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM promotion_requests WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(actor.user_id())
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn page(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Page<Self>> {
        let items = sqlx::query_as(
            r#"
            SELECT * FROM promotion_requests
            WHERE $1::TEXT IS NULL OR status = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promotion_requests WHERE $1::TEXT IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(mm.executor())
        .await?;

        Ok(Page::new(items, total, limit, offset))
    }

    pub async fn update_checklist(
        mut self,
        mm: &ModelManager,
        data: ChecklistUpdate,
    ) -> DatabaseResult<Self> {
        if !self.is_pending() {
            return Err(DatabaseError::Conflict("promotion request is already decided"));
        }

        self.test_passed = data.test_passed.unwrap_or(self.test_passed);
        self.survey_completed = data.survey_completed.unwrap_or(self.survey_completed);
        self.meeting_completed = data.meeting_completed.unwrap_or(self.meeting_completed);

        sqlx::query(
            "UPDATE promotion_requests SET test_passed = $1, survey_completed = $2, meeting_completed = $3 WHERE id = $4",
        )
        .bind(self.test_passed)
        .bind(self.survey_completed)
        .bind(self.meeting_completed)
        .bind(self.id)
        .execute(mm.executor())
        .await?;
        Ok(self)
    }

    /// Approves the request and raises the user's role in one transaction. The request row is
    /// re-read under lock, so a concurrent decision fails with a conflict.
    #[tracing::instrument(skip(mm))]
    pub async fn approve(mm: &ModelManager, actor: &AuthenticatedUser, id: Uuid) -> DatabaseResult<Self> {
        let mut tx = mm.begin().await?;

        let request: Self = sqlx::query_as("SELECT * FROM promotion_requests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if !can_decide(actor.user_role(), request.target_role()) {
            return Err(DatabaseError::Forbidden);
        }
        if !request.is_pending() {
            return Err(DatabaseError::Conflict("promotion request is already decided"));
        }
        if !request.checklist().is_eligible() {
            return Err(DatabaseError::Conflict("promotion checklist is incomplete"));
        }

        let current = UserEntity::role_for_update_in(&mut tx, request.user_id).await?;
        if !still_applies(current, request.from_role(), request.target_role()) {
            return Err(DatabaseError::Conflict("applicant's role changed since the request"));
        }

        UserEntity::set_role_in(&mut tx, request.user_id, request.target_role()).await?;

        let approved: Self = sqlx::query_as(
            r#"
            UPDATE promotion_requests
            SET status = 'approved', decided_by = $1, decided_at = now()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(decided_by(actor))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(approved)
    }

    pub async fn reject(self, mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<Self> {
        if !can_decide(actor.user_role(), self.target_role()) {
            return Err(DatabaseError::Forbidden);
        }

        let rejected: Option<Self> = sqlx::query_as(
            r#"
            UPDATE promotion_requests
            SET status = 'rejected', decided_by = $1, decided_at = now()
            WHERE id = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(decided_by(actor))
        .bind(self.id)
        .fetch_optional(mm.executor())
        .await?;

        rejected.ok_or(DatabaseError::Conflict("promotion request is already decided"))
    }
}

/// The synthetic system actor has no users row to point at.
fn decided_by(actor: &AuthenticatedUser) -> Option<Uuid> {
    (actor.user_id() != Uuid::max()).then_some(actor.user_id())
}

#[async_trait::async_trait]
impl HasOwner for PromotionRequest {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
