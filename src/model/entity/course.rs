use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::{AuthenticatedUser, UserRole};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Course {
    id: uuid::Uuid,
    title: String,
    description: String,
    required_role: String,
    published: bool,
    order_index: i32,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CourseCreate {
    pub title: String,
    pub description: String,
    pub required_role: Option<UserRole>,
    pub published: Option<bool>,
    pub order_index: Option<i32>,
}

impl ResourceTyped for Course {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Course
    }
}

impl Course {
    pub fn id(&self) -> uuid::Uuid {
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

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn order_index(&self) -> i32 {
        self.order_index
    }

    /// Admins see drafts too; everyone else needs a published course at or below their tier.
    pub fn is_visible_to(&self, role: UserRole) -> bool {
        role == UserRole::Admin || (self.published && role.at_least(self.required_role()))
    }
}

#[async_trait]
impl CrudRepository<Course, CourseCreate, uuid::Uuid> for Course {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as("INSERT INTO courses (id, title, description, required_role, published, order_index) VALUES ($1,$2,$3,$4,$5,$6) RETURNING *")
            .bind(Uuid::new_v4())
            .bind(&data.title)
            .bind(&data.description)
            .bind(data.required_role.unwrap_or(UserRole::Member).to_string())
            .bind(data.published.unwrap_or(true))
            .bind(data.order_index.unwrap_or(0))
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: CourseCreate,
    ) -> DatabaseResult<Self> {
        let required_role = data.required_role.unwrap_or(self.required_role()).to_string();
        let published = data.published.unwrap_or(self.published);
        let order_index = data.order_index.unwrap_or(self.order_index);

        sqlx::query(
            "UPDATE courses SET title = $1, description = $2, required_role = $3, published = $4, order_index = $5 WHERE id = $6",
        )
        .bind(&data.title)
        .bind(&data.description)
        .bind(&required_role)
        .bind(published)
        .bind(order_index)
        .bind(self.id)
        .execute(mm.executor())
        .await?;

        self.title = data.title;
        self.description = data.description;
        self.required_role = required_role;
        self.published = published;
        self.order_index = order_index;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM courses WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    async fn list(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM courses ORDER BY order_index LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(Course, CourseCreate, Uuid);

#[async_trait]
impl HasOwner for Course {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.id) // owners of courses are themselves
    }
}

// Utils

#[derive(sqlx::FromRow)]
pub struct CourseWithLessonsRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub required_role: String,
    pub published: bool,
    pub order_index: i32,
    pub lessons: serde_json::Value,
}

impl CourseWithLessonsRow {
    const SELECT: &'static str = r#"
        SELECT
        c.id,
        c.title,
        c.description,
        c.required_role,
        c.published,
        c.order_index,
        COALESCE(
            json_agg(
                json_build_object(
                    'id', l.id,
                    'title', l.title,
                    'order_index', l.order_index,
                    'completed', (lp.lesson_id IS NOT NULL)
                ) ORDER BY l.order_index
            ) FILTER (WHERE l.id IS NOT NULL),
            '[]'
        ) AS lessons
        FROM courses c
        LEFT JOIN lessons l ON l.course_id = c.id
        LEFT JOIN lesson_progress lp
        ON lp.lesson_id = l.id
        AND lp.user_id = $1
    "#;

    /// Courses visible to the actor's tier, with per-lesson completion of the actor.
    pub async fn fetch_visible(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
    ) -> DatabaseResult<Vec<Self>> {
        let query = format!(
            "{} WHERE $2 OR (c.published AND c.required_role = ANY($3)) GROUP BY c.id ORDER BY c.order_index",
            Self::SELECT
        );
        let rows: Vec<CourseWithLessonsRow> = sqlx::query_as(&query)
            .bind(actor.user_id())
            .bind(actor.is_admin())
            .bind(roles_up_to(actor.user_role()))
            .fetch_all(mm.executor())
            .await?;

        Ok(rows)
    }

    pub async fn fetch_one(
        mm: &ModelManager,
        actor: &AuthenticatedUser,
        course_id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let query = format!("{} WHERE c.id = $2 GROUP BY c.id", Self::SELECT);
        let row = sqlx::query_as(&query)
            .bind(actor.user_id())
            .bind(course_id)
            .fetch_optional(mm.executor())
            .await?;

        Ok(row)
    }
}

/// Role names at or below `role`, for `= ANY(..)` filters.
pub fn roles_up_to(role: UserRole) -> Vec<String> {
    [UserRole::Member, UserRole::Fp, UserRole::Manager, UserRole::Admin]
        .into_iter()
        .filter(|r| role.at_least(*r))
        .map(|r| r.to_string())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roles_up_to_includes_lower_tiers() {
        assert_eq!(roles_up_to(UserRole::Member), vec!["member"]);
        assert_eq!(roles_up_to(UserRole::Manager), vec!["member", "fp", "manager"]);
    }
}
