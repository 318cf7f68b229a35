use crate::auth::generate_code;
use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::web::AuthenticatedUser;
use crate::web::UserRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};

pub const REFERRAL_CODE_LEN: usize = 8;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct UserEntity {
    id: uuid::Uuid,
    email: String,
    display_name: String,
    #[serde(skip)]
    password_hash: String,
    role: String,
    referral_code: String,
    referred_by: Option<Uuid>,
    email_verified: bool,
    #[serde(skip)]
    stripe_customer_id: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UserEntityCreateUpdate {
    pub email: String,
    pub display_name: String,
    /// Left untouched on update when empty.
    pub password_hash: String,
    pub role: UserRole,
    pub referred_by: Option<Uuid>,
}

impl ResourceTyped for UserEntity {
    fn get_resource_type() -> crate::model::repo::ResourceType {
        crate::model::repo::ResourceType::User
    }
}

impl UserEntity {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> UserRole {
        UserRole::from(self.role.as_str())
    }

    pub fn referral_code(&self) -> &str {
        &self.referral_code
    }

    pub fn referred_by(&self) -> Option<Uuid> {
        self.referred_by
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn stripe_customer_id(&self) -> Option<&str> {
        self.stripe_customer_id.as_deref()
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    /// Inserts a user on an existing connection so that bulk imports can share a transaction.
    pub async fn create_in(
        conn: &mut PgConnection,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let created = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, display_name, password_hash, role, referral_code, referred_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.email.trim().to_lowercase())
        .bind(&data.display_name)
        .bind(&data.password_hash)
        .bind(data.role.to_string())
        .bind(generate_code(REFERRAL_CODE_LEN))
        .bind(data.referred_by)
        .fetch_one(conn)
        .await?;

        Ok(created)
    }
}

#[async_trait::async_trait]
impl CrudRepository<UserEntity, UserEntityCreateUpdate, uuid::Uuid> for UserEntity {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let mut conn = mm.executor().acquire().await?;
        Self::create_in(&mut conn, data).await
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: UserEntityCreateUpdate,
    ) -> DatabaseResult<Self> {
        let email = data.email.trim().to_lowercase();
        sqlx::query("UPDATE users SET email = $1, display_name = $2, role = $3 WHERE id = $4")
            .bind(&email)
            .bind(&data.display_name)
            .bind(data.role.to_string())
            .bind(self.id)
            .execute(mm.executor())
            .await?;

        if !data.password_hash.is_empty() {
            sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
                .bind(&data.password_hash)
                .bind(self.id)
                .execute(mm.executor())
                .await?;
            self.password_hash = data.password_hash;
        }

        self.email = email;
        self.display_name = data.display_name;
        self.role = data.role.to_string();
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM users WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM users ORDER BY created_at LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(UserEntity, UserEntityCreateUpdate, Uuid);

#[async_trait]
impl HasOwner for UserEntity {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.id) // owners of users are themselves
    }
}

impl UserEntity {
    pub async fn find_by_email(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        email: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_by_referral_code(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        code: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE referral_code = $1")
            .bind(code.trim().to_uppercase())
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn find_by_stripe_customer(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        customer_id: &str,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn ids_with_role(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        role: UserRole,
    ) -> DatabaseResult<Vec<Uuid>> {
        let result = sqlx::query_scalar("SELECT id FROM users WHERE role = $1")
            .bind(role.to_string())
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    /// Current role with the row locked until the transaction ends.
    pub async fn role_for_update_in(conn: &mut PgConnection, user_id: Uuid) -> DatabaseResult<UserRole> {
        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(conn)
            .await?;
        Ok(UserRole::from(role.as_str()))
    }

    pub async fn set_role_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        role: UserRole,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.to_string())
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn set_password(
        &mut self,
        mm: &ModelManager,
        password_hash: String,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&password_hash)
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        self.password_hash = password_hash;
        Ok(())
    }

    pub async fn mark_email_verified(&mut self, mm: &ModelManager) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = $1")
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        self.email_verified = true;
        Ok(())
    }

    pub async fn set_stripe_customer(
        &mut self,
        mm: &ModelManager,
        customer_id: &str,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET stripe_customer_id = $1 WHERE id = $2")
            .bind(customer_id)
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        self.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    pub async fn find_many_by_email_in(
        conn: &mut PgConnection,
        emails: &[String],
    ) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as("SELECT * FROM users WHERE email = ANY($1)")
            .bind(emails)
            .fetch_all(conn)
            .await?;
        Ok(result)
    }

    /// Existing emails among `emails`, lowercased.
    pub async fn existing_emails_in(
        conn: &mut PgConnection,
        emails: &[String],
    ) -> DatabaseResult<Vec<String>> {
        let result = sqlx::query_scalar("SELECT email FROM users WHERE email = ANY($1)")
            .bind(emails)
            .fetch_all(conn)
            .await?;
        Ok(result)
    }
}
