use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::{
    auth::generate_secret,
    model::{CrudRepository, DatabaseResult, ModelManager, ResourceTyped},
    web::AuthenticatedUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }

    pub fn ttl(self) -> Duration {
        match self {
            Self::VerifyEmail => Duration::hours(24),
            Self::ResetPassword => Duration::hours(1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct AccountToken {
    id: Uuid,
    token: String,
    user_id: Uuid,
    purpose: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountTokenCreate {
    pub user_id: Uuid,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
}

impl AccountTokenCreate {
    pub fn new(user_id: Uuid, purpose: TokenPurpose) -> Self {
        Self {
            user_id,
            purpose: purpose.as_str().to_string(),
            expires_at: Utc::now() + purpose.ttl(),
        }
    }
}

impl ResourceTyped for AccountToken {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::AccountToken
    }
}

impl AccountToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn expires_at(&self) -> &DateTime<Utc> {
        &self.expires_at
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub async fn create_in(
        conn: &mut PgConnection,
        data: AccountTokenCreate,
    ) -> DatabaseResult<Self> {
        let result = sqlx::query_as("INSERT INTO account_tokens (id, token, user_id, purpose, expires_at) VALUES ($1,$2,$3,$4,$5) RETURNING *")
            .bind(Uuid::new_v4())
            .bind(generate_secret())
            .bind(data.user_id)
            .bind(data.purpose)
            .bind(data.expires_at)
            .fetch_one(conn)
            .await?;

        Ok(result)
    }
}

#[async_trait]
impl CrudRepository<AccountToken, AccountTokenCreate, uuid::Uuid> for AccountToken {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: AccountTokenCreate,
    ) -> DatabaseResult<Self> {
        let mut conn = mm.executor().acquire().await?;
        Self::create_in(&mut conn, data).await
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: AccountTokenCreate,
    ) -> DatabaseResult<Self> {
        // only the expiry may move, the secret itself is immutable
        sqlx::query("UPDATE account_tokens SET expires_at = $1 WHERE id = $2")
            .bind(data.expires_at)
            .bind(self.id)
            .execute(mm.executor())
            .await?;
        self.expires_at = data.expires_at;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM account_tokens WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM account_tokens WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM account_tokens LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account_tokens")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl AccountToken {
    pub async fn find_by_token(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        token: &str,
        purpose: TokenPurpose,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM account_tokens WHERE token = $1 AND purpose = $2")
            .bind(token)
            .bind(purpose.as_str())
            .fetch_optional(mm.executor())
            .await?;

        Ok(result)
    }

    pub async fn cleanup_expired(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(r#"DELETE FROM account_tokens WHERE expires_at < now()"#)
            .execute(mm.executor())
            .await?;

        Ok(result.rows_affected())
    }
}
