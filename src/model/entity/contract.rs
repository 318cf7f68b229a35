use crate::impl_paginatable_for;
use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{ModelManager, error::DatabaseResult, repo::CrudRepository};
use crate::web::AuthenticatedUser;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// A sale closed by an FP. Feeds the monthly commission.
#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Contract {
    id: Uuid,
    fp_id: Uuid,
    customer_name: String,
    amount: i64,
    contracted_on: NaiveDate,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ContractCreate {
    pub fp_id: Uuid,
    pub customer_name: String,
    pub amount: i64,
    pub contracted_on: NaiveDate,
}

impl ResourceTyped for Contract {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Contract
    }
}

impl Contract {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fp_id(&self) -> Uuid {
        self.fp_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn contracted_on(&self) -> NaiveDate {
        self.contracted_on
    }

    pub async fn create_in(conn: &mut PgConnection, data: ContractCreate) -> DatabaseResult<Self> {
        let result = sqlx::query_as(
            "INSERT INTO contracts (id, fp_id, customer_name, amount, contracted_on) VALUES ($1,$2,$3,$4,$5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(data.fp_id)
        .bind(&data.customer_name)
        .bind(data.amount)
        .bind(data.contracted_on)
        .fetch_one(conn)
        .await?;
        Ok(result)
    }
}

#[async_trait]
impl CrudRepository<Contract, ContractCreate, uuid::Uuid> for Contract {
    async fn create(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ContractCreate,
    ) -> DatabaseResult<Self> {
        let mut conn = mm.executor().acquire().await?;
        Self::create_in(&mut conn, data).await
    }

    async fn update(
        mut self,
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        data: ContractCreate,
    ) -> DatabaseResult<Self> {
        sqlx::query("UPDATE contracts SET fp_id = $1, customer_name = $2, amount = $3, contracted_on = $4 WHERE id = $5")
            .bind(data.fp_id)
            .bind(&data.customer_name)
            .bind(data.amount)
            .bind(data.contracted_on)
            .bind(self.id)
            .execute(mm.executor())
            .await?;

        self.fp_id = data.fp_id;
        self.customer_name = data.customer_name;
        self.amount = data.amount;
        self.contracted_on = data.contracted_on;
        Ok(self)
    }

    async fn delete(self, mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM contracts WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM contracts WHERE id = $1")
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
        let result = sqlx::query_as("SELECT * FROM contracts ORDER BY contracted_on DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(mm.executor())
            .await?;
        Ok(result)
    }

    async fn count(mm: &ModelManager, _actor: &AuthenticatedUser) -> DatabaseResult<i64> {
        let result: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts")
            .fetch_one(mm.executor())
            .await?;

        Ok(result)
    }
}

impl_paginatable_for!(Contract, ContractCreate, Uuid);

#[async_trait]
impl HasOwner for Contract {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.fp_id)
    }
}
