use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::model::repo::ResourceTyped;
use crate::model::{DatabaseError, ModelManager, Page, error::DatabaseResult};
use crate::services::compensation::{Breakdown, MonthRange};
use crate::web::AuthenticatedUser;

#[derive(Debug, Serialize, Deserialize, FromRow, utoipa::ToSchema)]
pub struct Compensation {
    id: Uuid,
    user_id: Uuid,
    period_start: NaiveDate,
    contract_count: i64,
    contract_total: i64,
    contract_commission: i64,
    referral_count: i64,
    referral_reward: i64,
    total_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

/// Per-user totals for one month, before rates are applied.
#[derive(Debug, Clone, FromRow)]
pub struct MonthlyActivityRow {
    pub user_id: Uuid,
    pub role: String,
    pub contract_count: i64,
    pub contract_total: i64,
    pub referral_count: i64,
}

impl ResourceTyped for Compensation {
    fn get_resource_type() -> crate::model::ResourceType {
        crate::model::ResourceType::Compensation
    }
}

impl Compensation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn period_start(&self) -> NaiveDate {
        self.period_start
    }

    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    pub fn contract_commission(&self) -> i64 {
        self.contract_commission
    }

    pub fn referral_reward(&self) -> i64 {
        self.referral_reward
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }

    /// Contracts closed and qualified referrals made within `range`, per user. A referral
    /// qualifies once the referred user has subscribed at least once.
    pub async fn monthly_activity_in(
        conn: &mut PgConnection,
        range: &MonthRange,
    ) -> DatabaseResult<Vec<MonthlyActivityRow>> {
        let rows = sqlx::query_as(
            r#"
            WITH c AS (
                SELECT fp_id AS user_id,
                       COUNT(*) AS contract_count,
                       COALESCE(SUM(amount), 0)::BIGINT AS contract_total
                FROM contracts
                WHERE contracted_on >= $1 AND contracted_on < $2
                GROUP BY fp_id
            ), r AS (
                SELECT rf.referrer_id AS user_id, COUNT(*) AS referral_count
                FROM referrals rf
                WHERE rf.created_at >= $3 AND rf.created_at < $4
                AND EXISTS (SELECT 1 FROM subscriptions s WHERE s.user_id = rf.referred_id)
                GROUP BY rf.referrer_id
            )
            SELECT
                u.id AS user_id,
                u.role,
                COALESCE(c.contract_count, 0) AS contract_count,
                COALESCE(c.contract_total, 0) AS contract_total,
                COALESCE(r.referral_count, 0) AS referral_count
            FROM users u
            LEFT JOIN c ON c.user_id = u.id
            LEFT JOIN r ON r.user_id = u.id
            WHERE c.user_id IS NOT NULL OR r.user_id IS NOT NULL
            ORDER BY u.id
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .bind(range.start_utc())
        .bind(range.end_utc())
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Writes a pending row. Returns false when the month is already paid out for this user.
    pub async fn upsert_pending_in(
        conn: &mut PgConnection,
        user_id: Uuid,
        period_start: NaiveDate,
        breakdown: &Breakdown,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO compensations
                (id, user_id, period_start, contract_count, contract_total, contract_commission,
                 referral_count, referral_reward, total_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, period_start) DO UPDATE SET
                contract_count = EXCLUDED.contract_count,
                contract_total = EXCLUDED.contract_total,
                contract_commission = EXCLUDED.contract_commission,
                referral_count = EXCLUDED.referral_count,
                referral_reward = EXCLUDED.referral_reward,
                total_amount = EXCLUDED.total_amount,
                created_at = now()
            WHERE compensations.status = 'pending'
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(period_start)
        .bind(breakdown.contract_count)
        .bind(breakdown.contract_total)
        .bind(breakdown.contract_commission)
        .bind(breakdown.referral_count)
        .bind(breakdown.referral_reward)
        .bind(breakdown.total())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drops pending rows of users that no longer have anything to be paid for the month.
    pub async fn prune_pending_in(
        conn: &mut PgConnection,
        period_start: NaiveDate,
        keep: &[Uuid],
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "DELETE FROM compensations WHERE period_start = $1 AND status = 'pending' AND NOT (user_id = ANY($2))",
        )
        .bind(period_start)
        .bind(keep)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        id: Uuid,
    ) -> DatabaseResult<Option<Self>> {
        let result = sqlx::query_as("SELECT * FROM compensations WHERE id = $1")
            .bind(id)
            .fetch_optional(mm.executor())
            .await?;
        Ok(result)
    }

    pub async fn mine(mm: &ModelManager, actor: &AuthenticatedUser) -> DatabaseResult<Vec<Self>> {
        let result = sqlx::query_as(
            "SELECT * FROM compensations WHERE user_id = $1 ORDER BY period_start DESC",
        )
        .bind(actor.user_id())
        .fetch_all(mm.executor())
        .await?;
        Ok(result)
    }

    pub async fn page(
        mm: &ModelManager,
        _actor: &AuthenticatedUser,
        period_start: Option<NaiveDate>,
        limit: i64,
        offset: i64,
    ) -> DatabaseResult<Page<Self>> {
        let items = sqlx::query_as(
            r#"
            SELECT * FROM compensations
            WHERE $1::DATE IS NULL OR period_start = $1
            ORDER BY period_start DESC, total_amount DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(period_start)
        .bind(limit)
        .bind(offset)
        .fetch_all(mm.executor())
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM compensations WHERE $1::DATE IS NULL OR period_start = $1",
        )
        .bind(period_start)
        .fetch_one(mm.executor())
        .await?;

        Ok(Page::new(items, total, limit, offset))
    }

    pub async fn mark_paid(mut self, mm: &ModelManager) -> DatabaseResult<Self> {
        if self.is_paid() {
            return Err(DatabaseError::Conflict("compensation already paid"));
        }

        let paid_at: DateTime<Utc> = sqlx::query_scalar(
            "UPDATE compensations SET status = 'paid', paid_at = now() WHERE id = $1 AND status = 'pending' RETURNING paid_at",
        )
        .bind(self.id)
        .fetch_optional(mm.executor())
        .await?
        .ok_or(DatabaseError::Conflict("compensation already paid"))?;

        self.status = String::from("paid");
        self.paid_at = Some(paid_at);
        Ok(self)
    }
}

#[async_trait::async_trait]
impl HasOwner for Compensation {
    type OwnerId = uuid::Uuid;

    async fn get_owner_id(
        &self,
        _mm: &ModelManager,
        _actor: &AuthenticatedUser,
    ) -> DatabaseResult<Self::OwnerId> {
        Ok(self.user_id)
    }
}
