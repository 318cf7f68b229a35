//! Monthly payouts: commission on contracts closed plus a flat reward per qualified referral.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::Compensation as Rates;
use crate::model::entity::{Compensation, MonthlyActivityRow};
use crate::model::{DatabaseError, ModelManager};
use crate::web::UserRole;

#[derive(Debug, Error)]
pub enum CompensationError {
    #[error("invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Half-open calendar month `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl MonthRange {
    pub fn new(year: i32, month: u32) -> Result<Self, CompensationError> {
        let invalid = || CompensationError::InvalidMonth { year, month };
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;

        Ok(Self { start, end })
    }

    /// The calendar month before the one `now` falls in.
    pub fn previous(now: DateTime<Utc>) -> Result<Self, CompensationError> {
        let this_month = now.date_naive().with_day(1).unwrap_or(now.date_naive());
        let last = this_month
            .checked_sub_days(Days::new(1))
            .ok_or(CompensationError::InvalidMonth {
                year: now.year(),
                month: now.month(),
            })?;
        Self::new(last.year(), last.month())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub contract_count: i64,
    pub contract_total: i64,
    pub contract_commission: i64,
    pub referral_count: i64,
    pub referral_reward: i64,
}

impl Breakdown {
    pub fn total(&self) -> i64 {
        self.contract_commission + self.referral_reward
    }
}

/// Applies `rates` to one user's activity. Commission is paid to FPs and above only and is
/// rounded down to the minor unit.
pub fn calculate(activity: &MonthlyActivityRow, rates: &Rates) -> Breakdown {
    let role = UserRole::from(activity.role.as_str());
    let contract_commission = if role.at_least(UserRole::Fp) {
        let commission =
            i128::from(activity.contract_total) * i128::from(rates.contract_rate_bps()) / 10_000;
        i64::try_from(commission).unwrap_or(i64::MAX)
    } else {
        0
    };

    Breakdown {
        contract_count: activity.contract_count,
        contract_total: activity.contract_total,
        contract_commission,
        referral_count: activity.referral_count,
        referral_reward: activity.referral_count.saturating_mul(rates.referral_reward()),
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct GenerationSummary {
    pub period_start: NaiveDate,
    /// Pending rows inserted or refreshed.
    pub written: u64,
    /// Users whose month was already paid out.
    pub skipped_paid: u64,
    /// Stale pending rows removed.
    pub pruned: u64,
}

/// Recomputes every pending compensation for `range` in one transaction.
#[tracing::instrument(skip(mm, rates))]
pub async fn generate(
    mm: &ModelManager,
    range: MonthRange,
    rates: &Rates,
) -> Result<GenerationSummary, CompensationError> {
    let mut tx = mm.begin().await?;
    let activity = Compensation::monthly_activity_in(&mut tx, &range).await?;

    let mut summary = GenerationSummary {
        period_start: range.start(),
        written: 0,
        skipped_paid: 0,
        pruned: 0,
    };
    let mut keep = Vec::with_capacity(activity.len());

    for row in &activity {
        let breakdown = calculate(row, rates);
        if breakdown.total() == 0 {
            continue;
        }

        keep.push(row.user_id);
        if Compensation::upsert_pending_in(&mut tx, row.user_id, range.start(), &breakdown).await? {
            summary.written += 1;
        } else {
            summary.skipped_paid += 1;
        }
    }

    summary.pruned = Compensation::prune_pending_in(&mut tx, range.start(), &keep).await?;
    tx.commit().await.map_err(DatabaseError::from)?;

    tracing::info!(
        period = %summary.period_start,
        written = summary.written,
        skipped_paid = summary.skipped_paid,
        pruned = summary.pruned,
        "compensations generated"
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    fn activity(role: &str, total: i64, referrals: i64) -> MonthlyActivityRow {
        MonthlyActivityRow {
            user_id: Uuid::new_v4(),
            role: role.to_string(),
            contract_count: if total > 0 { 1 } else { 0 },
            contract_total: total,
            referral_count: referrals,
        }
    }

    #[test]
    fn month_range_bounds() {
        let range = MonthRange::new(2026, 2).unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());

        let december = MonthRange::new(2026, 12).unwrap();
        assert_eq!(december.end(), NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
        assert_eq!(december.end_utc(), Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_out_of_range_is_rejected() {
        assert!(matches!(
            MonthRange::new(2026, 13),
            Err(CompensationError::InvalidMonth { month: 13, .. })
        ));
        assert!(MonthRange::new(2026, 0).is_err());
    }

    #[test]
    fn previous_month_wraps_year() {
        let now = Utc.with_ymd_and_hms(2027, 1, 15, 8, 0, 0).unwrap();
        assert_eq!(MonthRange::previous(now).unwrap(), MonthRange::new(2026, 12).unwrap());
    }

    #[test]
    fn fp_commission_rounds_down() {
        let rates = Rates::new(1000, 3000);
        let b = calculate(&activity("fp", 12_345, 0), &rates);
        assert_eq!(b.contract_commission, 1_234);
        assert_eq!(b.total(), 1_234);
    }

    #[test]
    fn members_earn_referrals_only() {
        let rates = Rates::new(1000, 3000);
        let b = calculate(&activity("member", 50_000, 2), &rates);
        assert_eq!(b.contract_commission, 0);
        assert_eq!(b.referral_reward, 6_000);
        assert_eq!(b.total(), 6_000);
    }

    #[test]
    fn nothing_to_pay_totals_zero() {
        let rates = Rates::new(1000, 3000);
        assert_eq!(calculate(&activity("manager", 0, 0), &rates).total(), 0);
    }
}
