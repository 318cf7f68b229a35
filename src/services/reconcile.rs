use serde::Serialize;

use crate::model::entity::Subscription;
use crate::model::{DatabaseResult, ModelManager};
use crate::services::payments::PaymentGateway;
use crate::web::AuthenticatedUser;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Re-reads every stored subscription from the vendor and stores what it reports. A failed
/// lookup is logged and skipped so one bad record does not stop the run.
#[tracing::instrument(skip_all)]
pub async fn reconcile_subscriptions(
    mm: &ModelManager,
    payments: &dyn PaymentGateway,
) -> DatabaseResult<ReconcileSummary> {
    let system = AuthenticatedUser::admin();
    let mut summary = ReconcileSummary::default();

    for local in Subscription::all(mm, &system).await? {
        summary.checked += 1;

        let remote = match payments.retrieve_subscription(local.stripe_subscription_id()).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(subscription = %local.stripe_subscription_id(), error = %e, "reconcile lookup failed");
                summary.failed += 1;
                continue;
            }
        };

        let changed = remote.status != local.status()
            || remote.cancel_at_period_end != local.cancel_at_period_end()
            || remote.period_end().as_ref() != local.current_period_end();
        if changed {
            Subscription::upsert(mm, &system, remote.to_upsert(local.user_id())).await?;
            summary.updated += 1;
        }
    }

    tracing::info!(
        checked = summary.checked,
        updated = summary.updated,
        failed = summary.failed,
        "subscriptions reconciled"
    );
    Ok(summary)
}
