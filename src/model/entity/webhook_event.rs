use crate::model::{ModelManager, error::DatabaseResult};

/// Ledger of vendor webhook deliveries already handled.
pub struct WebhookEvent;

impl WebhookEvent {
    /// Claims `event_id`. Returns false when it was processed before.
    pub async fn claim(mm: &ModelManager, event_id: &str, event_type: &str) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (event_id, event_type) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(mm.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Gives the claim back so the vendor's retry gets processed.
    pub async fn release(mm: &ModelManager, event_id: &str) -> DatabaseResult<()> {
        sqlx::query("DELETE FROM webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(mm.executor())
            .await?;
        Ok(())
    }
}
