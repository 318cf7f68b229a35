use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    Config,
    model::{ResourceType, entity::WebhookEvent},
    services::webhook::{EventOutcome, StripeEvent, WebhookError, handle_event, verify_signature},
    web::{AppState, WebError, WebResult, error::ErrorResponse},
};

pub static SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/stripe", post(webhooks_stripe_handler))
        .with_state(state)
}

impl From<WebhookError> for WebError {
    fn from(value: WebhookError) -> Self {
        match value {
            WebhookError::Payload(e) => WebError::resource_bad_request(ResourceType::WebhookEvent, e.to_string()),
            WebhookError::Database(e) => WebError::resource_fetch_error(ResourceType::WebhookEvent, e),
            WebhookError::Payment(e) => WebError::PaymentError(e),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    description = "Receives payment vendor events. Each event id is applied once",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Signature or payload invalid", body = ErrorResponse),
        (status = 500, description = "Event could not be applied, retry later", body = ErrorResponse),
    ),
    tag = "webhooks"
)]
async fn webhooks_stripe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<impl IntoResponse> {
    let rt = ResourceType::WebhookEvent;
    let secret = Config::get_or_init(false).await.stripe().webhook_secret();

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| WebError::resource_bad_request(rt, "signature header is missing"))?;

    verify_signature(secret, header, &body, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(error = %e, "rejected webhook signature");
        WebError::resource_bad_request(rt, e.to_string())
    })?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| WebError::resource_bad_request(rt, e.to_string()))?;
    let event_id = event.id.clone();

    let claimed = WebhookEvent::claim(state.pool(), &event_id, &event.event_type)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;
    if !claimed {
        tracing::info!(event_id = %event_id, "duplicate webhook event skipped");
        return Ok((
            StatusCode::OK,
            Json(WebhookAck {
                received: true,
                duplicate: true,
            }),
        ));
    }

    match handle_event(state.pool(), state.payments(), state.mailer(), event).await {
        Ok(outcome) => {
            if outcome == EventOutcome::UnknownCustomer {
                tracing::warn!(event_id = %event_id, "webhook event names an unknown customer");
            }
            Ok((
                StatusCode::OK,
                Json(WebhookAck {
                    received: true,
                    duplicate: false,
                }),
            ))
        }
        Err(e) => {
            // let the vendor redeliver
            if let Err(release) = WebhookEvent::release(state.pool(), &event_id).await {
                tracing::error!(event_id = %event_id, error = %release, "failed to release webhook claim");
            }
            Err(e.into())
        }
    }
}
