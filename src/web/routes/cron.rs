use axum::{
    Json, Router, extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    Config,
    model::{ResourceTyped, entity::AccountToken},
    services::compensation::{GenerationSummary, MonthRange, generate},
    web::{AppState, AuthenticatedUser, WebError, WebResult, error::ErrorResponse, middlewares},
};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MonthlyRunSummary {
    pub compensations: GenerationSummary,
    pub expired_tokens_removed: u64,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/monthly", post(cron_monthly_handler))
        .layer(middleware::from_fn(middlewares::require_cron_secret))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/v1/cron/monthly",
    description = "Scheduler hook: generates last month's compensations and drops expired account tokens",
    params(("x-cron-secret" = String, Header, description = "Shared scheduler secret")),
    responses(
        (status = 200, description = "Run summary", body = MonthlyRunSummary),
        (status = 403, description = "Secret missing or wrong", body = ErrorResponse),
    ),
    tag = "cron"
)]
async fn cron_monthly_handler(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let system = AuthenticatedUser::admin();

    let range = MonthRange::previous(Utc::now())?;
    let rates = Config::get_or_init(false).await.compensation();
    let compensations = generate(state.pool(), range, rates).await?;

    let expired_tokens_removed = AccountToken::cleanup_expired(state.pool(), &system)
        .await
        .map_err(|e| WebError::resource_fetch_error(AccountToken::get_resource_type(), e))?;

    tracing::info!(
        period = %compensations.period_start,
        written = compensations.written,
        expired_tokens_removed,
        "monthly run finished"
    );
    Ok((
        StatusCode::OK,
        Json(MonthlyRunSummary {
            compensations,
            expired_tokens_removed,
        }),
    ))
}
