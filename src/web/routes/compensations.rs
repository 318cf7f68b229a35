use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    Config,
    model::{ResourceType, ResourceTyped, entity::Compensation},
    services::compensation::{CompensationError, GenerationSummary, MonthRange, generate},
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, error::ErrorResponse,
        middlewares, routes::PaginationQuery,
    },
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PeriodQuery {
    /// First day of the month, e.g. `2025-03-01`.
    pub period: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct GenerateBody {
    pub year: i32,
    pub month: u32,
}

impl From<CompensationError> for WebError {
    fn from(value: CompensationError) -> Self {
        let rt = ResourceType::Compensation;
        match value {
            e @ CompensationError::InvalidMonth { .. } => WebError::resource_bad_request(rt, e.to_string()),
            CompensationError::Database(e) => WebError::from_db(rt, e),
        }
    }
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/me", get(compensations_me_handler))
        .route("/page", get(compensations_page_handler))
        .route("/generate", post(compensations_generate_handler))
        .route("/{id}/paid", post(compensations_mark_paid_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/compensations/me",
    responses(
        (status = 200, description = "Own payouts, newest month first", body = Vec<Compensation>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "compensations",
    security(("cookie" = []))
)]
async fn compensations_me_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = Compensation::mine(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(Compensation::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    get,
    path = "/api/v1/compensations/page",
    params(PaginationQuery, PeriodQuery),
    responses(
        (status = 200, description = "Returns requested page", body = crate::model::Page<Compensation>),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "compensations",
    security(("cookie" = []))
)]
async fn compensations_page_handler(
    ctx: RequestContext,
    Query(page): Query<PaginationQuery>,
    Query(period): Query<PeriodQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;

    let rows = Compensation::page(state.pool(), user, period.period, page.limit(), page.offset())
        .await
        .map_err(|e| WebError::resource_fetch_error(Compensation::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    post,
    path = "/api/v1/compensations/generate",
    request_body = GenerateBody,
    description = "Recomputes pending payouts for one month. Paid rows are never touched",
    responses(
        (status = 200, description = "Generation summary", body = GenerationSummary),
        (status = 400, description = "Month outside 1..=12", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "compensations",
    security(("cookie" = []))
)]
async fn compensations_generate_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<GenerateBody>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require(UserRole::Admin)?;

    let range = MonthRange::new(payload.year, payload.month)?;
    let rates = Config::get_or_init(false).await.compensation();
    let summary = generate(state.pool(), range, rates).await?;

    Ok((StatusCode::OK, Json(summary)))
}

#[utoipa::path(
    post,
    path = "/api/v1/compensations/{id}/paid",
    params(("id" = Uuid, Path, description = "ID of the compensation")),
    responses(
        (status = 200, description = "Marked as paid", body = Compensation),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Compensation not found", body = ErrorResponse),
        (status = 409, description = "Already paid", body = ErrorResponse),
    ),
    tag = "compensations",
    security(("cookie" = []))
)]
async fn compensations_mark_paid_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Compensation::get_resource_type();

    let found = Compensation::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let paid = found
        .mark_paid(state.pool())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    tracing::info!(compensation_id = %id, user_id = %paid.user_id(), amount = paid.total_amount(), "compensation paid");
    Ok((StatusCode::OK, Json(paid)))
}
