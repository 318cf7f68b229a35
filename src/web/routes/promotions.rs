use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{ChecklistUpdate, Notification, PromotionRequest, UserEntity},
    },
    services::{Mail, deliver, promotion::may_update},
    web::{
        AppState, AuthenticatedUser, RequestContext, UserRole, WebError, WebResult,
        dto::promotions::PromotionResponse, error::ErrorResponse, middlewares,
        routes::PaginationQuery,
    },
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct StatusQuery {
    /// `pending`, `approved` or `rejected`. All when absent.
    pub status: Option<String>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", post(promotions_request_handler))
        .route("/mine", get(promotions_mine_handler))
        .route("/page", get(promotions_page_handler))
        .route("/{id}/checklist", put(promotions_checklist_handler))
        .route("/{id}/approve", post(promotions_approve_handler))
        .route("/{id}/reject", post(promotions_reject_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn find_request(
    state: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<PromotionRequest> {
    let rt = PromotionRequest::get_resource_type();
    PromotionRequest::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions/",
    description = "Applies for the next role up. Only one request may be pending at a time",
    responses(
        (status = 201, description = "Request opened", body = PromotionResponse),
        (status = 400, description = "No higher role to apply for", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 409, description = "A request is already pending", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_request_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = PromotionRequest::get_resource_type();

    let current = user.user_role();
    let target = current.next().ok_or_else(|| {
        WebError::resource_bad_request(rt, format!("role `{current}` has no promotion path"))
    })?;

    let request = PromotionRequest::create(state.pool(), user, current, target)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    tracing::info!(user_id = %user.user_id(), %target, "promotion requested");
    Ok((StatusCode::CREATED, Json(PromotionResponse::from(request))))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions/mine",
    responses(
        (status = 200, description = "Own requests, newest first", body = Vec<PromotionResponse>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_mine_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let requests = PromotionRequest::mine(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(PromotionRequest::get_resource_type(), e))?;
    let res: Vec<PromotionResponse> = requests.into_iter().map(PromotionResponse::from).collect();

    Ok((StatusCode::OK, Json(res)))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions/page",
    params(PaginationQuery, StatusQuery),
    responses(
        (status = 200, description = "Returns requested page", body = crate::model::Page<PromotionRequest>),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_page_handler(
    ctx: RequestContext,
    Query(page): Query<PaginationQuery>,
    Query(filter): Query<StatusQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;

    let requests = PromotionRequest::page(
        state.pool(),
        user,
        filter.status.as_deref(),
        page.limit(),
        page.offset(),
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(PromotionRequest::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(requests)))
}

#[utoipa::path(
    put,
    path = "/api/v1/promotions/{id}/checklist",
    request_body = ChecklistUpdate,
    params(("id" = Uuid, Path, description = "ID of the promotion request")),
    description = "Ticks checklist items. Applicants may set the test and survey, managers anything",
    responses(
        (status = 200, description = "Checklist stored", body = PromotionResponse),
        (status = 403, description = "You may not set these flags", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
        (status = 409, description = "Request already decided", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_checklist_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChecklistUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = PromotionRequest::get_resource_type();

    let found = find_request(&state, user, id).await?;
    let is_owner = found.user_id() == user.user_id();
    if !may_update(user.user_role(), is_owner, &payload) {
        return Err(WebError::resource_forbidden(rt));
    }

    let updated = found
        .update_checklist(state.pool(), payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(PromotionResponse::from(updated))))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions/{id}/approve",
    params(("id" = Uuid, Path, description = "ID of the promotion request")),
    description = "Raises the applicant's role. The approver must be an admin or outrank the target role",
    responses(
        (status = 200, description = "Approved", body = PromotionResponse),
        (status = 403, description = "You may not decide this request", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
        (status = 409, description = "Not pending or checklist incomplete", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_approve_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;
    let rt = PromotionRequest::get_resource_type();

    find_request(&state, user, id).await?;
    let approved = PromotionRequest::approve(state.pool(), user, id)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    let role = approved.target_role();
    Notification::create(
        state.pool(),
        user,
        approved.user_id(),
        "Promotion approved",
        &format!("Congratulations, you are now `{role}`."),
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    let applicant = UserEntity::find_by_id(state.pool(), user, approved.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    if let Some(applicant) = applicant {
        deliver(
            state.mailer(),
            Mail::promotion_approved(applicant.email(), &role.to_string()),
        )
        .await;
    }

    tracing::info!(request_id = %id, user_id = %approved.user_id(), %role, "promotion approved");
    Ok((StatusCode::OK, Json(PromotionResponse::from(approved))))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions/{id}/reject",
    params(("id" = Uuid, Path, description = "ID of the promotion request")),
    responses(
        (status = 200, description = "Rejected", body = PromotionResponse),
        (status = 403, description = "You may not decide this request", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
        (status = 409, description = "Request already decided", body = ErrorResponse),
    ),
    tag = "promotions",
    security(("cookie" = []))
)]
async fn promotions_reject_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;
    let rt = PromotionRequest::get_resource_type();

    let found = find_request(&state, user, id).await?;
    let rejected = found
        .reject(state.pool(), user)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(PromotionResponse::from(rejected))))
}
