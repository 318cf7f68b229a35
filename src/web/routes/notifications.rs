use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ResourceTyped, check_access,
        entity::{Notification, UserEntity},
    },
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, error::ErrorResponse,
        middlewares,
    },
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// Either `user_id` or `role` picks the recipients.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BroadcastBody {
    pub title: String,
    pub body: String,
    pub user_id: Option<Uuid>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BroadcastResponse {
    pub delivered: u64,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route(
            "/",
            get(notifications_list_handler).post(notifications_broadcast_handler),
        )
        .route("/{id}/read", post(notifications_read_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/",
    params(ListQuery),
    responses(
        (status = 200, description = "Own notifications, newest first", body = Vec<Notification>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notifications_list_handler(
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = Notification::mine(state.pool(), user, query.unread_only)
        .await
        .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "ID of the notification")),
    responses(
        (status = 200, description = "Marked as read", body = Notification),
        (status = 403, description = "Not your notification", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notifications_read_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Notification::get_resource_type();

    let found = Notification::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_access(state.pool(), user, &found, user.user_id())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    let read = found
        .mark_read(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok((StatusCode::OK, Json(read)))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/",
    request_body = BroadcastBody,
    description = "Sends a notification to one user or to everyone holding a role",
    responses(
        (status = 200, description = "Notifications stored", body = BroadcastResponse),
        (status = 400, description = "Recipients or text invalid", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Recipient not found", body = ErrorResponse),
    ),
    tag = "notifications",
    security(("cookie" = []))
)]
async fn notifications_broadcast_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<BroadcastBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Notification::get_resource_type();

    if payload.title.trim().is_empty() {
        return Err(WebError::resource_bad_request(rt, "title is empty"));
    }

    let recipients = match (payload.user_id, payload.role) {
        (Some(id), None) => {
            let target = UserEntity::find_by_id(state.pool(), user, id)
                .await
                .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
                .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;
            vec![target.id()]
        }
        (None, Some(role)) => UserEntity::ids_with_role(state.pool(), user, role)
            .await
            .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?,
        _ => {
            return Err(WebError::resource_bad_request(
                rt,
                "exactly one of user_id and role is required",
            ));
        }
    };

    let delivered =
        Notification::broadcast(state.pool(), user, &recipients, &payload.title, &payload.body)
            .await
            .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    tracing::info!(delivered, "notification broadcast");
    Ok((StatusCode::OK, Json(BroadcastResponse { delivered })))
}
