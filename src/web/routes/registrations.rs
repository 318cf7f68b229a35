use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    model::{
        ResourceTyped, check_access_or_role,
        entity::{AttendanceUpdate, MyRegistrationRow, Registration},
    },
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult,
        dto::events::RegistrationResponse, error::ErrorResponse, middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/mine", get(registrations_mine_handler))
        .route("/{id}/attendance", put(registrations_attendance_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/registrations/mine",
    responses(
        (status = 200, description = "Own registrations, upcoming first", body = Vec<MyRegistrationRow>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "registrations",
    security(("cookie" = []))
)]
async fn registrations_mine_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let rows = Registration::mine(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(Registration::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    put,
    path = "/api/v1/registrations/{id}/attendance",
    request_body = AttendanceUpdate,
    params(("id" = Uuid, Path, description = "ID of the registration")),
    description = "Records video and survey completion. The attendee or a manager may do this",
    responses(
        (status = 200, description = "Attendance stored, status derived", body = RegistrationResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Not your registration", body = ErrorResponse),
        (status = 404, description = "Registration not found", body = ErrorResponse),
        (status = 409, description = "Registration was cancelled", body = ErrorResponse),
    ),
    tag = "registrations",
    security(("cookie" = []))
)]
async fn registrations_attendance_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttendanceUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Registration::get_resource_type();

    let found = Registration::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_access_or_role(state.pool(), user, &found, user.user_id(), UserRole::Manager)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    if found.cancelled_at().is_some() {
        return Err(WebError::resource_conflict(rt, "registration was cancelled"));
    }

    let updated = found
        .update_attendance(state.pool(), payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(RegistrationResponse::from(updated))))
}
