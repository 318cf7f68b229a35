use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, PaginatableRepository, ResourceTyped,
        entity::{
            Event, EventCreate, EventSchedule, EventScheduleCreate, Registration, RosterRow,
            UserEntity,
        },
    },
    services::{Mail, deliver},
    web::{
        AppState, AuthenticatedUser, RequestContext, UserRole, WebError, WebResult,
        dto::events::{EventDetail, RegistrationResponse},
        error::ErrorResponse,
        middlewares,
        routes::PaginationQuery,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(events_list_handler).post(events_create_handler))
        .route("/{id}", get(events_get_handler))
        .route("/{id}/schedules", post(events_add_schedule_handler))
        .route(
            "/schedules/{id}/register",
            post(events_register_handler).delete(events_cancel_handler),
        )
        .route("/schedules/{id}/registrations", get(events_roster_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

async fn find_event(state: &AppState, user: &AuthenticatedUser, id: Uuid) -> WebResult<Event> {
    let rt = Event::get_resource_type();
    Event::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))
}

async fn find_schedule(
    state: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<EventSchedule> {
    let rt = EventSchedule::get_resource_type();
    EventSchedule::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/",
    params(PaginationQuery),
    description = "Events open to the caller's role, newest first",
    responses(
        (status = 200, description = "Returns requested page", body = crate::model::Page<Event>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_list_handler(
    ctx: RequestContext,
    Query(page): Query<PaginationQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let events = Event::page(state.pool(), user, page.limit(), page.offset())
        .await
        .map_err(|e| WebError::resource_fetch_error(Event::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(events)))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    params(("id" = Uuid, Path, description = "ID of the event")),
    responses(
        (status = 200, description = "Event with its schedules and seat counts", body = EventDetail),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Event not found or not open to you", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let event = find_event(&state, user, id).await?;

    if !user.user_role().at_least(event.required_role()) {
        return Err(WebError::resource_not_found(Event::get_resource_type()));
    }

    let schedules = EventSchedule::all_by_event(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(EventSchedule::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(EventDetail { event, schedules })))
}

#[utoipa::path(
    post,
    path = "/api/v1/events/",
    request_body = EventCreate,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 400, description = "Title is empty", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<EventCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;
    let rt = Event::get_resource_type();

    if payload.title.trim().is_empty() {
        return Err(WebError::resource_bad_request(rt, "title is empty"));
    }

    let event = Event::create(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/schedules",
    request_body = EventScheduleCreate,
    params(("id" = Uuid, Path, description = "ID of the event")),
    responses(
        (status = 201, description = "Schedule added", body = EventSchedule),
        (status = 400, description = "Schedule input invalid", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_add_schedule_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EventScheduleCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;
    let rt = EventSchedule::get_resource_type();

    let mut problems = Vec::new();
    if payload.capacity <= 0 {
        problems.push(String::from("capacity must be positive"));
    }
    if payload.ends_at <= payload.starts_at {
        problems.push(String::from("ends_at must be after starts_at"));
    }
    if payload.location.trim().is_empty() {
        problems.push(String::from("location is empty"));
    }
    if !problems.is_empty() {
        return Err(WebError::resource_rejected(rt, problems));
    }

    let event = find_event(&state, user, id).await?;
    let schedule = EventSchedule::create(state.pool(), user, event.id(), payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::CREATED, Json(schedule)))
}

#[utoipa::path(
    post,
    path = "/api/v1/events/schedules/{id}/register",
    params(("id" = Uuid, Path, description = "ID of the schedule")),
    description = "Takes a seat. Registering again after cancelling reactivates the seat",
    responses(
        (status = 200, description = "Registered", body = RegistrationResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Event needs a higher role", body = ErrorResponse),
        (status = 404, description = "Schedule not found", body = ErrorResponse),
        (status = 409, description = "Already registered, full, or already started", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_register_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Registration::get_resource_type();

    let schedule = find_schedule(&state, user, id).await?;
    let event = find_event(&state, user, schedule.event_id()).await?;

    if !user.user_role().at_least(event.required_role()) {
        return Err(WebError::role_forbidden(event.required_role()));
    }
    if *schedule.starts_at() <= Utc::now() {
        return Err(WebError::resource_conflict(rt, "schedule already started"));
    }

    let registration = Registration::register(state.pool(), user, schedule.id())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    let account = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    if let Some(account) = account {
        let starts_at = schedule.starts_at().format("%Y-%m-%d %H:%M UTC").to_string();
        let mail = Mail::registration_confirmed(
            account.email(),
            event.title(),
            &starts_at,
            schedule.location(),
        );
        deliver(state.mailer(), mail).await;
    }

    tracing::info!(user_id = %user.user_id(), schedule_id = %id, "registered for event");
    Ok((StatusCode::OK, Json(RegistrationResponse::from(registration))))
}

#[utoipa::path(
    delete,
    path = "/api/v1/events/schedules/{id}/register",
    params(("id" = Uuid, Path, description = "ID of the schedule")),
    description = "Gives the seat back. Only possible before the schedule starts",
    responses(
        (status = 200, description = "Cancelled", body = RegistrationResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Not registered for this schedule", body = ErrorResponse),
        (status = 409, description = "Schedule already started", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_cancel_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Registration::get_resource_type();

    let schedule = find_schedule(&state, user, id).await?;
    if *schedule.starts_at() <= Utc::now() {
        return Err(WebError::resource_conflict(rt, "schedule already started"));
    }

    let registration = Registration::find_live(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let cancelled = registration
        .cancel(state.pool())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(RegistrationResponse::from(cancelled))))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/schedules/{id}/registrations",
    params(("id" = Uuid, Path, description = "ID of the schedule")),
    responses(
        (status = 200, description = "Everyone registered, cancelled seats included", body = Vec<RosterRow>),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 404, description = "Schedule not found", body = ErrorResponse),
    ),
    tag = "events",
    security(("cookie" = []))
)]
async fn events_roster_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;

    let schedule = find_schedule(&state, user, id).await?;
    let roster = Registration::roster(state.pool(), user, schedule.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Registration::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(roster)))
}
