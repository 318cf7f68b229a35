use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router, extract::State, middleware, response::IntoResponse, routing::get};
use chrono::Utc;
use uuid::Uuid;

use crate::Config;
use crate::model::entity::{Course, Lesson, LessonCreate, LessonProgress, LessonWithStatusRow, Subscription};
use crate::model::{CrudRepository, ResourceTyped};
use crate::services::storage;
use crate::utils::uploads::normalize_relative;
use crate::web::dto::lessons::{LessonResponse, MaterialLink};
use crate::web::error::ErrorResponse;
use crate::web::{
    AppState, AuthenticatedUser, RequestContext, UserRole, WebError, WebResult, middlewares,
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", post(lessons_create_handler))
        .route(
            "/{id}",
            get(lessons_get_handler)
                .put(lessons_update_handler)
                .delete(lessons_delete_handler),
        )
        .route("/{id}/done", post(lessons_mark_done_handler))
        .route("/{id}/material", get(lessons_material_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

/// Lessons need the course's tier, plus a live subscription below manager level.
async fn check_lesson_access(
    state: &AppState,
    user: &AuthenticatedUser,
    course_id: Uuid,
) -> WebResult<()> {
    let rt = Lesson::get_resource_type();
    let course = Course::find_by_id(state.pool(), user, course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    if !course.is_visible_to(user.user_role()) {
        return Err(WebError::resource_forbidden(rt));
    }

    if user.user_role().at_least(UserRole::Manager) {
        return Ok(());
    }

    let paying = Subscription::has_active(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Subscription::get_resource_type(), e))?;
    if !paying {
        return Err(WebError::resource_forbidden(rt));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/lessons/{lesson_id}",
    description = "Fetch comprehensive info about lesson including its content. Needs the course's role and an active subscription below manager level",
    params(
        ("lesson_id" = Uuid, Path, description = "ID of the lesson to get")
    ),
    responses(
        (status = 200, description = "Lesson found", body = LessonResponse),
        (status = 401, description = "You're not authorized to do this", body = ErrorResponse),
        (status = 403, description = "Role or subscription missing", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_get_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Lesson::get_resource_type();

    let lesson = LessonWithStatusRow::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_lesson_access(&state, user, lesson.course_id).await?;

    let next = LessonWithStatusRow::find_next_uncompleted(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok((StatusCode::OK, Json(LessonResponse::new(lesson, next))))
}

#[utoipa::path(
    post,
    path = "/api/v1/lessons/{lesson_id}/done",
    description = "Mark lesson as done. Repeating it changes nothing",
    params(
        ("lesson_id" = Uuid, Path, description = "ID of the lesson to mark")
    ),
    responses(
        (status = 200, description = "Lesson marked"),
        (status = 401, description = "You're not allowed to do this", body = ErrorResponse),
        (status = 403, description = "Role or subscription missing", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_mark_done_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Lesson::get_resource_type();

    let lesson = Lesson::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_lesson_access(&state, user, lesson.course_id()).await?;

    LessonProgress::mark_done(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/api/v1/lessons/{lesson_id}/material",
    description = "Signed link to the lesson's attachment, valid for 15 minutes",
    params(
        ("lesson_id" = Uuid, Path, description = "ID of the lesson")
    ),
    responses(
        (status = 200, description = "Link issued", body = MaterialLink),
        (status = 401, description = "You're not allowed to do this", body = ErrorResponse),
        (status = 403, description = "Role or subscription missing", body = ErrorResponse),
        (status = 404, description = "Lesson or attachment not found", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_material_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Lesson::get_resource_type();

    let lesson = Lesson::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_lesson_access(&state, user, lesson.course_id()).await?;

    let path = lesson
        .material_path()
        .and_then(normalize_relative)
        .ok_or_else(|| WebError::resource_not_found(crate::model::ResourceType::File))?;

    let key = Config::get_or_init(false).await.app().storage_key();
    let (url, expires) =
        storage::signed_url(key, &path, Utc::now()).map_err(WebError::server_crypt_error)?;

    Ok((StatusCode::OK, Json(MaterialLink { url, expires })))
}

#[utoipa::path(
    post,
    path = "/api/v1/lessons/",
    request_body = LessonCreate,
    responses(
        (status = 201, description = "Lesson created", body = Lesson),
        (status = 400, description = "Title is empty", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_create_handler(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(mut payload): Json<LessonCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    check_payload(&state, user, &mut payload).await?;

    let lesson = Lesson::create(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(Lesson::get_resource_type(), e))?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

#[utoipa::path(
    put,
    path = "/api/v1/lessons/{lesson_id}",
    request_body = LessonCreate,
    params(
        ("lesson_id" = Uuid, Path, description = "ID of the lesson")
    ),
    responses(
        (status = 200, description = "Lesson updated", body = Lesson),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Lesson or course not found", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_update_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
    Json(mut payload): Json<LessonCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Lesson::get_resource_type();
    check_payload(&state, user, &mut payload).await?;

    let found = Lesson::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let updated = found
        .update(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/lessons/{lesson_id}",
    params(
        ("lesson_id" = Uuid, Path, description = "ID of the lesson")
    ),
    responses(
        (status = 200, description = "Lesson deleted"),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
    ),
    security(
        ("cookie" = [])
    ),
    tag = "lessons"
)]
async fn lessons_delete_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ctx: RequestContext,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Lesson::get_resource_type();

    let found = Lesson::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    found
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok(StatusCode::OK)
}

/// Validates the input and rewrites `material_path` into its stored form.
async fn check_payload(state: &AppState, user: &AuthenticatedUser, payload: &mut LessonCreate) -> WebResult<()> {
    let rt = Lesson::get_resource_type();
    if payload.title.trim().is_empty() {
        return Err(WebError::resource_bad_request(rt, "title is empty"));
    }
    if let Some(raw) = payload.material_path.take() {
        let normalized = normalize_relative(&raw)
            .ok_or_else(|| WebError::resource_bad_request(rt, "material_path must be relative"))?;
        payload.material_path = Some(normalized);
    }

    Course::find_by_id(state.pool(), user, payload.course_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Course::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(Course::get_resource_type()))?;
    Ok(())
}
