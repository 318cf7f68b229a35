use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{Course, CourseCreate, CourseWithLessonsRow},
    },
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, dto::courses::CourseWithLessons,
        error::ErrorResponse, middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(courses_list_handler).post(courses_create_handler))
        .route(
            "/{id}",
            get(courses_get_handler)
                .put(courses_update_handler)
                .delete(courses_delete_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn check_title(title: &str) -> WebResult<()> {
    if title.trim().is_empty() {
        return Err(WebError::resource_bad_request(Course::get_resource_type(), "title is empty"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/",
    description = "Courses open to the caller's role, each with its lessons and completion flags",
    responses(
        (status = 200, description = "Successfully collected courses", body = Vec<CourseWithLessons>),
        (status = 401, description = "You had to be authorized to do this", body = ErrorResponse),
        (status = 500, description = "Internal Server Error", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
async fn courses_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Course::get_resource_type();

    let rows = CourseWithLessonsRow::fetch_visible(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;
    let courses = CourseWithLessons::from_rows(rows).map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok((StatusCode::OK, Json(courses)))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}",
    params(("id" = Uuid, Path, description = "ID of the course")),
    responses(
        (status = 200, description = "Course found", body = CourseWithLessons),
        (status = 401, description = "You had to be authorized to do this", body = ErrorResponse),
        (status = 404, description = "Course not found or not open to you", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
async fn courses_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Course::get_resource_type();

    let row = CourseWithLessonsRow::fetch_one(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;
    let course = CourseWithLessons::try_from(row)
        .map_err(|e| WebError::resource_fetch_error(rt, e.into()))?;

    // hidden courses look missing
    if !course.is_visible_to(user.user_role()) {
        return Err(WebError::resource_not_found(rt));
    }

    Ok((StatusCode::OK, Json(course)))
}

#[utoipa::path(
    post,
    path = "/api/v1/courses/",
    request_body = CourseCreate,
    responses(
        (status = 201, description = "Course created", body = Course),
        (status = 400, description = "Title is empty", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
async fn courses_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    check_title(&payload.title)?;

    let course = Course::create(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(Course::get_resource_type(), e))?;

    Ok((StatusCode::CREATED, Json(course)))
}

#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}",
    request_body = CourseCreate,
    params(("id" = Uuid, Path, description = "ID of the course")),
    responses(
        (status = 200, description = "Course updated", body = Course),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
async fn courses_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Course::get_resource_type();
    check_title(&payload.title)?;

    let found = Course::find_by_id(state.pool(), user, id)
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
    path = "/api/v1/courses/{id}",
    description = "Deletes a course together with its lessons",
    params(("id" = Uuid, Path, description = "ID of the course")),
    responses(
        (status = 200, description = "Course deleted"),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
async fn courses_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = Course::get_resource_type();

    let found = Course::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    found
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok(StatusCode::OK)
}
