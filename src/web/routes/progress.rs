use axum::{
    Json, Router, extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::get,
};

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{Lesson, LessonProgress, UserEntity},
    },
    web::{
        AppState, RequestContext, WebError, WebResult, dto::progress::UserProgressResponse,
        error::ErrorResponse, middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(progress_get_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/",
    description = "Get current user's progress over the lessons their role can open",
    responses(
        (status = 200, description = "Progress found", body = UserProgressResponse),
        (status = 401, description = "You're not authorized to do this", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(
        ("cookie" = [])
    )
)]
async fn progress_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let (total_lessons, completed_lessons, account) = tokio::try_join!(
        Lesson::count_visible(state.pool(), user),
        LessonProgress::count_completed(state.pool(), user),
        UserEntity::find_by_id(state.pool(), user, user.user_id()),
    )
    .map_err(|e| WebError::resource_fetch_error(LessonProgress::get_resource_type(), e))?;

    let account =
        account.ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;
    let res = UserProgressResponse::new(
        total_lessons,
        completed_lessons,
        account.display_name().to_string(),
    );

    Ok((StatusCode::OK, Json(res)))
}
