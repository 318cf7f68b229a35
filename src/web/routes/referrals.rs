use axum::{
    Json, Router, extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::get,
};

use crate::{
    model::{
        CrudRepository, ResourceTyped,
        entity::{Referral, UserEntity},
    },
    web::{
        AppState, RequestContext, WebError, WebResult, dto::referrals::ReferralOverview,
        error::ErrorResponse, middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/me", get(referrals_me_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/referrals/me",
    description = "Own referral code and the people who signed up with it",
    responses(
        (status = 200, description = "Referral overview", body = ReferralOverview),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "referrals",
    security(("cookie" = []))
)]
async fn referrals_me_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let (account, referred) = tokio::try_join!(
        UserEntity::find_by_id(state.pool(), user, user.user_id()),
        Referral::referred_by(state.pool(), user, user.user_id()),
    )
    .map_err(|e| WebError::resource_fetch_error(Referral::get_resource_type(), e))?;

    let account =
        account.ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    Ok((
        StatusCode::OK,
        Json(ReferralOverview {
            referral_code: account.referral_code().to_string(),
            referred,
        }),
    ))
}
