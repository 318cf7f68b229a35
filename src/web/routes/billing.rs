use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    Config,
    model::{
        CrudRepository, ResourceType, ResourceTyped,
        entity::{Subscription, UserEntity},
    },
    services::{CheckoutRequest, PromotionCode, Refund},
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, error::ErrorResponse,
        middlewares,
    },
};

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CheckoutBody {
    pub promotion_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CancelBody {
    #[serde(default)]
    pub immediately: bool,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefundBody {
    pub payment_intent: String,
    /// Partial refund in minor units; the whole charge when absent.
    pub amount: Option<i64>,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/checkout", post(billing_checkout_handler))
        .route("/subscription", get(billing_subscription_handler))
        .route("/cancel", post(billing_cancel_handler))
        .route("/refund", post(billing_refund_handler))
        .route("/promotion-codes/{code}", get(billing_promotion_code_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/v1/billing/checkout",
    request_body = CheckoutBody,
    description = "Starts a hosted checkout for the membership plan",
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Promotion code unknown or inactive", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 409, description = "Already subscribed", body = ErrorResponse),
        (status = 502, description = "Payment vendor failed", body = ErrorResponse),
    ),
    tag = "billing",
    security(("cookie" = []))
)]
async fn billing_checkout_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    body: Option<Json<CheckoutBody>>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let payload = body.map(|Json(b)| b).unwrap_or_default();
    let rt = Subscription::get_resource_type();

    let active = Subscription::has_active(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;
    if active {
        return Err(WebError::resource_conflict(rt, "subscription is already active"));
    }

    let promotion_code_id = match payload.promotion_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let found = state
                .payments()
                .find_promotion_code(code)
                .await?
                .filter(|p| p.active)
                .ok_or_else(|| {
                    WebError::resource_bad_request(ResourceType::Payment, "promotion code is unknown or inactive")
                })?;
            Some(found.id)
        }
        _ => None,
    };

    let mut account = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    let customer_id = match account.stripe_customer_id() {
        Some(id) => id.to_string(),
        None => {
            let id = state
                .payments()
                .create_customer(account.id(), account.email(), account.display_name())
                .await?;
            account
                .set_stripe_customer(state.pool(), &id)
                .await
                .map_err(|e| WebError::from_db(UserEntity::get_resource_type(), e))?;
            id
        }
    };

    let stripe = Config::get_or_init(false).await.stripe();
    let session = state
        .payments()
        .create_checkout_session(CheckoutRequest {
            customer_id,
            price_id: stripe.price_id().to_string(),
            success_url: stripe.success_url().to_string(),
            cancel_url: stripe.cancel_url().to_string(),
            client_reference_id: account.id().to_string(),
            promotion_code_id,
        })
        .await?;

    tracing::info!(user_id = %account.id(), session_id = %session.id, "checkout started");
    Ok((
        StatusCode::OK,
        Json(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/billing/subscription",
    responses(
        (status = 200, description = "Latest subscription", body = Subscription),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "No subscription yet", body = ErrorResponse),
    ),
    tag = "billing",
    security(("cookie" = []))
)]
async fn billing_subscription_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = Subscription::get_resource_type();

    let subscription = Subscription::latest_for_user(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    Ok((StatusCode::OK, Json(subscription)))
}

#[utoipa::path(
    post,
    path = "/api/v1/billing/cancel",
    request_body = CancelBody,
    description = "Cancels the latest subscription at period end, or right away with `immediately`",
    responses(
        (status = 200, description = "Subscription state after cancelling", body = Subscription),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "No subscription yet", body = ErrorResponse),
        (status = 502, description = "Payment vendor failed", body = ErrorResponse),
    ),
    tag = "billing",
    security(("cookie" = []))
)]
async fn billing_cancel_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    body: Option<Json<CancelBody>>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let payload = body.map(|Json(b)| b).unwrap_or_default();
    let rt = Subscription::get_resource_type();

    let current = Subscription::latest_for_user(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let remote = state
        .payments()
        .cancel_subscription(current.stripe_subscription_id(), payload.immediately)
        .await?;

    let stored = Subscription::upsert(state.pool(), user, remote.to_upsert(current.user_id()))
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    tracing::info!(
        user_id = %user.user_id(),
        immediately = payload.immediately,
        status = %stored.status(),
        "subscription cancelled"
    );
    Ok((StatusCode::OK, Json(stored)))
}

#[utoipa::path(
    post,
    path = "/api/v1/billing/refund",
    request_body = RefundBody,
    responses(
        (status = 200, description = "Refund created", body = Refund),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 402, description = "Refund declined", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 502, description = "Payment vendor failed", body = ErrorResponse),
    ),
    tag = "billing",
    security(("cookie" = []))
)]
async fn billing_refund_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<RefundBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;

    if payload.amount.is_some_and(|a| a <= 0) {
        return Err(WebError::resource_bad_request(ResourceType::Payment, "amount must be positive"));
    }

    let refund = state
        .payments()
        .create_refund(&payload.payment_intent, payload.amount)
        .await?;

    tracing::info!(
        admin = %user.user_id(),
        payment_intent = %payload.payment_intent,
        refund = %refund.id,
        "refund created"
    );
    Ok((StatusCode::OK, Json(refund)))
}

#[utoipa::path(
    get,
    path = "/api/v1/billing/promotion-codes/{code}",
    params(("code" = String, Path, description = "Customer-facing promotion code")),
    responses(
        (status = 200, description = "Promotion code is usable", body = PromotionCode),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Unknown or inactive code", body = ErrorResponse),
    ),
    tag = "billing",
    security(("cookie" = []))
)]
async fn billing_promotion_code_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?;

    let found = state
        .payments()
        .find_promotion_code(&code)
        .await?
        .filter(|p| p.active)
        .ok_or_else(|| WebError::resource_not_found(ResourceType::Payment))?;

    Ok((StatusCode::OK, Json(found)))
}
