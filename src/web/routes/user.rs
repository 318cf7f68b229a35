use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    Config,
    auth::{hash_password, verify_password},
    model::{
        CrudRepository, PaginatableRepository, ResourceTyped, check_access,
        entity::{
            AccountToken, AccountTokenCreate, Notification, Referral, Subscription, TokenPurpose,
            UserEntity, UserEntityCreateUpdate,
        },
    },
    services::{Mail, deliver},
    utils::validate::{MIN_PASSWORD_LEN, looks_like_email},
    web::{
        AppState, AuthenticatedUser, RequestContext, UserRole, WebError, WebResult,
        dto::account::MeResponse,
        error::ErrorResponse,
        middlewares::{self, remove_session_cookie, set_session_cookie},
        routes::PaginationQuery,
    },
};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SignupBody {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SigninBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UserUpdateBody {
    pub display_name: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UserRoleBody {
    pub role: UserRole,
}

#[derive(Debug, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordResetBody {
    pub email: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordResetConfirmBody {
    pub token: String,
    pub password: String,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/signup", post(user_signup_handler))
        .route("/signin", post(user_signin_handler))
        .route("/signout", post(user_signout_handler))
        .route("/verify-email", get(user_verify_email_handler))
        .route("/password-reset", post(user_password_reset_handler))
        .route("/password-reset/confirm", post(user_password_reset_confirm_handler))
        .route("/page", get(user_list_handler))
        .route("/verify", get(user_verify_handler))
        .route("/me", get(user_me_handler))
        .route("/verify-email/resend", post(user_resend_verification_handler))
        .route(
            "/{id}",
            put(user_update_handler).delete(user_delete_handler),
        )
        .route("/{id}/role", put(user_set_role_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn signup_problems(payload: &SignupBody) -> Vec<String> {
    let mut problems = Vec::new();
    if !looks_like_email(&payload.email) {
        problems.push(String::from("email is not a valid address"));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!("password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if payload.display_name.trim().is_empty() {
        problems.push(String::from("display_name is empty"));
    }
    problems
}

async fn link(path: &str, token: &str) -> String {
    let public_url = Config::get_or_init(false).await.host().public_url();
    format!("{public_url}{path}?token={token}")
}

#[utoipa::path(
    post,
    path = "/api/v1/account/signup",
    request_body = SignupBody,
    description = "Creates a member account, records the referral and mails an email confirmation link",
    responses(
        (status = 200, description = "User created successfully", body = UserEntity),
        (status = 400, description = "Invalid input or unknown referral code", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "account"
)]
async fn user_signup_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SignupBody>,
) -> WebResult<impl IntoResponse> {
    let rt = UserEntity::get_resource_type();
    let problems = signup_problems(&payload);
    if !problems.is_empty() {
        return Err(WebError::resource_rejected(rt, problems));
    }

    let admin = AuthenticatedUser::admin();
    let found = UserEntity::find_by_email(state.pool(), &admin, &payload.email)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;
    if found.is_some() {
        return Err(WebError::registration_conflict());
    }

    let referrer = match payload.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let referrer = UserEntity::find_by_referral_code(state.pool(), &admin, code)
                .await
                .map_err(|e| WebError::resource_fetch_error(rt, e))?;
            Some(referrer.ok_or_else(|| WebError::registration_referral_invalid(code))?)
        }
        _ => None,
    };

    let hash = hash_password(&payload.password).map_err(WebError::server_crypt_error)?;

    let mut tx = state
        .pool()
        .begin()
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    let created = UserEntity::create_in(
        &mut tx,
        UserEntityCreateUpdate {
            email: payload.email,
            display_name: payload.display_name.trim().to_string(),
            password_hash: hash,
            role: UserRole::Member,
            referred_by: referrer.as_ref().map(UserEntity::id),
        },
    )
    .await
    .map_err(|e| {
        if e.is_conflict() {
            WebError::registration_conflict()
        } else {
            WebError::resource_fetch_error(rt, e)
        }
    })?;

    if let Some(referrer) = &referrer {
        Referral::create_in(&mut tx, referrer.id(), created.id())
            .await
            .map_err(|e| WebError::from_db(Referral::get_resource_type(), e))?;
    }

    let token = AccountToken::create_in(
        &mut tx,
        AccountTokenCreate::new(created.id(), TokenPurpose::VerifyEmail),
    )
    .await
    .map_err(|e| WebError::from_db(AccountToken::get_resource_type(), e))?;

    tx.commit()
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e.into()))?;

    let url = link("/api/v1/account/verify-email", token.token()).await;
    deliver(state.mailer(), Mail::verify_email(created.email(), &url)).await;

    set_session_cookie(&cookies, created.id()).await?;
    tracing::info!(user_id = %created.id(), referred = referrer.is_some(), "user signed up");

    Ok((StatusCode::OK, Json(created)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/signin",
    description = "Authorizes user in the system",
    request_body = SigninBody,
    responses(
        (status = 200, description = "User signed in", body = UserEntity),
        (status = 401, description = "Credentials invalid", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "account",
)]
async fn user_signin_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SigninBody>,
) -> WebResult<impl IntoResponse> {
    let admin = AuthenticatedUser::admin();
    let found = UserEntity::find_by_email(state.pool(), &admin, &payload.email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(WebError::auth_invalid_credentials)?;

    let is_verified =
        verify_password(found.hash(), &payload.password).map_err(WebError::server_crypt_error)?;

    if !is_verified {
        return Err(WebError::auth_invalid_credentials());
    }

    set_session_cookie(&cookies, found.id()).await?;
    Ok((StatusCode::OK, Json(found)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/signout",
    description = "Drops the session cookie",
    responses((status = 200, description = "Signed out")),
    tag = "account",
)]
async fn user_signout_handler(cookies: Cookies) -> impl IntoResponse {
    remove_session_cookie(&cookies);
    StatusCode::OK
}

#[utoipa::path(
    get,
    path = "/api/v1/account/verify",
    description = "Checks whether the session cookie is valid",
    responses(
        (status = 200, description = "Session is valid"),
        (status = 401, description = "No valid session"),
    ),
    tag = "account",
)]
async fn user_verify_handler(ctx: RequestContext) -> WebResult<impl IntoResponse> {
    let user = ctx.maybe_user();

    if user.is_none() {
        return Ok(StatusCode::UNAUTHORIZED);
    }

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/api/v1/account/me",
    responses(
        (status = 200, description = "Current user and subscription state", body = MeResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
    ),
    tag = "account",
    security(("cookie" = []))
)]
async fn user_me_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = UserEntity::get_resource_type();

    let found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let (subscription, subscription_active) = tokio::try_join!(
        Subscription::latest_for_user(state.pool(), user, user.user_id()),
        Subscription::has_active(state.pool(), user, user.user_id()),
    )
    .map_err(|e| WebError::resource_fetch_error(Subscription::get_resource_type(), e))?;

    Ok((
        StatusCode::OK,
        Json(MeResponse {
            user: found,
            subscription_active,
            subscription,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/account/verify-email",
    params(TokenQuery),
    description = "Confirms the email address. Tokens are single-use",
    responses(
        (status = 200, description = "Email verified", body = UserEntity),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse),
    ),
    tag = "account",
)]
async fn user_verify_email_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> WebResult<impl IntoResponse> {
    let admin = AuthenticatedUser::admin();
    let rt = AccountToken::get_resource_type();

    let token = AccountToken::find_by_token(state.pool(), &admin, &query.token, TokenPurpose::VerifyEmail)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .filter(|t| !t.is_expired())
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let mut user = UserEntity::find_by_id(state.pool(), &admin, token.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    user.mark_email_verified(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    token
        .delete(state.pool(), &admin)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok((StatusCode::OK, Json(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/account/verify-email/resend",
    description = "Mails a fresh confirmation link",
    responses(
        (status = 200, description = "Mail queued"),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 409, description = "Email already verified", body = ErrorResponse),
    ),
    tag = "account",
    security(("cookie" = []))
)]
async fn user_resend_verification_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = UserEntity::get_resource_type();

    let found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;
    if found.email_verified() {
        return Err(WebError::resource_conflict(rt, "email already verified"));
    }

    let token = AccountToken::create(
        state.pool(),
        user,
        AccountTokenCreate::new(found.id(), TokenPurpose::VerifyEmail),
    )
    .await
    .map_err(|e| WebError::from_db(AccountToken::get_resource_type(), e))?;

    let url = link("/api/v1/account/verify-email", token.token()).await;
    deliver(state.mailer(), Mail::verify_email(found.email(), &url)).await;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/v1/account/password-reset",
    request_body = PasswordResetBody,
    description = "Mails a one hour reset link when the account exists. Always answers 200",
    responses((status = 200, description = "Request accepted")),
    tag = "account",
)]
async fn user_password_reset_handler(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetBody>,
) -> WebResult<impl IntoResponse> {
    let admin = AuthenticatedUser::admin();
    let found = UserEntity::find_by_email(state.pool(), &admin, &payload.email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    if let Some(user) = found {
        let token = AccountToken::create(
            state.pool(),
            &admin,
            AccountTokenCreate::new(user.id(), TokenPurpose::ResetPassword),
        )
        .await
        .map_err(|e| WebError::from_db(AccountToken::get_resource_type(), e))?;

        let url = link("/reset-password", token.token()).await;
        deliver(state.mailer(), Mail::password_reset(user.email(), &url)).await;
    }

    Ok(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/v1/account/password-reset/confirm",
    request_body = PasswordResetConfirmBody,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Password too short", body = ErrorResponse),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse),
    ),
    tag = "account",
)]
async fn user_password_reset_confirm_handler(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmBody>,
) -> WebResult<impl IntoResponse> {
    let admin = AuthenticatedUser::admin();
    let rt = AccountToken::get_resource_type();

    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WebError::resource_bad_request(
            UserEntity::get_resource_type(),
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    let token = AccountToken::find_by_token(state.pool(), &admin, &payload.token, TokenPurpose::ResetPassword)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .filter(|t| !t.is_expired())
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let mut user = UserEntity::find_by_id(state.pool(), &admin, token.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(UserEntity::get_resource_type()))?;

    let hash = hash_password(&payload.password).map_err(WebError::server_crypt_error)?;
    user.set_password(state.pool(), hash)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    token
        .delete(state.pool(), &admin)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/api/v1/account/page",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Returns requested page", body = crate::model::Page<UserEntity>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "account",
    security(
        ("cookie" = [])
    )
)]
async fn user_list_handler(
    ctx: RequestContext,
    Query(page): Query<PaginationQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;

    let users = UserEntity::page(state.pool(), user, page.limit(), page.offset())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(users)))
}

#[utoipa::path(
    put,
    path = "/api/v1/account/{id}",
    request_body = UserUpdateBody,
    params(("id" = Uuid, Path, description = "ID of the user")),
    responses(
        (status = 200, description = "User updated successfully", body = UserEntity),
        (status = 400, description = "Display name is empty", body = ErrorResponse),
        (status = 401, description = "You're not authorized to do this", body = ErrorResponse),
        (status = 403, description = "You doesn't have enough permissions to do this", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "account",
    security(
        ("cookie" = [])
    )
)]
async fn user_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = UserEntity::get_resource_type();

    let display_name = payload.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(WebError::resource_bad_request(rt, "display_name is empty"));
    }

    let found = UserEntity::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_access(state.pool(), user, &found, user.user_id())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    let payload = UserEntityCreateUpdate {
        email: found.email().to_string(),
        display_name,
        password_hash: String::new(), // not in use
        role: found.role(),
        referred_by: found.referred_by(),
    };

    let updated = found
        .update(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::OK, Json(updated)))
}

#[utoipa::path(
    put,
    path = "/api/v1/account/{id}/role",
    request_body = UserRoleBody,
    params(("id" = Uuid, Path, description = "ID of the user")),
    description = "Sets a user's role directly and notifies them. Admin only",
    responses(
        (status = 200, description = "Role changed", body = UserEntity),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    tag = "account",
    security(("cookie" = []))
)]
async fn user_set_role_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserRoleBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;
    let rt = UserEntity::get_resource_type();

    let found = UserEntity::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    let mut conn = state
        .pool()
        .executor()
        .acquire()
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e.into()))?;
    UserEntity::set_role_in(&mut conn, found.id(), payload.role)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;
    drop(conn);

    Notification::create(
        state.pool(),
        user,
        found.id(),
        "Your role changed",
        &format!("Your role is now `{}`.", payload.role),
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(Notification::get_resource_type(), e))?;

    let updated = UserEntity::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    tracing::info!(user_id = %id, role = %payload.role, "role set by admin");
    Ok((StatusCode::OK, Json(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/account/{id}",
    description = "Deletes specified user",
    params(("id" = Uuid, Path, description = "ID of the user")),
    responses(
        (status = 200, description = "User deleted successfully"),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "You're not allowed to do this", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "account",
    security(
        ("cookie" = [])
    )
)]
async fn user_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let rt = UserEntity::get_resource_type();

    let found = UserEntity::find_by_id(state.pool(), user, id)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?
        .ok_or_else(|| WebError::resource_not_found(rt))?;

    check_access(state.pool(), user, &found, user.user_id())
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    found
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(rt, e))?;

    Ok(StatusCode::OK)
}
