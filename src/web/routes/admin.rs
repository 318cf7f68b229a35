use axum::{
    Json, Router, extract::State, http::StatusCode, middleware, response::IntoResponse,
    routing::post,
};

use crate::{
    Config,
    model::ResourceType,
    services::import::{
        ImportError, ImportSummary, import_contracts, import_users, parse_contracts, parse_users,
    },
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, error::ErrorResponse,
        middlewares,
    },
};

impl From<ImportError> for WebError {
    fn from(value: ImportError) -> Self {
        let rt = ResourceType::Import;
        match value {
            ImportError::Rejected(problems) => WebError::resource_rejected(rt, problems),
            ImportError::Database(e) => WebError::from_db(rt, e),
            ImportError::Crypt(e) => WebError::server_crypt_error(e),
        }
    }
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/import/users", post(admin_import_users_handler))
        .route("/import/contracts", post(admin_import_contracts_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/import/users",
    request_body(content = String, content_type = "text/csv", description = "`email,display_name,role[,referral_code]` with a header row"),
    description = "Creates users in bulk. Any malformed row rejects the whole file. Existing emails are skipped",
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "File rejected, see `errors`", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "admin",
    security(("cookie" = []))
)]
async fn admin_import_users_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    body: String,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require(UserRole::Admin)?;

    let rows = parse_users(&body)
        .map_err(|problems| WebError::resource_rejected(ResourceType::Import, problems))?;
    let public_url = Config::get_or_init(false).await.host().public_url();
    let summary = import_users(state.pool(), state.mailer(), public_url, rows).await?;

    Ok((StatusCode::OK, Json(summary)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/import/contracts",
    request_body(content = String, content_type = "text/csv", description = "`fp_email,customer_name,amount,contracted_on` with a header row"),
    description = "Records contracts in bulk. Any malformed row or unknown FP rejects the whole file",
    responses(
        (status = 200, description = "Import summary", body = ImportSummary),
        (status = 400, description = "File rejected, see `errors`", body = ErrorResponse),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "admin",
    security(("cookie" = []))
)]
async fn admin_import_contracts_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    body: String,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require(UserRole::Admin)?;

    let rows = parse_contracts(&body)
        .map_err(|problems| WebError::resource_rejected(ResourceType::Import, problems))?;
    let summary = import_contracts(state.pool(), rows).await?;

    Ok((StatusCode::OK, Json(summary)))
}
