use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};

use crate::{
    model::{
        CrudRepository, PaginatableRepository, ResourceTyped,
        entity::{Contract, ContractCreate, UserEntity},
    },
    web::{
        AppState, RequestContext, UserRole, WebError, WebResult, error::ErrorResponse,
        middlewares, routes::PaginationQuery,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(contracts_page_handler).post(contracts_create_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/v1/contracts/",
    request_body = ContractCreate,
    description = "Records a sale for an FP. Amounts are minor currency units",
    responses(
        (status = 201, description = "Contract recorded", body = Contract),
        (status = 400, description = "Contract input invalid", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
    ),
    tag = "contracts",
    security(("cookie" = []))
)]
async fn contracts_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<ContractCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Manager)?;
    let rt = Contract::get_resource_type();

    let mut problems = Vec::new();
    if payload.amount < 0 {
        problems.push(String::from("amount must not be negative"));
    }
    if payload.customer_name.trim().is_empty() {
        problems.push(String::from("customer_name is empty"));
    }

    let fp = UserEntity::find_by_id(state.pool(), user, payload.fp_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    match fp {
        None => problems.push(String::from("fp_id names no user")),
        Some(fp) if !fp.role().at_least(UserRole::Fp) => {
            problems.push(format!("user holds role `{}`, contracts need `fp` or higher", fp.role()))
        }
        Some(_) => {}
    }

    if !problems.is_empty() {
        return Err(WebError::resource_rejected(rt, problems));
    }

    let contract = Contract::create(state.pool(), user, payload)
        .await
        .map_err(|e| WebError::from_db(rt, e))?;

    Ok((StatusCode::CREATED, Json(contract)))
}

#[utoipa::path(
    get,
    path = "/api/v1/contracts/",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Returns requested page", body = crate::model::Page<Contract>),
        (status = 403, description = "You're not an admin to do this", body = ErrorResponse),
    ),
    tag = "contracts",
    security(("cookie" = []))
)]
async fn contracts_page_handler(
    ctx: RequestContext,
    Query(page): Query<PaginationQuery>,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?.require(UserRole::Admin)?;

    let contracts = Contract::page(state.pool(), user, page.limit(), page.offset())
        .await
        .map_err(|e| WebError::resource_fetch_error(Contract::get_resource_type(), e))?;

    Ok((StatusCode::OK, Json(contracts)))
}
