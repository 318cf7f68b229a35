use crate::{
    Config,
    web::{AppState, doc::ApiDoc},
};
use axum::{Router, http::StatusCode};
use serde::Deserialize;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod admin;
pub mod billing;
pub mod compensations;
pub mod contracts;
pub mod courses;
pub mod cron;
pub mod events;
pub mod files;
pub mod lessons;
pub mod notifications;
pub mod progress;
pub mod promotions;
pub mod referrals;
pub mod registrations;
pub mod user;
pub mod webhooks;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl PaginationQuery {
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

pub fn build_app<S: Send + Sync + Clone + 'static>(
    state: AppState,
    config: &'static Config,
) -> Router<S> {
    let mut router = Router::new()
        .nest("/api/v1/account/", user::routes(state.clone()))
        .nest("/api/v1/billing/", billing::routes(state.clone()))
        .nest("/api/v1/webhooks/", webhooks::routes(state.clone()))
        .nest("/api/v1/courses/", courses::routes(state.clone()))
        .nest("/api/v1/lessons/", lessons::routes(state.clone()))
        .nest("/api/v1/progress/", progress::routes(state.clone()))
        .nest("/api/v1/files/", files::routes(state.clone()))
        .nest("/api/v1/events/", events::routes(state.clone()))
        .nest("/api/v1/registrations/", registrations::routes(state.clone()))
        .nest("/api/v1/referrals/", referrals::routes(state.clone()))
        .nest("/api/v1/contracts/", contracts::routes(state.clone()))
        .nest("/api/v1/compensations/", compensations::routes(state.clone()))
        .nest("/api/v1/promotions/", promotions::routes(state.clone()))
        .nest("/api/v1/notifications/", notifications::routes(state.clone()))
        .nest("/api/v1/admin/", admin::routes(state.clone()))
        .nest("/api/v1/cron/", cron::routes(state.clone()))
        .layer(CookieManagerLayer::default())
        .layer(CorsLayer::very_permissive())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.app().request_timeout(),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    if config.app().docs() {
        let openapi = ApiDoc::openapi();

        router = router.merge(SwaggerUi::new("/api/v1/docs").url("/api-doc/openapi.json", openapi));
    }

    router
}
