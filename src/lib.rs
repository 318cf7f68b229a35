use std::sync::Arc;
use std::time::Duration;

use crate::auth::hash_password;
use crate::model::entity::{UserEntity, UserEntityCreateUpdate};
use crate::model::{CrudRepository, DbConnection, ModelManager};
use crate::services::{Mailer, PaymentGateway, StripeClient, mailer_from_config};
use crate::utils::signal::shutdown_signal;
use crate::web::{AuthenticatedUser, UserRole};
use crate::{error::AppResult, web::AppState};
use axum::Router;
use tokio::net::TcpListener;

pub mod config;
pub use config::{Config, ConfigError, ConfigResult};

pub mod auth;
pub mod error;
pub mod model;
pub mod services;
pub mod utils;
pub mod web;

static APPLICATION_NAME: &str = "memberdeck";

const CONNECT_ATTEMPTS: u32 = 5;

pub async fn build_server() -> AppResult<(AppState, Router)> {
    let use_local = cfg!(debug_assertions);
    let config = config::Config::get_or_init(use_local).await;

    let db = DbConnection::connect_with_retry(
        config.app().database_uri(),
        CONNECT_ATTEMPTS,
        Duration::from_secs(1),
    )
    .await?;

    tracing::debug!("applying migrations...");
    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .map_err(model::DatabaseError::from)?;

    let payments: Arc<dyn PaymentGateway> = Arc::new(StripeClient::from_config(config.stripe()));
    let mailer = mailer_from_config(config.mail());

    let mm = ModelManager::new(db);
    ensure_admin(&mm, config).await?;

    let state = AppState::new(mm, payments, mailer);
    let app = web::routes::build_app(state.clone(), config);
    Ok((state, app))
}

/// Builds the app over an already migrated database with caller supplied vendors.
pub async fn build_server_with_services(
    db: DbConnection,
    payments: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
) -> AppResult<(AppState, Router)> {
    let config = config::Config::get_or_init(true).await;

    let mm = ModelManager::new(db);
    ensure_admin(&mm, config).await?;

    let state = AppState::new(mm, payments, mailer);
    let app = web::routes::build_app(state.clone(), config);
    Ok((state, app))
}

/// Creates the configured administrator account on first start.
#[tracing::instrument(skip_all)]
pub async fn ensure_admin(mm: &ModelManager, config: &Config) -> AppResult<()> {
    let system = AuthenticatedUser::admin();
    let email = config.app().admin_email();

    if UserEntity::find_by_email(mm, &system, email).await?.is_some() {
        return Ok(());
    }

    let mut admin = UserEntity::create(
        mm,
        &system,
        UserEntityCreateUpdate {
            email: email.to_string(),
            display_name: String::from("Administrator"),
            password_hash: hash_password(config.app().admin_password())?,
            role: UserRole::Admin,
            referred_by: None,
        },
    )
    .await?;
    admin.mark_email_verified(mm).await?;

    tracing::info!(email, "administrator account created");
    Ok(())
}

#[tracing::instrument]
pub async fn setup_workers() -> AppResult<()> {
    let (_, app) = build_server().await?;
    let config = Config::get_or_init(false).await;
    let listener = TcpListener::bind(config.host().bindto()).await?;

    tracing::info!("axum is starting at: {}", config.host().bindto());
    let axum_handle = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal());

    axum_handle.await?;
    Ok(())
}

pub fn setup_trace() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

    // load .env file for RUST_LOG etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    tracing::debug!("tracing initialized.");
}

#[tracing::instrument]
pub async fn run() -> AppResult<()> {
    setup_trace();
    setup_workers().await?;
    Ok(())
}
