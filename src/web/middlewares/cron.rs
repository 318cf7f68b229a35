use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};

use crate::{Config, auth::secret_matches, web::error::WebError};

pub static CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Guards scheduler-triggered routes with the shared secret from `app.cron_secret`.
pub async fn require_cron_secret(request: Request, next: Next) -> Result<Response, WebError> {
    let expected = Config::get_or_init(false).await.app().cron_secret();
    let provided = request
        .headers()
        .get(CRON_SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    let valid = provided.is_some_and(|p| secret_matches(expected, p));

    if !valid {
        tracing::warn!(present = provided.is_some(), "blocked cron request with invalid secret");
        return Err(WebError::auth_secret_invalid(CRON_SECRET_HEADER));
    }

    Ok(next.run(request).await)
}
