mod auth;
pub use auth::{AUTH_TOKEN, extract_context_fn, remove_session_cookie, set_session_cookie};

mod cron;
pub use cron::{CRON_SECRET_HEADER, require_cron_secret};
