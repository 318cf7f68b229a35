use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected message, HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    pub fn new<S: Into<String>>(to: S, subject: S, body: S) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn verify_email(to: &str, link: &str) -> Self {
        Self::new(
            to.to_string(),
            String::from("Confirm your email address"),
            format!("Welcome! Confirm your address within 24 hours:\n\n{link}\n"),
        )
    }

    pub fn password_reset(to: &str, link: &str) -> Self {
        Self::new(
            to.to_string(),
            String::from("Set your password"),
            format!("Use this link within one hour to choose a new password:\n\n{link}\n"),
        )
    }

    pub fn registration_confirmed(to: &str, event_title: &str, starts_at: &str, location: &str) -> Self {
        Self::new(
            to.to_string(),
            format!("You are registered: {event_title}"),
            format!("See you on {starts_at} at {location}.\n"),
        )
    }

    pub fn promotion_approved(to: &str, role: &str) -> Self {
        Self::new(
            to.to_string(),
            String::from("Your promotion was approved"),
            format!("Congratulations, your role is now `{role}`.\n"),
        )
    }

    pub fn payment_failed(to: &str) -> Self {
        Self::new(
            to,
            "Your payment failed",
            "We could not charge your card. Update your payment method to keep access.\n",
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    async fn send(&self, mail: &Mail) -> Result<(), MailError>;
}

/// Posts messages as JSON to a transactional mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
    from: String,
}

impl std::fmt::Debug for HttpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMailer")
            .field("relay_url", &self.relay_url)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(relay_url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            relay_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[tracing::instrument(skip(self, mail), fields(to = %mail.to))]
    async fn send(&self, mail: &Mail) -> Result<(), MailError> {
        let mut request = self.http.post(&self.relay_url).json(&RelayMessage {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected { status, body })
    }
}

/// Writes messages to the log. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "mail (not sent, no relay)");
        Ok(())
    }
}

pub fn mailer_from_config(config: &crate::config::Mail) -> Arc<dyn Mailer> {
    match config.relay_url() {
        Some(url) => Arc::new(HttpMailer::new(
            url.to_string(),
            config.api_key().map(str::to_string),
            config.from().to_string(),
        )),
        None => Arc::new(LogMailer),
    }
}

/// Sends `mail`, logging a failure instead of returning it.
pub async fn deliver(mailer: &dyn Mailer, mail: Mail) {
    if let Err(e) = mailer.send(&mail).await {
        tracing::warn!(to = %mail.to, subject = %mail.subject, error = %e, "mail delivery failed");
    }
}
