//! Payments vendor call-through. Handlers talk to [`PaymentGateway`]; [`StripeClient`] is the
//! production implementation over Stripe's form-encoded REST API.

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::entity::SubscriptionUpsert;

pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment vendor rate limit hit")]
    RateLimited,
    #[error("payment vendor error, HTTP {status}: {message}")]
    Vendor { status: u16, message: String },
    #[error("payment vendor request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Declined(_) => StatusCode::PAYMENT_REQUIRED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Vendor { .. } | Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::Declined(reason) => format!("Payment error, declined: {reason}"),
            Self::RateLimited => String::from("Payment error, vendor is busy. Retry later."),
            Self::Vendor { .. } | Self::Transport(_) => {
                String::from("Payment error, vendor request failed.")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Our user id, echoed back by the vendor on completion.
    pub client_reference_id: String,
    pub promotion_code_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: RemoteItems,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteItems {
    #[serde(default)]
    pub data: Vec<RemoteItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    pub price: RemotePrice,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePrice {
    pub id: String,
}

impl RemoteSubscription {
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    /// Newer API versions report the period on the item instead of the subscription.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn to_upsert(&self, user_id: Uuid) -> SubscriptionUpsert {
        SubscriptionUpsert {
            user_id,
            stripe_subscription_id: self.id.clone(),
            price_id: self.price_id().map(str::to_string),
            status: self.status.clone(),
            current_period_end: self.period_end(),
            cancel_at_period_end: self.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PromotionCode {
    pub id: String,
    pub code: String,
    pub active: bool,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    async fn create_customer(&self, user_id: Uuid, email: &str, name: &str) -> PaymentResult<String>;

    async fn create_checkout_session(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> PaymentResult<RemoteSubscription>;

    /// Stops renewal, or ends the subscription right away when `immediately` is set.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> PaymentResult<RemoteSubscription>;

    async fn create_refund(&self, payment_intent: &str, amount: Option<i64>) -> PaymentResult<Refund>;

    /// Active promotion code by its customer-facing text.
    async fn find_promotion_code(&self, code: &str) -> PaymentResult<Option<PromotionCode>>;
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

impl StripeClient {
    pub fn new<S: Into<String>>(secret_key: S, base_url: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    pub fn from_config(config: &crate::config::Stripe) -> Self {
        Self::new(config.secret_key(), config.api_base())
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> PaymentResult<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Self::check_response_json(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await?;
        Self::check_response_json(response).await
    }

    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> PaymentResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);

        match status.as_u16() {
            402 => Err(PaymentError::Declined(message)),
            429 => {
                tracing::warn!("stripe rate limit hit (429)");
                Err(PaymentError::RateLimited)
            }
            status => Err(PaymentError::Vendor { status, message }),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[tracing::instrument(skip(self, name))]
    async fn create_customer(&self, user_id: Uuid, email: &str, name: &str) -> PaymentResult<String> {
        let customer: StripeCustomer = self
            .post_form(
                "/customers",
                &[
                    ("email", email.to_string()),
                    ("name", name.to_string()),
                    ("metadata[user_id]", user_id.to_string()),
                ],
            )
            .await?;
        Ok(customer.id)
    }

    #[tracing::instrument(skip(self))]
    async fn create_checkout_session(&self, request: CheckoutRequest) -> PaymentResult<CheckoutSession> {
        let mut form = vec![
            ("mode", String::from("subscription")),
            ("customer", request.customer_id),
            ("client_reference_id", request.client_reference_id),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", String::from("1")),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
        ];
        match request.promotion_code_id {
            Some(id) => form.push(("discounts[0][promotion_code]", id)),
            None => form.push(("allow_promotion_codes", String::from("true"))),
        }

        self.post_form("/checkout/sessions", &form).await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> PaymentResult<RemoteSubscription> {
        self.get_json(&format!("/subscriptions/{subscription_id}"), &[]).await
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        immediately: bool,
    ) -> PaymentResult<RemoteSubscription> {
        if immediately {
            let response = self
                .http
                .delete(format!("{}/subscriptions/{subscription_id}", self.base_url))
                .bearer_auth(&self.secret_key)
                .send()
                .await?;
            Self::check_response_json(response).await
        } else {
            self.post_form(
                &format!("/subscriptions/{subscription_id}"),
                &[("cancel_at_period_end", String::from("true"))],
            )
            .await
        }
    }

    #[tracing::instrument(skip(self))]
    async fn create_refund(&self, payment_intent: &str, amount: Option<i64>) -> PaymentResult<Refund> {
        let mut form = vec![("payment_intent", payment_intent.to_string())];
        if let Some(amount) = amount {
            form.push(("amount", amount.to_string()));
        }
        self.post_form("/refunds", &form).await
    }

    async fn find_promotion_code(&self, code: &str) -> PaymentResult<Option<PromotionCode>> {
        let list: StripeList<PromotionCode> = self
            .get_json(
                "/promotion_codes",
                &[("code", code), ("active", "true"), ("limit", "1")],
            )
            .await?;
        Ok(list.data.into_iter().find(|c| c.active))
    }
}
