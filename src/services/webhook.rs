//! Stripe webhook verification and event handling.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{sign_hex, verify_hex};
use crate::model::entity::{Notification, Subscription, UserEntity};
use crate::model::{CrudRepository, DatabaseError, ModelManager};
use crate::services::mailer::{Mail, Mailer, deliver};
use crate::services::payments::{CheckoutSession, PaymentError, PaymentGateway, RemoteSubscription};
use crate::web::AuthenticatedUser;

/// Maximum clock skew accepted between the signature timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
pub fn verify_signature(secret: &str, header: &str, payload: &[u8], now: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);

    if signatures
        .iter()
        .any(|sig| verify_hex(secret.as_bytes(), &signed, sig))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Builds a header the way the vendor does. Used to drive the endpoint from tools and tests.
pub fn signature_header(secret: &str, payload: &[u8], timestamp: i64) -> crate::auth::CryptResult<String> {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(payload);
    Ok(format!("t={timestamp},v1={}", sign_hex(secret.as_bytes(), &signed)?))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    customer: Option<String>,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("event payload invalid: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),
}

/// What the event did, for the response body and the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    UnknownCustomer,
    Ignored,
}

#[tracing::instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
pub async fn handle_event(
    mm: &ModelManager,
    payments: &dyn PaymentGateway,
    mailer: &dyn Mailer,
    event: StripeEvent,
) -> Result<EventOutcome, WebhookError> {
    let outcome = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSession = serde_json::from_value(event.data.object)?;
            checkout_completed(mm, payments, session).await?
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let remote: RemoteSubscription = serde_json::from_value(event.data.object)?;
            subscription_changed(mm, remote).await?
        }
        "invoice.payment_failed" => {
            let invoice: InvoiceObject = serde_json::from_value(event.data.object)?;
            payment_failed(mm, mailer, invoice).await?
        }
        _ => EventOutcome::Ignored,
    };

    tracing::info!(?outcome, "webhook event handled");
    Ok(outcome)
}

async fn checkout_completed(
    mm: &ModelManager,
    payments: &dyn PaymentGateway,
    session: CheckoutSession,
) -> Result<EventOutcome, WebhookError> {
    let system = AuthenticatedUser::admin();

    let by_reference = match session
        .client_reference_id
        .as_deref()
        .and_then(|id| id.parse::<Uuid>().ok())
    {
        Some(id) => UserEntity::find_by_id(mm, &system, id).await?,
        None => None,
    };
    let user = match (by_reference, session.customer.as_deref()) {
        (Some(user), _) => Some(user),
        (None, Some(customer)) => UserEntity::find_by_stripe_customer(mm, &system, customer).await?,
        (None, None) => None,
    };
    let Some(mut user) = user else {
        return Ok(EventOutcome::UnknownCustomer);
    };

    if let Some(customer) = session.customer.as_deref() {
        if user.stripe_customer_id() != Some(customer) {
            user.set_stripe_customer(mm, customer).await?;
        }
    }

    if let Some(subscription_id) = session.subscription.as_deref() {
        let remote = payments.retrieve_subscription(subscription_id).await?;
        Subscription::upsert(mm, &system, remote.to_upsert(user.id())).await?;
        Notification::create(
            mm,
            &system,
            user.id(),
            "Subscription started",
            "Thank you for subscribing. All lessons are now unlocked.",
        )
        .await?;
    }

    Ok(EventOutcome::Applied)
}

async fn subscription_changed(
    mm: &ModelManager,
    remote: RemoteSubscription,
) -> Result<EventOutcome, WebhookError> {
    let system = AuthenticatedUser::admin();

    let user_id = match UserEntity::find_by_stripe_customer(mm, &system, &remote.customer).await? {
        Some(user) => user.id(),
        None => match Subscription::find_by_stripe_id(mm, &system, &remote.id).await? {
            Some(existing) => existing.user_id(),
            None => return Ok(EventOutcome::UnknownCustomer),
        },
    };

    Subscription::upsert(mm, &system, remote.to_upsert(user_id)).await?;
    Ok(EventOutcome::Applied)
}

async fn payment_failed(
    mm: &ModelManager,
    mailer: &dyn Mailer,
    invoice: InvoiceObject,
) -> Result<EventOutcome, WebhookError> {
    let system = AuthenticatedUser::admin();
    let Some(customer) = invoice.customer.as_deref() else {
        return Ok(EventOutcome::UnknownCustomer);
    };
    let Some(user) = UserEntity::find_by_stripe_customer(mm, &system, customer).await? else {
        return Ok(EventOutcome::UnknownCustomer);
    };

    Notification::create(
        mm,
        &system,
        user.id(),
        "Payment failed",
        "Your last payment did not go through. Please update your card.",
    )
    .await?;
    deliver(mailer, Mail::payment_failed(user.email())).await;

    Ok(EventOutcome::Applied)
}
