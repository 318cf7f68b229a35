//! Domain logic that spans several entities or talks to third parties.

pub mod attendance;
pub mod compensation;
pub mod import;
pub mod mailer;
pub mod payments;
pub mod promotion;
pub mod reconcile;
pub mod storage;
pub mod webhook;

pub use mailer::{HttpMailer, LogMailer, Mail, MailError, Mailer, deliver, mailer_from_config};
pub use payments::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway, PaymentResult, PromotionCode,
    Refund, RemoteSubscription, StripeClient,
};
