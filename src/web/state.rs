use std::sync::Arc;

use crate::model::ModelManager;
use crate::services::{Mailer, PaymentGateway};

#[derive(Debug, Clone)]
pub struct AppState {
    mm: ModelManager,
    payments: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(mm: ModelManager, payments: Arc<dyn PaymentGateway>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mm,
            payments,
            mailer,
        }
    }

    pub fn pool(&self) -> &ModelManager {
        &self.mm
    }

    pub fn payments(&self) -> &dyn PaymentGateway {
        self.payments.as_ref()
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }
}
