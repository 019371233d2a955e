//! Card payment provider seam.
//!
//! The service never sees card data. It creates intents, asks the provider to
//! confirm them with an opaque payment-method token produced client side, and
//! reads back intent status.

pub mod client;
#[cfg(test)]
pub mod fake;

pub use client::HttpCardProvider;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::CardOutcome;

pub const META_LINK_ID: &str = "link_id";
pub const META_SHORT_CODE: &str = "short_code";
pub const META_PAYER_EMAIL: &str = "payer_email";
pub const META_PAYER_NAME: &str = "payer_name";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Transport(String),
    #[error("{message}")]
    Rejected { code: Option<String>, message: String },
    #[error("payment intent not found: {0}")]
    NotFound(String),
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl ProviderError {
    /// Network-level failures worth one retry with the same intent.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<ProviderErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProviderIntent {
    pub fn outcome(&self) -> CardOutcome {
        match self.status {
            IntentStatus::Succeeded => CardOutcome::Succeeded,
            IntentStatus::RequiresAction
            | IntentStatus::Processing
            | IntentStatus::RequiresCapture => CardOutcome::RequiresAction,
            _ => CardOutcome::Failed,
        }
    }

    pub fn link_id(&self) -> Option<Uuid> {
        self.metadata
            .get(META_LINK_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn amount_decimal(&self) -> BigDecimal {
        from_minor_units(self.amount)
    }
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub amount: BigDecimal,
    pub currency: String,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait CardProvider: Send + Sync {
    fn publishable_key(&self) -> &str;

    async fn create_intent(&self, request: &CreateIntent) -> Result<ProviderIntent, ProviderError>;

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<ProviderIntent, ProviderError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError>;

    /// `"closed"` while calls are let through, `"open"` while they are short-circuited.
    fn circuit_state(&self) -> &'static str {
        "closed"
    }
}

/// Converts a 2-decimal amount into provider minor units.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100)).with_scale(0).to_i64()
}

pub fn from_minor_units(minor: i64) -> BigDecimal {
    BigDecimal::new(minor.into(), 2)
}
