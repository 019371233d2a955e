//! Per-reference payment records kept alongside each link.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checkout::{PayerData, PaymentMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    /// Money moved but the link had no uses left; needs merchant review.
    Flagged,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Failed => "failed",
            PaymentOutcome::Flagged => "flagged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "succeeded" => Some(PaymentOutcome::Succeeded),
            "failed" => Some(PaymentOutcome::Failed),
            "flagged" => Some(PaymentOutcome::Flagged),
            _ => None,
        }
    }
}

/// A provider-attested payment about to be applied to a link.
#[derive(Debug, Clone)]
pub struct PaymentEntry {
    pub provider_reference: String,
    pub link_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub rail: PaymentMethod,
    pub payer: PayerData,
}

/// A payment as recorded against its link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPayment {
    pub provider_reference: String,
    pub link_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub rail: PaymentMethod,
    pub outcome: PaymentOutcome,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkPayment {
    pub fn from_entry(entry: &PaymentEntry, outcome: PaymentOutcome, now: DateTime<Utc>) -> Self {
        Self {
            provider_reference: entry.provider_reference.clone(),
            link_id: entry.link_id,
            amount: entry.amount.clone(),
            currency: entry.currency.clone(),
            rail: entry.rail,
            outcome,
            payer_email: entry.payer.email.clone(),
            payer_name: entry.payer.name.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}
