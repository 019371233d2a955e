//! Payment link domain entity.
//! Framework-agnostic representation of a merchant's shareable payment request.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Persisted lifecycle status. `Expired` is a materialized hint only; payability
/// is always computed by [`crate::domain::availability::is_payable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Active,
    Expired,
    Disabled,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Active => "active",
            LinkStatus::Expired => "expired",
            LinkStatus::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(LinkStatus::Active),
            "expired" => Some(LinkStatus::Expired),
            "disabled" => Some(LinkStatus::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity representing a payment link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: Uuid,
    pub short_code: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: LinkStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub collect_phone: bool,
    pub collect_shipping: bool,
    pub redirect_url: Option<String>,
    pub success_message: Option<String>,
    pub total_revenue: BigDecimal,
    pub successful_payments: i32,
    pub failed_payments: i32,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Merchant-supplied fields for a new link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewPaymentLink {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<i32>,
    #[serde(default)]
    pub collect_phone: bool,
    #[serde(default)]
    pub collect_shipping: bool,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub success_message: Option<String>,
}

impl PaymentLink {
    pub fn new(input: NewPaymentLink, short_code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            short_code,
            title: input.title,
            description: input.description,
            amount: input.amount,
            currency: input.currency,
            status: LinkStatus::Active,
            expires_at: input.expires_at,
            max_uses: input.max_uses,
            current_uses: 0,
            collect_phone: input.collect_phone,
            collect_shipping: input.collect_shipping,
            redirect_url: input.redirect_url,
            success_message: input.success_message,
            total_revenue: BigDecimal::zero(),
            successful_payments: 0,
            failed_payments: 0,
            views: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Remaining uses, or `None` when the link is unlimited.
    pub fn uses_remaining(&self) -> Option<i32> {
        self.max_uses
            .map(|max| (max - self.current_uses).max(0))
    }

    /// Successful payments per view, as a percentage.
    pub fn conversion_rate(&self) -> f64 {
        if self.views == 0 {
            return 0.0;
        }
        (self.successful_payments as f64 / self.views as f64) * 100.0
    }
}
