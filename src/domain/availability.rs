//! Payability evaluation for payment links.
//!
//! The persisted `status` column can lag behind reality: nothing rewrites it the
//! instant `expires_at` passes. Every gate in the service therefore asks
//! [`is_payable`] instead of reading `status` directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::payment_link::{LinkStatus, PaymentLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    ExpiredTime,
    ExpiredUses,
    Disabled,
    Deleted,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::ExpiredTime => "expired_time",
            UnavailableReason::ExpiredUses => "expired_uses",
            UnavailableReason::Disabled => "disabled",
            UnavailableReason::Deleted => "deleted",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub payable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

impl Availability {
    const PAYABLE: Availability = Availability {
        payable: true,
        reason: None,
    };

    fn unavailable(reason: UnavailableReason) -> Self {
        Self {
            payable: false,
            reason: Some(reason),
        }
    }

    /// Converts into a `Result`, yielding the blocking reason on failure.
    pub fn check(self) -> Result<(), UnavailableReason> {
        match self.reason {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// Computes whether `link` can accept a payment at `now`.
///
/// Tombstones and merchant disablement win over everything; then wall-clock
/// expiry; then the usage cap. A `None` expiry never expires and a `None` cap
/// is unlimited.
pub fn is_payable(link: &PaymentLink, now: DateTime<Utc>) -> Availability {
    if link.is_deleted() {
        return Availability::unavailable(UnavailableReason::Deleted);
    }

    if link.status == LinkStatus::Disabled {
        return Availability::unavailable(UnavailableReason::Disabled);
    }

    if let Some(expires_at) = link.expires_at {
        if now > expires_at {
            return Availability::unavailable(UnavailableReason::ExpiredTime);
        }
    }

    if let Some(max_uses) = link.max_uses {
        if link.current_uses >= max_uses {
            return Availability::unavailable(UnavailableReason::ExpiredUses);
        }
    }

    Availability::PAYABLE
}
