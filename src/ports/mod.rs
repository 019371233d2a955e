//! Storage seams. Services depend on these traits; `adapters` implements them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LinkPayment, LinkStatus, PaymentEntry, PaymentLink, PaymentOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Short code already taken: {0}")]
    DuplicateShortCode(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of applying a payment entry to its link.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Counters moved; carries the updated link.
    Applied(PaymentLink),
    /// The reference was already recorded; nothing moved.
    AlreadyRecorded {
        link: PaymentLink,
        outcome: PaymentOutcome,
    },
    /// The cap was reached before this payment; it was recorded as flagged.
    CapReached(PaymentLink),
}

/// Durable home of payment links and their per-reference payment rows.
///
/// `record_success` and `record_failure` are the only operations that touch
/// usage counters or stats, and each must be a single atomic unit keyed by the
/// entry's provider reference.
#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn insert(&self, link: &PaymentLink) -> StoreResult<PaymentLink>;

    /// Looks up by id, including tombstoned links.
    async fn get_by_id(&self, id: Uuid) -> StoreResult<PaymentLink>;

    /// Looks up a live (not tombstoned) link by its short code.
    async fn get_by_short_code(&self, short_code: &str) -> StoreResult<PaymentLink>;

    /// Looks up by short code, including tombstoned links. Only for crediting
    /// payments that were already verified elsewhere.
    async fn resolve_short_code(&self, short_code: &str) -> StoreResult<PaymentLink>;

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<PaymentLink>>;

    async fn set_status(
        &self,
        id: Uuid,
        status: LinkStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentLink>;

    async fn tombstone(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<PaymentLink>;

    async fn record_view(&self, id: Uuid) -> StoreResult<()>;

    /// Compare-and-increment: bumps `current_uses` only while uses remain.
    async fn record_success(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome>;

    async fn record_failure(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome>;

    /// Writes `expired` on active links past their expiry or cap. Returns the count.
    async fn expire_stale(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn find_payment(&self, provider_reference: &str) -> StoreResult<Option<LinkPayment>>;

    async fn list_flagged(&self, limit: i64, offset: i64) -> StoreResult<Vec<LinkPayment>>;

    async fn health_check(&self) -> StoreResult<()>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger backend unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt ledger entry: {0}")]
    Corrupt(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// What the reconciler recorded for a provider reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReceipt {
    pub provider_reference: String,
    pub outcome: PaymentOutcome,
    pub link: Option<PaymentLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Acquired,
    InFlight,
    Completed(ReconcileReceipt),
}

/// Fast-path idempotency for reconciliation, keyed by provider reference.
#[async_trait]
pub trait ReconciliationLedger: Send + Sync {
    async fn claim(&self, provider_reference: &str) -> LedgerResult<Claim>;

    async fn complete(&self, receipt: &ReconcileReceipt) -> LedgerResult<()>;

    async fn release(&self, provider_reference: &str) -> LedgerResult<()>;
}
