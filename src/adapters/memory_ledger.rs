use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::redis_ledger::CLAIM_TTL_SECS;
use crate::ports::{Claim, LedgerResult, ReconcileReceipt, ReconciliationLedger};

enum Slot {
    InFlight(Instant),
    Done(ReconcileReceipt),
}

/// Process-local reconciliation ledger. Claims lapse after the same TTL the
/// Redis ledger uses so an abandoned claim does not wedge a reference.
#[derive(Clone)]
pub struct InMemoryLedger {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    claim_ttl: Duration,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_claim_ttl(Duration::from_secs(CLAIM_TTL_SECS))
    }

    pub fn with_claim_ttl(claim_ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            claim_ttl,
        }
    }
}

#[async_trait]
impl ReconciliationLedger for InMemoryLedger {
    async fn claim(&self, provider_reference: &str) -> LedgerResult<Claim> {
        let mut slots = self.slots.lock().await;

        match slots.get(provider_reference) {
            Some(Slot::Done(receipt)) => return Ok(Claim::Completed(receipt.clone())),
            Some(Slot::InFlight(since)) if since.elapsed() < self.claim_ttl => {
                return Ok(Claim::InFlight)
            }
            _ => {}
        }

        slots.insert(provider_reference.to_string(), Slot::InFlight(Instant::now()));
        Ok(Claim::Acquired)
    }

    async fn complete(&self, receipt: &ReconcileReceipt) -> LedgerResult<()> {
        self.slots.lock().await.insert(
            receipt.provider_reference.clone(),
            Slot::Done(receipt.clone()),
        );
        Ok(())
    }

    async fn release(&self, provider_reference: &str) -> LedgerResult<()> {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(provider_reference), Some(Slot::InFlight(_))) {
            slots.remove(provider_reference);
        }
        Ok(())
    }
}
