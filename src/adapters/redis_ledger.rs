use async_trait::async_trait;
use redis::AsyncCommands;

use crate::ports::{Claim, LedgerError, LedgerResult, ReconcileReceipt, ReconciliationLedger};

pub const CLAIM_TTL_SECS: u64 = 300; // 5 minutes
const RECEIPT_TTL_SECS: u64 = 86400 * 7; // 7 days
const LEDGER_PREFIX: &str = "reconcile:";
const IN_FLIGHT: &str = "PROCESSING";

impl From<redis::RedisError> for LedgerError {
    fn from(err: redis::RedisError) -> Self {
        LedgerError::Unavailable(err.to_string())
    }
}

/// Redis-backed reconciliation ledger.
#[derive(Clone)]
pub struct RedisLedger {
    redis_client: redis::Client,
}

impl RedisLedger {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    fn key(provider_reference: &str) -> String {
        format!("{}{}", LEDGER_PREFIX, provider_reference)
    }
}

#[async_trait]
impl ReconciliationLedger for RedisLedger {
    async fn claim(&self, provider_reference: &str) -> LedgerResult<Claim> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = Self::key(provider_reference);

        // SET NX makes the claim a single atomic step.
        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(IN_FLIGHT)
            .arg("NX")
            .arg("EX")
            .arg(CLAIM_TTL_SECS)
            .query_async(&mut conn)
            .await?;

        if acquired.is_some() {
            return Ok(Claim::Acquired);
        }

        let existing: Option<String> = conn.get(&key).await?;
        match existing {
            // Lapsed between SET and GET; let the caller retry.
            None => Ok(Claim::InFlight),
            Some(value) if value == IN_FLIGHT => Ok(Claim::InFlight),
            Some(value) => {
                let receipt: ReconcileReceipt = serde_json::from_str(&value)
                    .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
                Ok(Claim::Completed(receipt))
            }
        }
    }

    async fn complete(&self, receipt: &ReconcileReceipt) -> LedgerResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = Self::key(&receipt.provider_reference);
        let serialized =
            serde_json::to_string(receipt).map_err(|e| LedgerError::Corrupt(e.to_string()))?;

        let _: () = conn.set_ex(&key, serialized, RECEIPT_TTL_SECS).await?;
        Ok(())
    }

    async fn release(&self, provider_reference: &str) -> LedgerResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = Self::key(provider_reference);

        // Only drop an in-flight marker, never a stored receipt.
        let current: Option<String> = conn.get(&key).await?;
        if current.as_deref() == Some(IN_FLIGHT) {
            let _: () = conn.del(&key).await?;
        }
        Ok(())
    }
}
