//! In-process implementation of LinkStore for tests and database-less dev runs.
//!
//! Links live in an arena indexed by id and short code. One mutex guards the
//! whole arena, so every operation is a single critical section.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::status_after_payment;
use crate::domain::{LinkPayment, LinkStatus, PaymentEntry, PaymentLink, PaymentOutcome};
use crate::ports::{LinkStore, RecordOutcome, StoreError, StoreResult};

#[derive(Default)]
struct Arena {
    links: Vec<PaymentLink>,
    by_id: HashMap<Uuid, usize>,
    by_code: HashMap<String, usize>,
    payments: HashMap<String, LinkPayment>,
}

impl Arena {
    fn index_of(&self, id: Uuid) -> StoreResult<usize> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("payment link {}", id)))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLinkStore {
    inner: Arc<Mutex<Arena>>,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn insert(&self, link: &PaymentLink) -> StoreResult<PaymentLink> {
        let mut arena = self.inner.lock().await;
        if arena.by_code.contains_key(&link.short_code) {
            return Err(StoreError::DuplicateShortCode(link.short_code.clone()));
        }

        let idx = arena.links.len();
        arena.links.push(link.clone());
        arena.by_id.insert(link.id, idx);
        arena.by_code.insert(link.short_code.clone(), idx);
        Ok(link.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<PaymentLink> {
        let arena = self.inner.lock().await;
        let idx = arena.index_of(id)?;
        Ok(arena.links[idx].clone())
    }

    async fn get_by_short_code(&self, short_code: &str) -> StoreResult<PaymentLink> {
        let arena = self.inner.lock().await;
        arena
            .by_code
            .get(short_code)
            .map(|idx| &arena.links[*idx])
            .filter(|link| !link.is_deleted())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("payment link {}", short_code)))
    }

    async fn resolve_short_code(&self, short_code: &str) -> StoreResult<PaymentLink> {
        let arena = self.inner.lock().await;
        arena
            .by_code
            .get(short_code)
            .map(|idx| arena.links[*idx].clone())
            .ok_or_else(|| StoreError::NotFound(format!("payment link {}", short_code)))
    }

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<PaymentLink>> {
        let arena = self.inner.lock().await;
        let mut live: Vec<&PaymentLink> =
            arena.links.iter().filter(|l| !l.is_deleted()).collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(live
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: LinkStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentLink> {
        let mut arena = self.inner.lock().await;
        let idx = arena.index_of(id)?;
        let link = &mut arena.links[idx];
        if link.is_deleted() {
            return Err(StoreError::NotFound(format!("payment link {}", id)));
        }

        link.status = status;
        link.updated_at = now;
        Ok(link.clone())
    }

    async fn tombstone(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<PaymentLink> {
        let mut arena = self.inner.lock().await;
        let idx = arena.index_of(id)?;
        let link = &mut arena.links[idx];
        if link.deleted_at.is_none() {
            link.deleted_at = Some(now);
            link.updated_at = now;
        }
        Ok(link.clone())
    }

    async fn record_view(&self, id: Uuid) -> StoreResult<()> {
        let mut arena = self.inner.lock().await;
        let idx = arena.index_of(id)?;
        arena.links[idx].views += 1;
        Ok(())
    }

    async fn record_success(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome> {
        let mut arena = self.inner.lock().await;
        let idx = arena.index_of(entry.link_id)?;
        let Arena {
            links, payments, ..
        } = &mut *arena;
        let link = &mut links[idx];

        if let Some(existing) = payments.get(&entry.provider_reference) {
            if existing.outcome != PaymentOutcome::Failed {
                return Ok(RecordOutcome::AlreadyRecorded {
                    link: link.clone(),
                    outcome: existing.outcome,
                });
            }
        }

        let created_at = payments
            .get(&entry.provider_reference)
            .map(|p| p.created_at)
            .unwrap_or(now);

        let cap_reached = link
            .max_uses
            .map(|max| link.current_uses >= max)
            .unwrap_or(false);

        if cap_reached {
            let mut row = LinkPayment::from_entry(entry, PaymentOutcome::Flagged, now);
            row.created_at = created_at;
            payments.insert(entry.provider_reference.clone(), row);
            return Ok(RecordOutcome::CapReached(link.clone()));
        }

        link.current_uses += 1;
        link.successful_payments += 1;
        link.total_revenue += entry.amount.clone();
        link.status = status_after_payment(link, now);
        link.updated_at = now;

        let mut row = LinkPayment::from_entry(entry, PaymentOutcome::Succeeded, now);
        row.created_at = created_at;
        payments.insert(entry.provider_reference.clone(), row);

        Ok(RecordOutcome::Applied(link.clone()))
    }

    async fn record_failure(
        &self,
        entry: &PaymentEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordOutcome> {
        let mut arena = self.inner.lock().await;
        let idx = arena.index_of(entry.link_id)?;
        let Arena {
            links, payments, ..
        } = &mut *arena;
        let link = &mut links[idx];

        if let Some(existing) = payments.get(&entry.provider_reference) {
            return Ok(RecordOutcome::AlreadyRecorded {
                link: link.clone(),
                outcome: existing.outcome,
            });
        }

        link.failed_payments += 1;
        link.updated_at = now;
        payments.insert(
            entry.provider_reference.clone(),
            LinkPayment::from_entry(entry, PaymentOutcome::Failed, now),
        );

        Ok(RecordOutcome::Applied(link.clone()))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut arena = self.inner.lock().await;
        let mut expired = 0;

        for link in arena
            .links
            .iter_mut()
            .filter(|l| l.status == LinkStatus::Active && !l.is_deleted())
        {
            if status_after_payment(link, now) == LinkStatus::Expired {
                link.status = LinkStatus::Expired;
                link.updated_at = now;
                expired += 1;
            }
        }

        Ok(expired)
    }

    async fn find_payment(&self, provider_reference: &str) -> StoreResult<Option<LinkPayment>> {
        let arena = self.inner.lock().await;
        Ok(arena.payments.get(provider_reference).cloned())
    }

    async fn list_flagged(&self, limit: i64, offset: i64) -> StoreResult<Vec<LinkPayment>> {
        let arena = self.inner.lock().await;
        let mut flagged: Vec<&LinkPayment> = arena
            .payments
            .values()
            .filter(|p| p.outcome == PaymentOutcome::Flagged)
            .collect();
        flagged.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(flagged
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
