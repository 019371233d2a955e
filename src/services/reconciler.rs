//! Confirmation reconciler: the only path that moves usage counters, revenue,
//! success/failure stats, and usage-driven link status.
//!
//! A reconciliation runs in this order:
//! 1. the provider (or a signed rail notification) attests the payment,
//! 2. the reference is claimed in the reconciliation ledger,
//! 3. the link store applies the payment as one atomic compare-and-increment
//!    keyed by the provider reference.
//!
//! The ledger claim serializes concurrent confirmations of one reference; the
//! unique payment row in the store is what makes a replay a no-op even when
//! the ledger entry is lost.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    is_payable, CardOutcome, LinkPayment, PayerData, PaymentEntry, PaymentLink, PaymentMethod,
    PaymentOutcome,
};
use crate::error::{AppError, ALERT_TARGET};
use crate::ports::{Claim, LinkStore, ReconcileReceipt, ReconciliationLedger, RecordOutcome};
use crate::provider::{
    CardProvider, IntentStatus, ProviderError, ProviderIntent, META_PAYER_EMAIL, META_PAYER_NAME,
    META_SHORT_CODE,
};
use crate::validation;

/// How the caller identifies the link a payment belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkRef {
    Id(Uuid),
    ShortCode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub provider_reference: String,
    /// `None` for ad-hoc payments that were not made through a link.
    pub link: Option<PaymentLink>,
    /// True when this reference had already been reconciled.
    pub replayed: bool,
}

/// A rail payment whose notification signature has already been checked.
#[derive(Debug, Clone)]
pub struct VerifiedRailPayment {
    pub reference: String,
    pub short_code: String,
    pub rail: PaymentMethod,
    pub amount: BigDecimal,
    pub currency: String,
    pub payer: PayerData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionVerification {
    pub provider_reference: String,
    pub status: IntentStatus,
    pub outcome: CardOutcome,
    pub link: Option<PaymentLink>,
}

pub struct ConfirmationReconciler {
    store: Arc<dyn LinkStore>,
    ledger: Arc<dyn ReconciliationLedger>,
    provider: Arc<dyn CardProvider>,
}

impl ConfirmationReconciler {
    pub fn new(
        store: Arc<dyn LinkStore>,
        ledger: Arc<dyn ReconciliationLedger>,
        provider: Arc<dyn CardProvider>,
    ) -> Self {
        Self {
            store,
            ledger,
            provider,
        }
    }

    /// Credits a card payment after the provider confirms it succeeded.
    pub async fn reconcile(
        &self,
        provider_reference: &str,
        link_ref: Option<&LinkRef>,
        payer: &PayerData,
    ) -> Result<Reconciliation, AppError> {
        validation::validate_provider_reference(provider_reference)?;
        let intent = self.fetch_intent(provider_reference).await?;
        self.reconcile_intent(&intent, link_ref, payer).await
    }

    async fn reconcile_intent(
        &self,
        intent: &ProviderIntent,
        link_ref: Option<&LinkRef>,
        payer: &PayerData,
    ) -> Result<Reconciliation, AppError> {
        if intent.status != IntentStatus::Succeeded {
            return Err(AppError::UnconfirmedPayment(format!(
                "payment {} has not succeeded",
                intent.id
            )));
        }

        let link = self.link_for_intent(intent, link_ref).await?;
        if let Some(link) = &link {
            ensure_amount_matches(&intent.id, link, &intent.amount_decimal(), &intent.currency)?;
        }

        let payer = payer_from_intent(payer, intent);
        match link {
            Some(link) => {
                let entry = PaymentEntry {
                    provider_reference: intent.id.clone(),
                    link_id: link.id,
                    amount: link.amount.clone(),
                    currency: link.currency.clone(),
                    rail: PaymentMethod::Card,
                    payer,
                };
                self.apply(&entry, &link).await
            }
            None => self.apply_adhoc(&intent.id).await,
        }
    }

    /// Credits an asynchronous rail payment attested by a signed notification.
    pub async fn reconcile_rail(
        &self,
        payment: &VerifiedRailPayment,
    ) -> Result<Reconciliation, AppError> {
        validation::validate_provider_reference(&payment.reference)?;
        let link = self.store.resolve_short_code(&payment.short_code).await?;
        ensure_amount_matches(&payment.reference, &link, &payment.amount, &payment.currency)?;

        let entry = PaymentEntry {
            provider_reference: payment.reference.clone(),
            link_id: link.id,
            amount: link.amount.clone(),
            currency: link.currency.clone(),
            rail: payment.rail,
            payer: payment.payer.clone(),
        };
        self.apply(&entry, &link).await
    }

    /// Counts a provider-verified card failure against its link, once per reference.
    pub async fn record_failure(
        &self,
        provider_reference: &str,
    ) -> Result<Option<PaymentLink>, AppError> {
        validation::validate_provider_reference(provider_reference)?;
        let intent = self.fetch_intent(provider_reference).await?;

        if intent.outcome() != CardOutcome::Failed {
            return Err(AppError::UnconfirmedPayment(format!(
                "payment {} has not failed",
                intent.id
            )));
        }

        let Some(link_id) = intent.link_id() else {
            return Ok(None);
        };
        let link = self.store.get_by_id(link_id).await?;
        let entry = PaymentEntry {
            provider_reference: intent.id.clone(),
            link_id,
            amount: link.amount.clone(),
            currency: link.currency.clone(),
            rail: PaymentMethod::Card,
            payer: payer_from_intent(&PayerData::default(), &intent),
        };

        Ok(Some(self.apply_failure(&entry).await?))
    }

    pub async fn record_rail_failure(
        &self,
        payment: &VerifiedRailPayment,
    ) -> Result<PaymentLink, AppError> {
        validation::validate_provider_reference(&payment.reference)?;
        let link = self.store.resolve_short_code(&payment.short_code).await?;
        let entry = PaymentEntry {
            provider_reference: payment.reference.clone(),
            link_id: link.id,
            amount: link.amount.clone(),
            currency: link.currency.clone(),
            rail: payment.rail,
            payer: payment.payer.clone(),
        };

        self.apply_failure(&entry).await
    }

    /// Re-verifies a session with the provider for the success page. The
    /// session id in the URL proves nothing by itself.
    pub async fn verify_session(&self, session_id: &str) -> Result<SessionVerification, AppError> {
        validation::validate_provider_reference(session_id)?;
        let intent = self.fetch_intent(session_id).await?;

        let link = if intent.status == IntentStatus::Succeeded {
            self.reconcile_intent(&intent, None, &PayerData::default())
                .await?
                .link
        } else {
            None
        };

        Ok(SessionVerification {
            provider_reference: intent.id.clone(),
            status: intent.status,
            outcome: intent.outcome(),
            link,
        })
    }

    pub async fn record_view(&self, link_id: Uuid) -> Result<(), AppError> {
        self.store.record_view(link_id).await?;
        Ok(())
    }

    /// Materializes `expired` on links that lapsed or hit their cap.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let expired = self.store.expire_stale(now).await?;
        if expired > 0 {
            info!(expired, "Expired stale payment links");
        }
        Ok(expired)
    }

    /// Payments that moved money but could not be credited.
    pub async fn flagged(&self, limit: i64, offset: i64) -> Result<Vec<LinkPayment>, AppError> {
        Ok(self.store.list_flagged(limit, offset).await?)
    }

    async fn fetch_intent(&self, provider_reference: &str) -> Result<ProviderIntent, AppError> {
        self.provider
            .retrieve_intent(provider_reference)
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => AppError::UnconfirmedPayment(format!(
                    "unknown payment reference {}",
                    provider_reference
                )),
                other => AppError::from(other),
            })
    }

    /// Resolves the link named in the intent's metadata and checks it against
    /// what the caller claims.
    async fn link_for_intent(
        &self,
        intent: &ProviderIntent,
        link_ref: Option<&LinkRef>,
    ) -> Result<Option<PaymentLink>, AppError> {
        let mismatch = || {
            AppError::UnconfirmedPayment(format!(
                "payment {} does not belong to this link",
                intent.id
            ))
        };

        let Some(link_id) = intent.link_id() else {
            return match link_ref {
                Some(_) => Err(mismatch()),
                None => Ok(None),
            };
        };

        let link = self.store.get_by_id(link_id).await?;
        match link_ref {
            Some(LinkRef::Id(id)) if *id != link.id => return Err(mismatch()),
            Some(LinkRef::ShortCode(code)) if *code != link.short_code => return Err(mismatch()),
            _ => {}
        }
        if let Some(code) = intent.metadata.get(META_SHORT_CODE) {
            if *code != link.short_code {
                return Err(mismatch());
            }
        }

        Ok(Some(link))
    }

    async fn claim(&self, provider_reference: &str) -> Result<Option<ReconcileReceipt>, AppError> {
        match self.ledger.claim(provider_reference).await {
            Ok(Claim::Acquired) => Ok(None),
            Ok(Claim::Completed(receipt)) => Ok(Some(receipt)),
            Ok(Claim::InFlight) => match self.recorded_receipt(provider_reference).await? {
                Some(receipt) => Ok(Some(receipt)),
                None => Err(AppError::ReconciliationInProgress(format!(
                    "payment {} is already being confirmed",
                    provider_reference
                ))),
            },
            Err(e) => {
                error!(
                    target: ALERT_TARGET,
                    provider_reference,
                    error = %e,
                    "Reconciliation ledger unavailable; refusing to confirm"
                );
                Err(AppError::from(e))
            }
        }
    }

    /// A claim can outlive the request that took it. If that request's store
    /// write landed, the payment row settles the question.
    async fn recorded_receipt(
        &self,
        provider_reference: &str,
    ) -> Result<Option<ReconcileReceipt>, AppError> {
        let Some(row) = self.store.find_payment(provider_reference).await? else {
            return Ok(None);
        };
        if row.outcome == PaymentOutcome::Failed {
            return Ok(None);
        }

        let link = self.store.get_by_id(row.link_id).await?;
        info!(
            provider_reference,
            outcome = ?row.outcome,
            "Payment already recorded under a stale claim"
        );
        Ok(Some(ReconcileReceipt {
            provider_reference: row.provider_reference,
            outcome: row.outcome,
            link: Some(link),
        }))
    }

    async fn finish(
        &self,
        receipt: ReconcileReceipt,
        replayed: bool,
    ) -> Result<Reconciliation, AppError> {
        // The store row is authoritative; the receipt only shortcuts replays.
        if let Err(e) = self.ledger.complete(&receipt).await {
            warn!(
                provider_reference = %receipt.provider_reference,
                error = %e,
                "Failed to store reconciliation receipt"
            );
        }
        receipt_to_result(receipt, replayed)
    }

    async fn release(&self, provider_reference: &str) {
        if let Err(e) = self.ledger.release(provider_reference).await {
            warn!(provider_reference, error = %e, "Failed to release reconciliation claim");
        }
    }

    async fn apply(
        &self,
        entry: &PaymentEntry,
        link: &PaymentLink,
    ) -> Result<Reconciliation, AppError> {
        if let Some(receipt) = self.claim(&entry.provider_reference).await? {
            return receipt_to_result(receipt, true);
        }

        let now = Utc::now();
        if let Err(reason) = is_payable(link, now).check() {
            warn!(
                provider_reference = %entry.provider_reference,
                short_code = %link.short_code,
                reason = %reason,
                "Recording verified payment on an unavailable link"
            );
        }

        let outcome = match self.store.record_success(entry, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release(&entry.provider_reference).await;
                return Err(AppError::from(e));
            }
        };

        let (receipt, replayed) = match outcome {
            RecordOutcome::Applied(link) => {
                info!(
                    provider_reference = %entry.provider_reference,
                    short_code = %link.short_code,
                    rail = %entry.rail,
                    current_uses = link.current_uses,
                    status = %link.status,
                    "Payment reconciled"
                );
                let receipt = ReconcileReceipt {
                    provider_reference: entry.provider_reference.clone(),
                    outcome: PaymentOutcome::Succeeded,
                    link: Some(link),
                };
                (receipt, false)
            }
            RecordOutcome::AlreadyRecorded { link, outcome } => {
                info!(
                    provider_reference = %entry.provider_reference,
                    outcome = outcome.as_str(),
                    "Payment already recorded"
                );
                let receipt = ReconcileReceipt {
                    provider_reference: entry.provider_reference.clone(),
                    outcome,
                    link: Some(link),
                };
                (receipt, true)
            }
            RecordOutcome::CapReached(link) => {
                error!(
                    target: ALERT_TARGET,
                    provider_reference = %entry.provider_reference,
                    short_code = %link.short_code,
                    amount = %entry.amount,
                    currency = %entry.currency,
                    "Verified payment exceeds link usage cap; flagged for review"
                );
                let receipt = ReconcileReceipt {
                    provider_reference: entry.provider_reference.clone(),
                    outcome: PaymentOutcome::Flagged,
                    link: Some(link),
                };
                (receipt, false)
            }
        };

        self.finish(receipt, replayed).await
    }

    async fn apply_adhoc(&self, provider_reference: &str) -> Result<Reconciliation, AppError> {
        if let Some(receipt) = self.claim(provider_reference).await? {
            return receipt_to_result(receipt, true);
        }

        info!(provider_reference, "Ad-hoc payment confirmed");
        self.finish(
            ReconcileReceipt {
                provider_reference: provider_reference.to_string(),
                outcome: PaymentOutcome::Succeeded,
                link: None,
            },
            false,
        )
        .await
    }

    async fn apply_failure(&self, entry: &PaymentEntry) -> Result<PaymentLink, AppError> {
        let outcome = self.store.record_failure(entry, Utc::now()).await?;
        let link = match outcome {
            RecordOutcome::Applied(link) => {
                info!(
                    provider_reference = %entry.provider_reference,
                    short_code = %link.short_code,
                    failed_payments = link.failed_payments,
                    "Payment failure recorded"
                );
                link
            }
            RecordOutcome::AlreadyRecorded { link, .. } | RecordOutcome::CapReached(link) => link,
        };
        Ok(link)
    }
}

fn receipt_to_result(receipt: ReconcileReceipt, replayed: bool) -> Result<Reconciliation, AppError> {
    match receipt.outcome {
        PaymentOutcome::Succeeded => Ok(Reconciliation {
            provider_reference: receipt.provider_reference,
            link: receipt.link,
            replayed,
        }),
        PaymentOutcome::Flagged => Err(AppError::ConcurrencyConflict(format!(
            "payment {} arrived after the link reached its usage limit",
            receipt.provider_reference
        ))),
        PaymentOutcome::Failed => Err(AppError::UnconfirmedPayment(format!(
            "payment {} was recorded as failed",
            receipt.provider_reference
        ))),
    }
}

fn ensure_amount_matches(
    reference: &str,
    link: &PaymentLink,
    amount: &BigDecimal,
    currency: &str,
) -> Result<(), AppError> {
    if *amount != link.amount || !currency.eq_ignore_ascii_case(&link.currency) {
        return Err(AppError::UnconfirmedPayment(format!(
            "payment {} is for {} {}, link expects {} {}",
            reference,
            amount,
            currency.to_ascii_uppercase(),
            link.amount,
            link.currency
        )));
    }
    Ok(())
}

/// Payer details from the request, falling back to what the intent recorded.
fn payer_from_intent(payer: &PayerData, intent: &ProviderIntent) -> PayerData {
    PayerData {
        email: payer
            .email
            .clone()
            .or_else(|| intent.metadata.get(META_PAYER_EMAIL).cloned()),
        name: payer
            .name
            .clone()
            .or_else(|| intent.metadata.get(META_PAYER_NAME).cloned()),
        phone: payer.phone.clone(),
    }
}
