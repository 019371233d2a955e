//! Card checkout sessions against the external provider.
//!
//! The session manager only talks to the provider. Usage counters and stats
//! are left to the reconciler, so a timed-out or failed session can never
//! leave the link store half-updated.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{is_payable, CardOutcome, PayerData};
use crate::error::AppError;
use crate::ports::LinkStore;
use crate::provider::{
    CardProvider, CreateIntent, ProviderError, ProviderIntent, META_LINK_ID, META_PAYER_EMAIL,
    META_PAYER_NAME, META_SHORT_CODE,
};
use crate::validation;

/// What a card session is charging for.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutTarget {
    Link { short_code: String },
    Adhoc { amount: BigDecimal, currency: String },
}

/// Everything the client needs to mount the provider's card widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSession {
    pub attempt_id: Uuid,
    pub provider_reference: String,
    pub client_secret: String,
    pub publishable_key: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub link_id: Option<Uuid>,
    pub short_code: Option<String>,
}

/// Opaque payment-method token produced by the provider's client library.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetails {
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResult {
    pub outcome: CardOutcome,
    pub provider_reference: String,
    pub timed_out: bool,
}

pub struct CheckoutSessionManager {
    store: Arc<dyn LinkStore>,
    provider: Arc<dyn CardProvider>,
    session_timeout: Duration,
}

impl CheckoutSessionManager {
    pub fn new(
        store: Arc<dyn LinkStore>,
        provider: Arc<dyn CardProvider>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            session_timeout,
        }
    }

    pub async fn begin_card_session(
        &self,
        target: CheckoutTarget,
        payer: &PayerData,
    ) -> Result<CardSession, AppError> {
        validation::validate_payer_identity(payer)?;

        let mut metadata = HashMap::new();
        if let Some(email) = &payer.email {
            metadata.insert(META_PAYER_EMAIL.to_string(), email.trim().to_string());
        }
        if let Some(name) = &payer.name {
            metadata.insert(META_PAYER_NAME.to_string(), validation::sanitize_string(name));
        }

        let (amount, currency, link_id, short_code, description) = match target {
            CheckoutTarget::Link { short_code } => {
                validation::validate_short_code(&short_code)?;
                let link = self.store.get_by_short_code(&short_code).await?;
                validation::validate_payer(payer, link.collect_phone)?;

                is_payable(&link, Utc::now())
                    .check()
                    .map_err(AppError::LinkUnavailable)?;

                metadata.insert(META_LINK_ID.to_string(), link.id.to_string());
                metadata.insert(META_SHORT_CODE.to_string(), link.short_code.clone());
                (
                    link.amount,
                    link.currency,
                    Some(link.id),
                    Some(link.short_code),
                    Some(link.title),
                )
            }
            CheckoutTarget::Adhoc { amount, currency } => {
                validation::validate_amount(&amount)?;
                let currency = currency.trim().to_ascii_uppercase();
                validation::validate_currency(&currency)?;
                (amount, currency, None, None, None)
            }
        };

        let attempt_id = Uuid::new_v4();
        let intent = self
            .provider
            .create_intent(&CreateIntent {
                amount: amount.clone(),
                currency: currency.clone(),
                idempotency_key: attempt_id.to_string(),
                description,
                metadata,
            })
            .await?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            AppError::PaymentProvider(format!("intent {} has no client secret", intent.id))
        })?;

        info!(
            attempt_id = %attempt_id,
            provider_reference = %intent.id,
            short_code = short_code.as_deref().unwrap_or("-"),
            "Card session started"
        );

        Ok(CardSession {
            attempt_id,
            provider_reference: intent.id,
            client_secret,
            publishable_key: self.provider.publishable_key().to_string(),
            amount,
            currency,
            link_id,
            short_code,
        })
    }

    /// Confirms the intent with the payer's payment method and reports its status.
    ///
    /// The link is re-checked right before the charge, since another session
    /// may have used up or closed it after this one began. An intent that has
    /// already settled is reported as-is.
    ///
    /// A session that does not settle inside the configured window is reported
    /// as a local failure with `timed_out` set.
    pub async fn submit_card_session(
        &self,
        provider_reference: &str,
        details: &PaymentDetails,
    ) -> Result<SubmitResult, AppError> {
        validation::validate_provider_reference(provider_reference)?;
        validation::validate_required("payment_method", &details.payment_method)?;

        let current = self.provider.retrieve_intent(provider_reference).await?;
        if current.outcome() == CardOutcome::Succeeded {
            return Ok(SubmitResult {
                outcome: CardOutcome::Succeeded,
                provider_reference: current.id,
                timed_out: false,
            });
        }
        if let Some(link_id) = current.link_id() {
            let link = self.store.get_by_id(link_id).await?;
            if let Err(reason) = is_payable(&link, Utc::now()).check() {
                warn!(
                    provider_reference,
                    link_id = %link_id,
                    reason = ?reason,
                    "Refusing to charge an unpayable link"
                );
                return Err(AppError::LinkUnavailable(reason));
            }
        }

        let attempt = tokio::time::timeout(
            self.session_timeout,
            self.confirm_with_retry(provider_reference, details.payment_method.trim()),
        )
        .await;

        let intent = match attempt {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    provider_reference,
                    timeout_secs = self.session_timeout.as_secs(),
                    "Card session timed out"
                );
                return Ok(SubmitResult {
                    outcome: CardOutcome::Failed,
                    provider_reference: provider_reference.to_string(),
                    timed_out: true,
                });
            }
        };

        info!(
            provider_reference,
            status = ?intent.status,
            "Card session submitted"
        );

        Ok(SubmitResult {
            outcome: intent.outcome(),
            provider_reference: intent.id,
            timed_out: false,
        })
    }

    /// One retry on transport failure. The intent is read back first so an
    /// attempt that did reach the provider is not confirmed twice.
    async fn confirm_with_retry(
        &self,
        provider_reference: &str,
        payment_method: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        match self
            .provider
            .confirm_intent(provider_reference, payment_method)
            .await
        {
            Err(err) if err.is_transient() => {
                warn!(provider_reference, error = %err, "Retrying card confirmation");
                let current = self.provider.retrieve_intent(provider_reference).await?;
                if current.outcome() != CardOutcome::Failed {
                    return Ok(current);
                }
                self.provider
                    .confirm_intent(provider_reference, payment_method)
                    .await
            }
            other => other,
        }
    }
}
