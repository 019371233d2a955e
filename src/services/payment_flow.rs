//! Payer-facing checkout flow: open link, pick a rail, pay, confirm.
//!
//! Each request rebuilds a [`PaymentRouter`] at the state the attempt must be
//! in for that step, so a replayed or out-of-order call is rejected by the
//! router before anything reaches the provider or the store.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RailSettings;
use crate::domain::{
    is_payable, Availability, CardOutcome, PayerData, PaymentLink, PaymentMethod, PaymentRouter,
    RailSignal, RouterState,
};
use crate::error::AppError;
use crate::ports::LinkStore;
use crate::services::rails::{self, RailInstructions, RailNotification};
use crate::services::reconciler::{
    ConfirmationReconciler, LinkRef, Reconciliation, VerifiedRailPayment,
};
use crate::services::session::{
    CardSession, CheckoutSessionManager, CheckoutTarget, PaymentDetails,
};
use crate::validation;

/// What a payer sees when opening a link. No stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicLink {
    pub short_code: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub collect_phone: bool,
    pub collect_shipping: bool,
    pub availability: Availability,
}

impl PublicLink {
    pub fn from_link(link: &PaymentLink) -> Self {
        Self {
            short_code: link.short_code.clone(),
            title: link.title.clone(),
            description: link.description.clone(),
            amount: link.amount.clone(),
            currency: link.currency.clone(),
            collect_phone: link.collect_phone,
            collect_shipping: link.collect_shipping,
            availability: is_payable(link, Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedCardPayment {
    #[serde(flatten)]
    pub session: CardSession,
    pub state: RouterState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedAsyncPayment {
    pub reference: String,
    pub state: RouterState,
    pub instructions: RailInstructions,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub state: RouterState,
    pub provider_reference: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<PublicLink>,
}

impl PaymentResponse {
    fn pending(state: RouterState, provider_reference: String, timed_out: bool) -> Self {
        Self {
            success: false,
            state,
            provider_reference,
            timed_out,
            redirect_url: None,
            success_message: None,
            link: None,
        }
    }

    fn succeeded(reconciliation: Reconciliation) -> Self {
        let link = reconciliation.link.as_ref();
        Self {
            success: true,
            state: RouterState::Succeeded,
            redirect_url: link.and_then(|l| l.redirect_url.clone()),
            success_message: link.and_then(|l| l.success_message.clone()),
            link: link.map(PublicLink::from_link),
            provider_reference: reconciliation.provider_reference,
            timed_out: false,
        }
    }
}

pub struct PaymentFlow {
    store: Arc<dyn LinkStore>,
    sessions: CheckoutSessionManager,
    reconciler: Arc<ConfirmationReconciler>,
    rails: RailSettings,
}

impl PaymentFlow {
    pub fn new(
        store: Arc<dyn LinkStore>,
        sessions: CheckoutSessionManager,
        reconciler: Arc<ConfirmationReconciler>,
        rails: RailSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            reconciler,
            rails,
        }
    }

    /// Public snapshot for the checkout page. Counts a view.
    pub async fn open_link(&self, short_code: &str) -> Result<PublicLink, AppError> {
        validation::validate_short_code(short_code)?;
        let link = self.store.get_by_short_code(short_code).await?;

        if let Err(e) = self.reconciler.record_view(link.id).await {
            warn!(short_code, error = %e, "Failed to record link view");
        }

        Ok(PublicLink::from_link(&link))
    }

    pub async fn start_card(
        &self,
        target: CheckoutTarget,
        payer: &PayerData,
    ) -> Result<StartedCardPayment, AppError> {
        let mut router = PaymentRouter::new();
        let state = router.select(PaymentMethod::Card, payer)?;
        let session = self.sessions.begin_card_session(target, payer).await?;
        Ok(StartedCardPayment { session, state })
    }

    pub async fn start_async(
        &self,
        short_code: &str,
        method: PaymentMethod,
        payer: &PayerData,
    ) -> Result<StartedAsyncPayment, AppError> {
        if !method.is_async() {
            return Err(AppError::Validation(
                "payment_method: card payments start with create-intent".to_string(),
            ));
        }

        validation::validate_short_code(short_code)?;
        let link = self.store.get_by_short_code(short_code).await?;
        is_payable(&link, Utc::now())
            .check()
            .map_err(AppError::LinkUnavailable)?;
        if link.collect_phone {
            validation::validate_phone(payer.phone.as_deref().unwrap_or_default())?;
        }

        let mut router = PaymentRouter::new();
        let state = router.select(method, payer)?;
        let reference = rails::new_rail_reference(method);
        let instructions = rails::instructions_for(&self.rails, method, &link, &reference)?;

        info!(
            short_code,
            rail = %method,
            reference = %reference,
            "Async payment started"
        );

        Ok(StartedAsyncPayment {
            reference,
            state,
            instructions,
        })
    }

    /// Submits the card session and, on success, reconciles it in the same call.
    pub async fn submit_card(
        &self,
        provider_reference: &str,
        details: &PaymentDetails,
    ) -> Result<PaymentResponse, AppError> {
        let mut router = PaymentRouter::resume(RouterState::CardInProgress, PaymentMethod::Card);

        let submitted = match self
            .sessions
            .submit_card_session(provider_reference, details)
            .await
        {
            Ok(submitted) => submitted,
            Err(AppError::PaymentProvider(message)) => {
                self.count_failure(provider_reference).await;
                return Err(AppError::PaymentProvider(message));
            }
            Err(e) => return Err(e),
        };

        let state = router.on_card_outcome(submitted.outcome)?;
        match submitted.outcome {
            CardOutcome::Succeeded => {
                let reconciliation = self
                    .reconciler
                    .reconcile(&submitted.provider_reference, None, &PayerData::default())
                    .await?;
                Ok(PaymentResponse::succeeded(reconciliation))
            }
            CardOutcome::Failed if !submitted.timed_out => {
                self.count_failure(&submitted.provider_reference).await;
                Ok(PaymentResponse::pending(
                    state,
                    submitted.provider_reference,
                    false,
                ))
            }
            _ => Ok(PaymentResponse::pending(
                state,
                submitted.provider_reference,
                submitted.timed_out,
            )),
        }
    }

    /// Client-side confirmation after the provider widget reports success.
    pub async fn confirm(
        &self,
        provider_reference: &str,
        short_code: Option<&str>,
        payer: &PayerData,
    ) -> Result<PaymentResponse, AppError> {
        let link_ref = short_code.map(|code| LinkRef::ShortCode(code.to_string()));
        let reconciliation = self
            .reconciler
            .reconcile(provider_reference, link_ref.as_ref(), payer)
            .await?;
        Ok(PaymentResponse::succeeded(reconciliation))
    }

    /// Applies a signed rail notification.
    pub async fn handle_rail_signal(
        &self,
        notification: RailNotification,
    ) -> Result<PaymentResponse, AppError> {
        let rail = rails::rail_of_reference(&notification.reference).ok_or_else(|| {
            AppError::Validation("reference: not a rail payment reference".to_string())
        })?;

        let mut router = PaymentRouter::resume(RouterState::AsyncPending, rail);
        let state = router.on_rail_signal(notification.status)?;

        let payment = VerifiedRailPayment {
            reference: notification.reference,
            short_code: notification.short_code,
            rail,
            amount: notification.amount,
            currency: notification.currency,
            payer: notification.payer,
        };

        match notification.status {
            RailSignal::Succeeded => {
                let reconciliation = self.reconciler.reconcile_rail(&payment).await?;
                Ok(PaymentResponse::succeeded(reconciliation))
            }
            RailSignal::Failed => {
                self.reconciler.record_rail_failure(&payment).await?;
                Ok(PaymentResponse::pending(state, payment.reference, false))
            }
        }
    }

    /// Backs the success page; re-verifies with the provider.
    pub async fn verify_success(&self, session_id: &str) -> Result<PaymentResponse, AppError> {
        let verified = self.reconciler.verify_session(session_id).await?;
        let state = match verified.outcome {
            CardOutcome::Succeeded => RouterState::Succeeded,
            CardOutcome::Failed => RouterState::Failed,
            CardOutcome::RequiresAction => RouterState::CardInProgress,
        };

        if state != RouterState::Succeeded {
            return Ok(PaymentResponse::pending(
                state,
                verified.provider_reference,
                false,
            ));
        }

        Ok(PaymentResponse::succeeded(Reconciliation {
            provider_reference: verified.provider_reference,
            link: verified.link,
            replayed: true,
        }))
    }

    async fn count_failure(&self, provider_reference: &str) {
        if let Err(e) = self.reconciler.record_failure(provider_reference).await {
            warn!(provider_reference, error = %e, "Could not record payment failure");
        }
    }
}
