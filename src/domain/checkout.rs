//! Checkout attempt types and the per-attempt payment method router.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::validation::{self, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Bank,
    Ussd,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Ussd => "ussd",
            PaymentMethod::Crypto => "crypto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "card" => Some(PaymentMethod::Card),
            "bank" => Some(PaymentMethod::Bank),
            "ussd" => Some(PaymentMethod::Ussd),
            "crypto" => Some(PaymentMethod::Crypto),
            _ => None,
        }
    }

    /// Non-card rails complete out of band.
    pub fn is_async(&self) -> bool {
        !matches!(self, PaymentMethod::Card)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payer-supplied contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerData {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Terminal (or action-pending) result of a card submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardOutcome {
    Succeeded,
    Failed,
    RequiresAction,
}

/// Out-of-band confirmation for a non-card rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailSignal {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Selecting,
    CardInProgress,
    AsyncPending,
    Succeeded,
    Failed,
}

impl RouterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouterState::Succeeded | RouterState::Failed)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("payer details incomplete: {0}")]
    MissingPayerData(ValidationError),
    #[error("attempt already finished as {0:?}")]
    Terminal(RouterState),
    #[error("cannot apply {event} while {state:?}")]
    InvalidTransition {
        state: RouterState,
        event: &'static str,
    },
}

/// State machine for a single checkout attempt.
///
/// A fresh attempt needs a fresh router; once `Succeeded` or `Failed` is
/// reached every further event is rejected.
#[derive(Debug, Clone)]
pub struct PaymentRouter {
    state: RouterState,
    method: Option<PaymentMethod>,
}

impl Default for PaymentRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentRouter {
    pub fn new() -> Self {
        Self {
            state: RouterState::Selecting,
            method: None,
        }
    }

    /// Rebuilds a router for an attempt whose earlier steps ran in another request.
    pub fn resume(state: RouterState, method: PaymentMethod) -> Self {
        Self {
            state,
            method: Some(method),
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        self.method
    }

    pub fn select(
        &mut self,
        method: PaymentMethod,
        payer: &PayerData,
    ) -> Result<RouterState, RouterError> {
        self.ensure_open()?;
        if self.state != RouterState::Selecting {
            return Err(RouterError::InvalidTransition {
                state: self.state,
                event: "select",
            });
        }

        let next = match method {
            PaymentMethod::Card => {
                validation::validate_payer_identity(payer)
                    .map_err(RouterError::MissingPayerData)?;
                RouterState::CardInProgress
            }
            PaymentMethod::Bank | PaymentMethod::Ussd | PaymentMethod::Crypto => {
                RouterState::AsyncPending
            }
        };

        self.method = Some(method);
        self.state = next;
        Ok(next)
    }

    pub fn on_card_outcome(&mut self, outcome: CardOutcome) -> Result<RouterState, RouterError> {
        self.ensure_open()?;
        if self.state != RouterState::CardInProgress {
            return Err(RouterError::InvalidTransition {
                state: self.state,
                event: "card_outcome",
            });
        }

        self.state = match outcome {
            CardOutcome::Succeeded => RouterState::Succeeded,
            CardOutcome::Failed => RouterState::Failed,
            CardOutcome::RequiresAction => RouterState::CardInProgress,
        };
        Ok(self.state)
    }

    pub fn on_rail_signal(&mut self, signal: RailSignal) -> Result<RouterState, RouterError> {
        self.ensure_open()?;
        if self.state != RouterState::AsyncPending {
            return Err(RouterError::InvalidTransition {
                state: self.state,
                event: "rail_signal",
            });
        }

        self.state = match signal {
            RailSignal::Succeeded => RouterState::Succeeded,
            RailSignal::Failed => RouterState::Failed,
        };
        Ok(self.state)
    }

    fn ensure_open(&self) -> Result<(), RouterError> {
        if self.state.is_terminal() {
            return Err(RouterError::Terminal(self.state));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payer() -> PayerData {
        PayerData {
            email: Some("ada@example.com".to_string()),
            name: Some("Ada Obi".to_string()),
            phone: None,
        }
    }

    #[test]
    fn card_requires_payer_identity() {
        let mut router = PaymentRouter::new();
        let incomplete = PayerData {
            email: None,
            ..payer()
        };

        let err = router.select(PaymentMethod::Card, &incomplete).unwrap_err();
        assert!(matches!(err, RouterError::MissingPayerData(ref e) if e.field == "email"));
        assert_eq!(router.state(), RouterState::Selecting);

        assert_eq!(
            router.select(PaymentMethod::Card, &payer()),
            Ok(RouterState::CardInProgress)
        );
    }

    #[test]
    fn async_rails_do_not_need_card_details() {
        for method in [PaymentMethod::Bank, PaymentMethod::Ussd, PaymentMethod::Crypto] {
            let mut router = PaymentRouter::new();
            assert_eq!(
                router.select(method, &PayerData::default()),
                Ok(RouterState::AsyncPending)
            );
            assert_eq!(router.method(), Some(method));
        }
    }

    #[test]
    fn requires_action_keeps_card_in_progress() {
        let mut router = PaymentRouter::new();
        router.select(PaymentMethod::Card, &payer()).unwrap();

        assert_eq!(
            router.on_card_outcome(CardOutcome::RequiresAction),
            Ok(RouterState::CardInProgress)
        );
        assert_eq!(
            router.on_card_outcome(CardOutcome::Succeeded),
            Ok(RouterState::Succeeded)
        );
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut router = PaymentRouter::new();
        router.select(PaymentMethod::Ussd, &payer()).unwrap();
        router.on_rail_signal(RailSignal::Failed).unwrap();

        assert_eq!(
            router.on_rail_signal(RailSignal::Succeeded),
            Err(RouterError::Terminal(RouterState::Failed))
        );
        assert_eq!(
            router.select(PaymentMethod::Card, &payer()),
            Err(RouterError::Terminal(RouterState::Failed))
        );
    }

    #[test]
    fn rail_signal_cannot_finish_a_card_attempt() {
        let mut router = PaymentRouter::resume(RouterState::CardInProgress, PaymentMethod::Card);
        assert!(matches!(
            router.on_rail_signal(RailSignal::Succeeded),
            Err(RouterError::InvalidTransition { .. })
        ));
        assert_eq!(router.state(), RouterState::CardInProgress);
    }

    #[test]
    fn method_parse_matches_as_str() {
        assert_eq!(PaymentMethod::parse("crypto"), Some(PaymentMethod::Crypto));
        assert_eq!(PaymentMethod::parse("cash"), None);
        assert!(!PaymentMethod::Card.is_async());
        assert!(PaymentMethod::Bank.is_async());
    }
}
