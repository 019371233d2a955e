//! Scriptable in-process provider for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    to_minor_units, CardProvider, CreateIntent, IntentStatus, ProviderError, ProviderErrorBody,
    ProviderIntent,
};

#[derive(Debug, Clone)]
pub enum FakeConfirm {
    Status(IntentStatus),
    Transport,
    Decline(String),
}

#[derive(Default)]
pub struct FakeCardProvider {
    intents: Mutex<HashMap<String, ProviderIntent>>,
    by_idempotency_key: Mutex<HashMap<String, String>>,
    script: Mutex<VecDeque<FakeConfirm>>,
    confirm_delay: Option<Duration>,
    created: AtomicUsize,
    confirm_calls: AtomicUsize,
}

impl FakeCardProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirm_delay(delay: Duration) -> Self {
        Self {
            confirm_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Queues the results of upcoming `confirm_intent` calls. Unscripted calls succeed.
    pub fn script(&self, steps: impl IntoIterator<Item = FakeConfirm>) {
        self.script.lock().unwrap().extend(steps);
    }

    pub fn insert(&self, intent: ProviderIntent) {
        self.intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent);
    }

    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardProvider for FakeCardProvider {
    fn publishable_key(&self) -> &str {
        "pk_test_fake"
    }

    async fn create_intent(&self, request: &CreateIntent) -> Result<ProviderIntent, ProviderError> {
        let existing = self
            .by_idempotency_key
            .lock()
            .unwrap()
            .get(&request.idempotency_key)
            .cloned();
        if let Some(id) = existing {
            return self.retrieve_intent(&id).await;
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pi_fake_{}", n);
        let intent = ProviderIntent {
            id: id.clone(),
            client_secret: Some(format!("{}_secret", id)),
            status: IntentStatus::RequiresPaymentMethod,
            amount: to_minor_units(&request.amount).unwrap_or_default(),
            currency: request.currency.to_ascii_lowercase(),
            metadata: request.metadata.clone(),
            last_payment_error: None,
        };

        self.insert(intent.clone());
        self.by_idempotency_key
            .lock()
            .unwrap()
            .insert(request.idempotency_key.clone(), id);
        Ok(intent)
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        _payment_method: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.confirm_delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeConfirm::Status(IntentStatus::Succeeded));

        let mut intents = self.intents.lock().unwrap();
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| ProviderError::NotFound(intent_id.to_string()))?;

        match step {
            FakeConfirm::Status(status) => {
                intent.status = status;
                Ok(intent.clone())
            }
            FakeConfirm::Transport => Err(ProviderError::Transport("connection reset".to_string())),
            FakeConfirm::Decline(message) => {
                intent.status = IntentStatus::RequiresPaymentMethod;
                intent.last_payment_error = Some(ProviderErrorBody {
                    code: Some("card_declined".to_string()),
                    message: Some(message.clone()),
                });
                Err(ProviderError::Rejected {
                    code: Some("card_declined".to_string()),
                    message,
                })
            }
        }
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(intent_id.to_string()))
    }
}
