use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{
    to_minor_units, CardProvider, CreateIntent, ProviderError, ProviderErrorBody, ProviderIntent,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ProviderErrorBody,
}

/// HTTP client for a Stripe-shaped payment intents API.
#[derive(Clone)]
pub struct HttpCardProvider {
    client: Client,
    base_url: String,
    secret_key: String,
    publishable_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl HttpCardProvider {
    pub fn new(base_url: String, secret_key: String, publishable_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, publishable_key, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        publishable_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            secret_key,
            publishable_key,
            circuit_breaker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        intent_ref: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        let intent_ref = intent_ref.to_string();
        let request = request.bearer_auth(&self.secret_key);

        let result = self
            .circuit_breaker
            .call_with(trips_breaker, async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;
                read_intent(response, &intent_ref).await
            })
            .await;

        match result {
            Ok(intent) => Ok(intent),
            Err(FailsafeError::Rejected) => Err(ProviderError::CircuitOpen(
                "card provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

/// Declines and unknown intents are answers, not outages.
fn trips_breaker(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::Transport(_) | ProviderError::InvalidResponse(_)
    )
}

async fn read_intent(
    response: reqwest::Response,
    intent_ref: &str,
) -> Result<ProviderIntent, ProviderError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<ProviderIntent>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
    }

    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(intent_ref.to_string()));
    }

    if status.is_server_error() {
        return Err(ProviderError::Transport(format!(
            "provider returned {}",
            status
        )));
    }

    let envelope = response
        .json::<ErrorEnvelope>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    Err(ProviderError::Rejected {
        code: envelope.error.code,
        message: envelope
            .error
            .message
            .unwrap_or_else(|| format!("provider returned {}", status)),
    })
}

#[async_trait]
impl CardProvider for HttpCardProvider {
    fn publishable_key(&self) -> &str {
        &self.publishable_key
    }

    fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    async fn create_intent(&self, request: &CreateIntent) -> Result<ProviderIntent, ProviderError> {
        let amount = to_minor_units(&request.amount).ok_or_else(|| ProviderError::Rejected {
            code: Some("amount_too_large".to_string()),
            message: format!("amount {} cannot be charged", request.amount),
        })?;

        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), request.currency.to_ascii_lowercase()),
        ];
        if let Some(description) = &request.description {
            form.push(("description".to_string(), description.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let builder = self
            .client
            .post(self.url("/v1/payment_intents"))
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form);

        self.execute(builder, &request.idempotency_key).await
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        let builder = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{}/confirm", intent_id)))
            .form(&[("payment_method", payment_method)]);

        self.execute(builder, intent_id).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProviderIntent, ProviderError> {
        let builder = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", intent_id)));

        self.execute(builder, intent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::IntentStatus;
    use bigdecimal::BigDecimal;
    use std::collections::HashMap;

    fn provider(url: String) -> HttpCardProvider {
        HttpCardProvider::new(url, "sk_test_123".to_string(), "pk_test_123".to_string())
    }

    #[test]
    fn test_provider_client_creation() {
        let client = provider("https://api.example.com/".to_string());
        assert_eq!(client.publishable_key(), "pk_test_123");
        assert_eq!(client.url("/v1/payment_intents"), "https://api.example.com/v1/payment_intents");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_create_intent_sends_minor_units_and_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payment_intents")
            .match_header("authorization", "Bearer sk_test_123")
            .match_header("idempotency-key", "attempt-1")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("amount".into(), "500000".into()),
                mockito::Matcher::UrlEncoded("currency".into(), "ngn".into()),
                mockito::Matcher::UrlEncoded("metadata[short_code]".into(), "abcd1234".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"pi_1","client_secret":"pi_1_secret","status":"requires_payment_method","amount":500000,"currency":"ngn","metadata":{"short_code":"abcd1234"}}"#,
            )
            .create_async()
            .await;

        let mut metadata = HashMap::new();
        metadata.insert("short_code".to_string(), "abcd1234".to_string());
        let intent = provider(server.url())
            .create_intent(&CreateIntent {
                amount: BigDecimal::from(5000),
                currency: "NGN".to_string(),
                idempotency_key: "attempt-1".to_string(),
                description: None,
                metadata,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.client_secret.as_deref(), Some("pi_1_secret"));
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
    }

    #[tokio::test]
    async fn test_decline_is_surfaced_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payment_intents/pi_2/confirm")
            .with_status(402)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"card_declined","message":"Your card was declined."}}"#)
            .create_async()
            .await;

        let result = provider(server.url())
            .confirm_intent("pi_2", "pm_card_visa")
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Your card was declined.");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unknown_intent_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payment_intents/pi_missing")
            .with_status(404)
            .create_async()
            .await;

        let result = provider(server.url()).retrieve_intent("pi_missing").await;
        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/payment_intents/pi_3")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = HttpCardProvider::with_circuit_breaker(
            server.url(),
            "sk_test_123".to_string(),
            "pk_test_123".to_string(),
            3,
            30,
        );

        for _ in 0..3 {
            let err = client.retrieve_intent("pi_3").await.unwrap_err();
            assert!(err.is_transient());
        }

        let result = client.retrieve_intent("pi_3").await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen(_))));
        assert_eq!(client.circuit_state(), "open");
    }

    #[tokio::test]
    async fn test_declines_do_not_trip_breaker() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/payment_intents/pi_4/confirm")
            .with_status(402)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"card_declined","message":"declined"}}"#)
            .create_async()
            .await;

        let client = HttpCardProvider::with_circuit_breaker(
            server.url(),
            "sk_test_123".to_string(),
            "pk_test_123".to_string(),
            2,
            30,
        );

        for _ in 0..4 {
            let result = client.confirm_intent("pi_4", "pm_card_chargeDeclined").await;
            assert!(matches!(result, Err(ProviderError::Rejected { .. })));
        }
        assert_eq!(client.circuit_state(), "closed");
    }
}
