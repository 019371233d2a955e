#![allow(dead_code)]

use paylink_core::adapters::{InMemoryLedger, InMemoryLinkStore};
use paylink_core::config::{Config, LogFormat, RailSettings};
use paylink_core::provider::HttpCardProvider;
use paylink_core::{create_app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MERCHANT_KEY: &str = "merchant-test-key";
pub const WEBHOOK_SECRET: &str = "rail-webhook-secret";

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryLinkStore>,
}

pub fn test_config(provider_url: String) -> Config {
    Config {
        server_port: 0,
        database_url: None,
        redis_url: None,
        provider_api_url: provider_url,
        provider_secret_key: "sk_test_123".to_string(),
        provider_publishable_key: "pk_test_123".to_string(),
        merchant_api_key: MERCHANT_KEY.to_string(),
        rail_webhook_secret: WEBHOOK_SECRET.to_string(),
        card_session_timeout_secs: 5,
        expiry_sweep_interval_secs: 60,
        public_base_url: "https://pay.example.com".to_string(),
        cors_allowed_origins: vec!["*".to_string()],
        log_format: LogFormat::Text,
        rails: RailSettings {
            bank_account_name: Some("Acme Ltd".to_string()),
            bank_account_number: Some("0123456789".to_string()),
            bank_name: Some("First Test Bank".to_string()),
            ussd_code_template: "*737*000*{amount}*{reference}#".to_string(),
            crypto_deposit_address: None,
            crypto_network: None,
        },
    }
}

/// Serves the app on an ephemeral port with in-memory backends. Card calls
/// go to `provider_url`, usually a mockito server.
pub async fn spawn_app(provider_url: String) -> TestApp {
    let store = Arc::new(InMemoryLinkStore::new());
    let config = test_config(provider_url.clone());
    let provider = Arc::new(HttpCardProvider::new(
        provider_url,
        config.provider_secret_key.clone(),
        config.provider_publishable_key.clone(),
    ));
    let state = AppState::new(
        config,
        store.clone(),
        Arc::new(InMemoryLedger::new()),
        provider,
        "memory",
    );
    let app = create_app(state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", actual_addr),
        client: reqwest::Client::new(),
        store,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Creates a link through the merchant API and returns its summary.
    pub async fn create_link(&self, body: Value) -> Value {
        let res = self
            .client
            .post(self.url("/payment-links"))
            .bearer_auth(MERCHANT_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::CREATED);
        res.json().await.unwrap()
    }

    pub async fn get_link(&self, id: &str) -> Value {
        self.client
            .get(self.url(&format!("/payment-links/{}", id)))
            .bearer_auth(MERCHANT_KEY)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

pub fn membership_link(max_uses: Option<i32>) -> Value {
    json!({
        "title": "Annual membership",
        "description": "Covers 2026",
        "amount": "15000.00",
        "currency": "ngn",
        "max_uses": max_uses,
        "success_message": "Welcome aboard"
    })
}

pub fn payer() -> Value {
    json!({ "email": "ada@example.com", "name": "Ada Obi" })
}

/// A provider intent body as the card API would return it for `link`.
pub fn intent_body(id: &str, status: &str, link: &Value, amount_minor: i64) -> String {
    json!({
        "id": id,
        "client_secret": format!("{}_secret_abc", id),
        "status": status,
        "amount": amount_minor,
        "currency": link["currency"].as_str().unwrap().to_ascii_lowercase(),
        "metadata": {
            "link_id": link["id"],
            "short_code": link["short_code"],
            "payer_email": "ada@example.com"
        }
    })
    .to_string()
}
