pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod provider;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::ports::{LinkStore, ReconciliationLedger};
use crate::provider::CardProvider;
use crate::services::{CheckoutSessionManager, ConfirmationReconciler, LinkService, PaymentFlow};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LinkStore>,
    pub links: Arc<LinkService>,
    pub flow: Arc<PaymentFlow>,
    pub reconciler: Arc<ConfirmationReconciler>,
    pub provider: Arc<dyn CardProvider>,
    pub config: Arc<Config>,
    pub store_backend: &'static str,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn LinkStore>,
        ledger: Arc<dyn ReconciliationLedger>,
        provider: Arc<dyn CardProvider>,
        store_backend: &'static str,
    ) -> Self {
        let reconciler = Arc::new(ConfirmationReconciler::new(
            store.clone(),
            ledger,
            provider.clone(),
        ));
        let sessions = CheckoutSessionManager::new(
            store.clone(),
            provider.clone(),
            config.card_session_timeout(),
        );
        let flow = PaymentFlow::new(
            store.clone(),
            sessions,
            reconciler.clone(),
            config.rails.clone(),
        );
        let links = LinkService::new(store.clone(), config.public_base_url.clone());

        Self {
            store,
            links: Arc::new(links),
            flow: Arc::new(flow),
            reconciler,
            provider,
            config: Arc::new(config),
            store_backend,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

pub fn create_app(state: AppState) -> Router {
    let merchant = Router::new()
        .route(
            "/payment-links",
            post(handlers::payment_links::create_link).get(handlers::payment_links::list_links),
        )
        .route(
            "/payment-links/flagged",
            get(handlers::payment_links::list_flagged),
        )
        .route(
            "/payment-links/:id",
            get(handlers::payment_links::get_link).delete(handlers::payment_links::delete_link),
        )
        .route(
            "/payment-links/:id/enable",
            post(handlers::payment_links::enable_link),
        )
        .route(
            "/payment-links/:id/disable",
            post(handlers::payment_links::disable_link),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::merchant_auth,
        ));

    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/payment-links/public/:short_code",
            get(handlers::payment_links::get_public_link),
        )
        .route(
            "/payments/create-intent",
            post(handlers::payments::create_intent),
        )
        .route("/payments/submit", post(handlers::payments::submit))
        .route("/payments/confirm", post(handlers::payments::confirm))
        .route("/payments/rails", post(handlers::payments::start_rail))
        .route("/payment/success", get(handlers::payments::payment_success))
        .route("/webhooks/rails", post(handlers::webhook::rail_webhook))
        .merge(merchant)
        .layer(axum_middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(cors)
        .with_state(state)
}
