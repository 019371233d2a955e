pub mod payment_links;
pub mod payments;
pub mod webhook;

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub store_backend: String,
    pub card_provider: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_status = match state.store.health_check().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Link store health check failed");
            "disconnected"
        }
    };

    let card_provider = state.provider.circuit_state();
    if card_provider != "closed" {
        tracing::warn!("Card provider circuit breaker is open");
    }

    let healthy = store_status == "connected";
    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_status.to_string(),
        store_backend: state.store_backend.to_string(),
        card_provider: card_provider.to_string(),
    };

    // Return 503 if the store is down, 200 otherwise
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
