use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{RouterError, UnavailableReason};
use crate::ports::{LedgerError, StoreError};
use crate::provider::ProviderError;
use crate::validation::ValidationError;

/// Tracing target for failures where money may have moved without being credited.
pub const ALERT_TARGET: &str = "payments::alert";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment link unavailable: {0}")]
    LinkUnavailable(UnavailableReason),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Unconfirmed payment: {0}")]
    UnconfirmedPayment(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Reconciliation in progress: {0}")]
    ReconciliationInProgress(String),

    #[error("Idempotency store unavailable: {0}")]
    IdempotencyUnavailable(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::LinkUnavailable(_) => StatusCode::GONE,
            AppError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            AppError::UnconfirmedPayment(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            AppError::ReconciliationInProgress(_) => StatusCode::CONFLICT,
            AppError::IdempotencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::LinkUnavailable(_) => "link_unavailable",
            AppError::PaymentProvider(_) => "payment_provider_error",
            AppError::UnconfirmedPayment(_) => "unconfirmed_payment",
            AppError::ConcurrencyConflict(_) => "concurrency_conflict",
            AppError::ReconciliationInProgress(_) => "reconciliation_in_progress",
            AppError::IdempotencyUnavailable(_) => "idempotency_unavailable",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Provider and reconciliation failures go to the alert log, not just the payer.
    pub fn is_money_at_risk(&self) -> bool {
        matches!(
            self,
            AppError::PaymentProvider(_)
                | AppError::UnconfirmedPayment(_)
                | AppError::ConcurrencyConflict(_)
                | AppError::IdempotencyUnavailable(_)
        )
    }

    /// Whether the payer may retry with a fresh session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::PaymentProvider(_)
                | AppError::ReconciliationInProgress(_)
                | AppError::IdempotencyUnavailable(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_money_at_risk() {
            tracing::error!(target: ALERT_TARGET, code = self.code(), "{}", self);
        } else if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        }

        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        });
        if let AppError::LinkUnavailable(reason) = &self {
            body["reason"] = json!(reason);
        }

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::IdempotencyUnavailable(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::PaymentProvider(err.to_string())
    }
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::MissingPayerData(e) => AppError::Validation(e.to_string()),
            other => AppError::InvalidTransition(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("email: must not be empty".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_link_unavailable_is_gone() {
        let error = AppError::LinkUnavailable(UnavailableReason::ExpiredUses);
        assert_eq!(error.status_code(), StatusCode::GONE);
        assert_eq!(error.to_string(), "Payment link unavailable: expired_uses");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_provider_error_is_retryable_and_alerting() {
        let error = AppError::from(ProviderError::Rejected {
            code: Some("card_declined".to_string()),
            message: "Your card was declined.".to_string(),
        });
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            error.to_string(),
            "Payment provider error: Your card was declined."
        );
        assert!(error.is_retryable());
        assert!(error.is_money_at_risk());
    }

    #[test]
    fn test_conflict_status_code() {
        let error = AppError::ConcurrencyConflict("link exhausted".to_string());
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert!(error.is_money_at_risk());
    }

    #[test]
    fn test_ledger_failure_fails_closed() {
        let error = AppError::from(LedgerError::Unavailable("connection refused".to_string()));
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let error = AppError::from(StoreError::NotFound("payment link x".to_string()));
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_response() {
        let error = AppError::UnconfirmedPayment("pi_1 is processing".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("payment link abc".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
