use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::domain::{PayerData, PaymentMethod};
use crate::error::AppError;
use crate::services::{CheckoutTarget, PaymentDetails};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    #[serde(default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payer: PayerData,
}

impl CreateIntentRequest {
    fn target(&self) -> Result<CheckoutTarget, AppError> {
        match (&self.short_code, &self.amount, &self.currency) {
            (Some(short_code), _, _) => Ok(CheckoutTarget::Link {
                short_code: short_code.trim().to_string(),
            }),
            (None, Some(amount), Some(currency)) => Ok(CheckoutTarget::Adhoc {
                amount: amount.clone(),
                currency: currency.clone(),
            }),
            _ => Err(AppError::Validation(
                "short_code: required unless amount and currency are given".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub provider_reference: String,
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub provider_reference: String,
    #[serde(default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub payer: PayerData,
}

#[derive(Debug, Deserialize)]
pub struct RailRequest {
    pub short_code: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payer: PayerData,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
}

pub async fn create_intent(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = request.target()?;
    let started = state.flow.start_card(target, &request.payer).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let details = PaymentDetails {
        payment_method: request.payment_method,
    };
    let response = state
        .flow
        .submit_card(request.provider_reference.trim(), &details)
        .await?;
    Ok(Json(response))
}

pub async fn confirm(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .flow
        .confirm(
            request.provider_reference.trim(),
            request.short_code.as_deref().map(str::trim),
            &request.payer,
        )
        .await?;
    Ok(Json(response))
}

pub async fn start_rail(
    State(state): State<AppState>,
    Json(request): Json<RailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let started = state
        .flow
        .start_async(
            request.short_code.trim(),
            request.payment_method,
            &request.payer,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// Success page backing call; the session id is re-verified with the provider.
pub async fn payment_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.flow.verify_success(query.session_id.trim()).await?;
    Ok(Json(response))
}
