use axum::{
    async_trait,
    body::{Bytes, HttpBody},
    extract::{FromRequest, State},
    http::Request,
    response::IntoResponse,
    BoxError, Json,
};

use crate::error::AppError;
use crate::services::rails::{self, RailNotification, SIGNATURE_HEADER};
use crate::utils::sanitize::sanitize_json;
use crate::AppState;

/// Raw webhook body whose `X-Rail-Signature` matched.
pub struct VerifiedRailWebhook {
    pub body: Bytes,
}

#[async_trait]
impl<B> FromRequest<AppState, B> for VerifiedRailWebhook
where
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::Unauthorized("missing X-Rail-Signature header".to_string()))?;

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(format!("body: {}", e)))?;

        if !rails::verify_signature(&state.config.rail_webhook_secret, &body, &signature) {
            tracing::warn!("Rejected rail webhook with bad signature");
            return Err(AppError::Unauthorized(
                "rail webhook signature mismatch".to_string(),
            ));
        }

        Ok(VerifiedRailWebhook { body })
    }
}

pub async fn rail_webhook(
    State(state): State<AppState>,
    webhook: VerifiedRailWebhook,
) -> Result<impl IntoResponse, AppError> {
    let payload: serde_json::Value = serde_json::from_slice(&webhook.body)
        .map_err(|e| AppError::Validation(format!("body: {}", e)))?;
    tracing::info!(payload = %sanitize_json(&payload), "Rail webhook received");

    let notification: RailNotification = serde_json::from_value(payload)
        .map_err(|e| AppError::Validation(format!("body: {}", e)))?;

    let response = state.flow.handle_rail_signal(notification).await?;
    Ok(Json(response))
}
