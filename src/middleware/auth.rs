use axum::{
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::AppState;

/// Bearer-token guard for the merchant routes.
pub async fn merchant_auth<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token.as_bytes() == state.config.merchant_api_key.as_bytes() => {
            Ok(next.run(req).await)
        }
        Some(_) => Err(AppError::Unauthorized("invalid merchant API key".to_string())),
        None => Err(AppError::Unauthorized(
            "missing bearer token".to_string(),
        )),
    }
}
