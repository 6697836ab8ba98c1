use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::Html,
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    gateway::{parse_event, verify_signature},
    services::payments::CheckoutSessionResponse,
    AppState,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/v1/payments/checkout
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    let session = state
        .services
        .payments
        .create_checkout_session(user.user_id)
        .await?;
    Ok(Json(session))
}

/// POST /api/v1/payments/webhook
///
/// Unauthenticated; trust comes from the signature over the raw body. A bad
/// signature is 401 so the provider retries after the secret is fixed, while
/// a verified delivery always returns 200, even when it reconciles to a
/// no-op, so the provider stops redelivering it.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    if let Some(secret) = &state.config.payment_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::InvalidWebhook("missing signature header".to_string())
            })?;

        let valid = verify_signature(
            signature,
            &body,
            secret,
            state.config.payment_webhook_tolerance_secs,
            chrono::Utc::now().timestamp(),
        );
        if !valid {
            return Err(ServiceError::InvalidWebhook(
                "signature verification failed".to_string(),
            ));
        }
    } else {
        warn!("webhook secret not configured, accepting delivery unverified");
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("malformed webhook body: {e}")))?;

    state
        .services
        .payments
        .handle_event(parse_event(&payload))
        .await?;

    Ok(Json(json!({ "received": true })))
}

/// GET /api/v1/payments/success
pub async fn payment_success() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html><html><head><title>Payment received</title></head>\
         <body><h1>Thanks for your purchase!</h1>\
         <p>Your payment was received and your order is being processed.</p>\
         </body></html>",
    )
}

/// GET /api/v1/payments/cancel
pub async fn payment_cancel() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html><html><head><title>Payment canceled</title></head>\
         <body><h1>Payment canceled</h1>\
         <p>No charge was made. Your cart is untouched.</p>\
         </body></html>",
    )
}
