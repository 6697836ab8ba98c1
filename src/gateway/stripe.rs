use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{CreateSessionRequest, GatewaySession, PaymentGateway};
use crate::errors::ServiceError;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe Checkout implementation of [`PaymentGateway`]: creates a hosted
/// payment session in `payment` (one-time) mode via a form-encoded POST.
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    /// Flattens a session request into Stripe's bracketed form encoding.
    fn form_params(request: &CreateSessionRequest) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "metadata[orderId]".to_string(),
                request.order_id.to_string(),
            ),
            ("metadata[userId]".to_string(), request.user_id.to_string()),
            (
                "payment_intent_data[metadata][orderId]".to_string(),
                request.order_id.to_string(),
            ),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
            params.push((
                format!("line_items[{i}][price_data][currency]"),
                item.currency.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_amount.to_string(),
            ));
            params.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{i}][price_data][product_data][metadata][productId]"),
                item.product_id.to_string(),
            ));
            if let Some(image_url) = &item.image_url {
                params.push((
                    format!("line_items[{i}][price_data][product_data][images][0]"),
                    image_url.clone(),
                ));
            }
        }

        params
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let params = Self::form_params(&request);

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("session request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| "unknown gateway error".to_string());
            return Err(ServiceError::GatewayError(format!(
                "session creation rejected ({status}): {message}"
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed session response: {e}")))?;

        info!(session_id = %session.id, "checkout session created");
        Ok(GatewaySession {
            id: session.id,
            url: session.url,
        })
    }
}
