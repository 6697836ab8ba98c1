use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured error body returned at the HTTP boundary.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable reason code; embeds the product id for stock and
    /// availability failures so callers can fix the offending cart line
    pub code: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Product {0} is inactive or does not exist")]
    ProductUnavailable(Uuid),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("Product {0} is out of stock")]
    OutOfStock(Uuid),

    #[error("Product {0} is not in the cart")]
    LineNotFound(Uuid),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Invalid webhook delivery: {0}")]
    InvalidWebhook(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Returns the HTTP status code for this error. Single source of truth
    /// for error-to-status mapping; business logic never sees status codes.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // An empty cart is reported as "not found", matching the
            // checkout contract.
            Self::CartEmpty | Self::NotFound(_) | Self::LineNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::ProductUnavailable(_)
            | Self::InsufficientStock(_)
            | Self::OutOfStock(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::InvalidWebhook(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason code. Stock and availability codes embed the
    /// product id so the caller can adjust the cart instead of retrying
    /// blindly.
    pub fn reason_code(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => "INTERNAL_ERROR".to_string(),
            Self::NotFound(_) => "NOT_FOUND".to_string(),
            Self::ValidationError(_) => "VALIDATION_ERROR".to_string(),
            Self::CartEmpty => "CART_EMPTY".to_string(),
            Self::ProductUnavailable(id) => format!("PRODUCT_INACTIVE_OR_NOT_FOUND_{id}"),
            Self::InsufficientStock(id) => format!("INSUFFICIENT_STOCK_{id}"),
            Self::OutOfStock(id) => format!("OUT_OF_STOCK_{id}"),
            Self::LineNotFound(id) => format!("LINE_NOT_FOUND_{id}"),
            Self::Unauthorized(_) => "UNAUTHORIZED".to_string(),
            Self::Forbidden(_) => "FORBIDDEN".to_string(),
            Self::GatewayError(_) => "GATEWAY_ERROR".to_string(),
            Self::InvalidWebhook(_) => "INVALID_WEBHOOK".to_string(),
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a generic
    /// message instead of leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.reason_code(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
