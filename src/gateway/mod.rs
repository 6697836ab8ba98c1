use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub mod stripe;
pub mod webhook;

pub use webhook::{parse_event, verify_signature, WebhookEvent};

/// Currencies the provider treats as zero-decimal: amounts are whole units,
/// not hundredths.
const ZERO_DECIMAL_CURRENCIES: [&str; 4] = ["clp", "jpy", "krw", "vnd"];

/// One priced line of a hosted checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub quantity: i32,
    /// Unit amount in the gateway's minor-unit convention
    pub unit_amount: i64,
    pub currency: String,
    pub product_id: Uuid,
    pub image_url: Option<String>,
}

/// Request to create a hosted payment session. The order and user ids ride
/// along as correlation metadata and come back on webhook events.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub order_id: Uuid,
    pub user_id: i64,
}

/// Hosted session handle returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

/// External payment provider seam. The production implementation is
/// [`stripe::StripeGateway`]; tests substitute their own.
///
/// Session creation is a single bounded call with no retry at this layer;
/// at-least-once delivery on the provider side is absorbed by the
/// reconciler's idempotency guard, not by retrying here.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// Converts a decimal amount to the gateway's minor-unit convention:
/// zero-decimal currencies round to whole units, all others to the nearest
/// 1/100.
pub fn to_minor_units(currency: &str, amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_lowercase().as_str()) {
        amount.round()
    } else {
        (amount * Decimal::from(100)).round()
    };

    scaled.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("amount {amount} {currency} out of range"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cents_for_decimal_currencies() {
        assert_eq!(to_minor_units("usd", dec!(10.00)).unwrap(), 1000);
        assert_eq!(to_minor_units("eur", dec!(5.50)).unwrap(), 550);
        assert_eq!(to_minor_units("USD", dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn whole_units_for_zero_decimal_currencies() {
        assert_eq!(to_minor_units("clp", dec!(12990)).unwrap(), 12990);
        assert_eq!(to_minor_units("jpy", dec!(500)).unwrap(), 500);
        assert_eq!(to_minor_units("CLP", dec!(999.4)).unwrap(), 999);
    }

    #[test]
    fn rounds_to_nearest_minor_unit() {
        // Banker's rounding at the midpoint is acceptable; off-midpoint
        // values must land on the nearest cent.
        assert_eq!(to_minor_units("usd", dec!(19.999)).unwrap(), 2000);
        assert_eq!(to_minor_units("usd", dec!(19.991)).unwrap(), 1999);
    }
}
