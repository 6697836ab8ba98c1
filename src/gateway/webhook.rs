use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Provider event types this reconciler acts on. Everything else is accepted
/// and ignored (forward compatibility).
pub const EVENT_PAYMENT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// A decoded webhook delivery: the provider's type tag plus the correlation
/// metadata stamped onto the session at creation time.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: String,
    pub order_id: Option<Uuid>,
    pub user_id: Option<i64>,
    pub payment_ref: Option<String>,
}

/// Extracts the event type, correlation metadata and payment reference from
/// a provider payload. Missing or malformed metadata yields `None` fields;
/// the reconciler treats those deliveries as no-ops rather than errors.
pub fn parse_event(payload: &Value) -> WebhookEvent {
    let event_type = payload
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let object = payload.pointer("/data/object");

    let metadata = object.and_then(|o| o.get("metadata"));
    let order_id = metadata
        .and_then(|m| m.get("orderId"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let user_id = metadata
        .and_then(|m| m.get("userId"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok());

    let payment_ref = object
        .and_then(|o| o.get("payment_intent"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    WebhookEvent {
        event_type,
        order_id,
        user_id,
        payment_ref,
    }
}

/// Verifies a Stripe-style `t=<ts>,v1=<hex hmac>` signature header over the
/// raw payload, with a timestamp tolerance window against replay.
pub fn verify_signature(
    signature_header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
    now_epoch_secs: i64,
) -> bool {
    let mut ts = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => ts = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return false;
    }

    match ts.parse::<i64>() {
        Ok(ts_i) if (now_epoch_secs - ts_i).unsigned_abs() <= tolerance_secs => {}
        _ => return false,
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, v1)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
