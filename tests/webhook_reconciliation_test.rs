mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, sign_webhook, TestApp, WEBHOOK_SECRET};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

fn completed_payload(order_id: Uuid, user_id: i64, payment_ref: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_completed",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_done",
            "payment_intent": payment_ref,
            "metadata": { "orderId": order_id.to_string(), "userId": user_id.to_string() }
        }}
    }))
    .unwrap()
}

fn failed_payload(order_id: Uuid) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_failed",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "pi_failed",
            "metadata": { "orderId": order_id.to_string() }
        }}
    }))
    .unwrap()
}

fn sign(payload: &[u8]) -> String {
    sign_webhook(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp())
}

/// Seeds a product, fills the cart and creates a payment session. Returns
/// (product_id, order_id).
async fn session_fixture(app: &TestApp, user_id: i64, stock: i32, quantity: i32) -> (Uuid, Uuid) {
    let product_id = app.seed_product("Turntable", dec!(199.00), stock).await;
    app.request_as(
        user_id,
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "product_id": product_id, "quantity": quantity })),
    )
    .await;
    let body = response_json(
        app.request_as(user_id, Method::POST, "/api/v1/payments/checkout", None)
            .await,
    )
    .await;
    let order_id = body["order_id"].as_str().unwrap().parse().unwrap();
    (product_id, order_id)
}

async fn order_status(app: &TestApp, user_id: i64, order_id: Uuid) -> serde_json::Value {
    let body = response_json(
        app.request_as(user_id, Method::GET, &format!("/api/v1/orders/{order_id}"), None)
            .await,
    )
    .await;
    body["order"].clone()
}

#[tokio::test]
async fn completed_event_settles_order_decrements_stock_and_clears_cart() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 2).await;

    let payload = completed_payload(order_id, 1, "pi_settled");
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["received"], true);

    let order = order_status(&app, 1, order_id).await;
    assert_eq!(order["status"], "PAID");
    assert_eq!(order["payment_ref"], "pi_settled");
    assert_eq!(app.product_stock(product_id).await, 3);

    let cart = response_json(app.request_as(1, Method::GET, "/api/v1/cart", None).await).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn duplicate_completion_is_a_no_op() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 2).await;

    let payload = completed_payload(order_id, 1, "pi_once");
    app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(app.product_stock(product_id).await, 3);

    // The provider redelivers; stock must not be decremented twice.
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.product_stock(product_id).await, 3);
    assert_eq!(order_status(&app, 1, order_id).await["status"], "PAID");
}

#[tokio::test]
async fn failed_event_marks_order_failed_without_touching_stock() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 5, 5, 1).await;

    let payload = failed_payload(order_id);
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(order_status(&app, 5, order_id).await["status"], "FAILED");
    assert_eq!(app.product_stock(product_id).await, 5);
}

#[tokio::test]
async fn failure_after_completion_does_not_regress_paid_order() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 1).await;

    let paid = completed_payload(order_id, 1, "pi_final");
    app.post_webhook(&paid, Some(&sign(&paid))).await;

    let failed = failed_payload(order_id);
    let response = app.post_webhook(&failed, Some(&sign(&failed))).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(order_status(&app, 1, order_id).await["status"], "PAID");
    assert_eq!(app.product_stock(product_id).await, 4);
}

#[tokio::test]
async fn completion_after_failure_still_lands_on_paid() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 1).await;

    let failed = failed_payload(order_id);
    app.post_webhook(&failed, Some(&sign(&failed))).await;
    assert_eq!(order_status(&app, 1, order_id).await["status"], "FAILED");

    let paid = completed_payload(order_id, 1, "pi_late");
    app.post_webhook(&paid, Some(&sign(&paid))).await;

    let order = order_status(&app, 1, order_id).await;
    assert_eq!(order["status"], "PAID");
    assert_eq!(order["payment_ref"], "pi_late");
    assert_eq!(app.product_stock(product_id).await, 4);
}

#[tokio::test]
async fn oversell_on_confirmation_clamps_stock_to_zero() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 2, 2).await;

    // Another buyer takes a unit between session creation and confirmation.
    app.seed_cart_line(2, product_id, 1).await;
    app.request_as(2, Method::POST, "/api/v1/orders/checkout", None)
        .await;
    assert_eq!(app.product_stock(product_id).await, 1);

    // The confirmed payment wins; stock clamps instead of going negative.
    let payload = completed_payload(order_id, 1, "pi_oversold");
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(order_status(&app, 1, order_id).await["status"], "PAID");
    assert_eq!(app.product_stock(product_id).await, 0);
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged() {
    let app = TestApp::new().await;

    let payload = serde_json::to_vec(&json!({
        "type": "customer.subscription.updated",
        "data": { "object": {} }
    }))
    .unwrap();
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn completion_without_metadata_is_acknowledged_as_no_op() {
    let app = TestApp::new().await;
    let (product_id, _) = session_fixture(&app, 1, 5, 1).await;

    let payload = serde_json::to_vec(&json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_anonymous" } }
    }))
    .unwrap();
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.product_stock(product_id).await, 5);
}

#[tokio::test]
async fn completion_for_unknown_order_is_acknowledged() {
    let app = TestApp::new().await;

    let payload = completed_payload(Uuid::new_v4(), 9, "pi_ghost");
    let response = app.post_webhook(&payload, Some(&sign(&payload))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tampered_or_missing_signature_is_401() {
    let app = TestApp::new().await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 1).await;

    let payload = completed_payload(order_id, 1, "pi_forged");

    let response = app.post_webhook(&payload, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = sign_webhook(&payload, "whsec_wrong", chrono::Utc::now().timestamp());
    let response = app.post_webhook(&payload, Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let stale = sign_webhook(&payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp() - 3600);
    let response = app.post_webhook(&payload, Some(&stale)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // None of the rejected deliveries reconciled anything.
    assert_eq!(
        order_status(&app, 1, order_id).await["status"],
        "REQUIRES_PAYMENT_METHOD"
    );
    assert_eq!(app.product_stock(product_id).await, 5);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let app = TestApp::new().await;

    let payload = b"not json at all";
    let response = app.post_webhook(payload, Some(&sign(payload))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_deliveries_accepted_when_no_secret_configured() {
    let app = TestApp::with_config(|cfg| cfg.payment_webhook_secret = None).await;
    let (product_id, order_id) = session_fixture(&app, 1, 5, 1).await;

    let payload = completed_payload(order_id, 1, "pi_devmode");
    let response = app.post_webhook(&payload, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_status(&app, 1, order_id).await["status"], "PAID");
    assert_eq!(app.product_stock(product_id).await, 4);
}
