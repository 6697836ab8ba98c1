use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    auth::{Claims, Role},
    build_state,
    config::AppConfig,
    db,
    entities::{cart, cart_item, product},
    errors::ServiceError,
    gateway::{CreateSessionRequest, GatewaySession, PaymentGateway},
    AppState,
};

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_32c";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Gateway double: records every session request and can be flipped into a
/// failure mode.
pub struct MockGateway {
    pub requests: Mutex<Vec<CreateSessionRequest>>,
    fail: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::GatewayError(
                "simulated gateway outage".to_string(),
            ));
        }
        let id = format!("cs_test_{}", request.order_id.simple());
        self.requests
            .lock()
            .expect("gateway request log poisoned")
            .push(request);
        Ok(GatewaySession {
            url: format!("https://pay.example.com/{id}"),
            id,
        })
    }
}

/// Test harness: full router over in-memory SQLite with the real migrator and
/// a mock payment gateway.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub gateway: Arc<MockGateway>,
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        default_currency: "usd".to_string(),
        gateway_secret_key: Some("sk_test_key".to_string()),
        gateway_api_base: None,
        payment_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        payment_webhook_tolerance_secs: 300,
        frontend_url: "http://localhost:3000".to_string(),
        event_channel_capacity: 64,
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app with a tweaked configuration, e.g. no webhook secret.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = test_config();
        tweak(&mut cfg);

        // A single pooled connection keeps the in-memory database alive and
        // shared for the lifetime of the test.
        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");

        let gateway = Arc::new(MockGateway::new());
        let state = build_state(pool, cfg, gateway.clone());
        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
        }
    }

    /// Issues a bearer token signed with the test secret.
    pub fn token_for(&self, user_id: i64, role: Role) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("encode test token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error")
    }

    pub async fn request_as(
        &self,
        user_id: i64,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let token = self.token_for(user_id, Role::Customer);
        self.request(method, uri, body, Some(&token)).await
    }

    /// Posts a raw webhook body with the given signature header.
    pub async fn post_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(payload.to_vec())).expect("build request"))
            .await
            .expect("router error")
    }

    pub async fn seed_product(&self, title: &str, price: Decimal, stock: i32) -> Uuid {
        self.seed_product_full(title, price, stock, true).await
    }

    pub async fn seed_product_full(
        &self,
        title: &str,
        price: Decimal,
        stock: i32,
        active: bool,
    ) -> Uuid {
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            description: Set(None),
            price: Set(price),
            currency: Set("usd".to_string()),
            stock: Set(stock),
            active: Set(active),
            image_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product");
        model.id
    }

    /// Inserts a cart line directly, bypassing add-time stock validation.
    pub async fn seed_cart_line(&self, user_id: i64, product_id: Uuid, quantity: i32) {
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

        let existing = storefront_api::entities::Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(self.state.db.as_ref())
            .await
            .expect("query cart");
        let cart_id = match existing {
            Some(c) => c.id,
            None => {
                let now = Utc::now();
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.state.db.as_ref())
                .await
                .expect("seed cart")
                .id
            }
        };

        let now = Utc::now();
        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed cart line");
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        use sea_orm::EntityTrait;

        storefront_api::entities::Product::find_by_id(product_id)
            .one(self.state.db.as_ref())
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }
}

/// Signs a webhook payload the way the provider does.
pub fn sign_webhook(payload: &[u8], secret: &str, ts: i64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{ts}.").as_bytes());
    mac.update(payload);
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

#[allow(dead_code)]
pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
