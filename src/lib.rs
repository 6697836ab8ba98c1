use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod services;

use config::AppConfig;
use events::{process_events, EventSender};
use gateway::PaymentGateway;
use services::AppServices;

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub event_sender: EventSender,
}

/// Wires up state: service construction plus the background event logger.
pub fn build_state(
    db: DatabaseConnection,
    config: AppConfig,
    gateway: Arc<dyn PaymentGateway>,
) -> Arc<AppState> {
    let db = Arc::new(db);
    let config = Arc::new(config);

    let (tx, rx) = tokio::sync::mpsc::channel(config.event_channel_capacity);
    let event_sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let services = AppServices::new(
        db.clone(),
        event_sender.clone(),
        gateway,
        config.clone(),
    );

    Arc::new(AppState {
        db,
        config,
        services,
        event_sender,
    })
}

/// Builds the full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    let cart_routes = Router::new()
        .route(
            "/",
            get(handlers::cart::get_cart)
                .post(handlers::cart::add_item)
                .delete(handlers::cart::clear_cart),
        )
        .route(
            "/{product_id}",
            put(handlers::cart::set_quantity).delete(handlers::cart::remove_item),
        )
        .route(
            "/{product_id}/increment",
            patch(handlers::cart::increment_item),
        )
        .route(
            "/{product_id}/decrement",
            patch(handlers::cart::decrement_item),
        );

    let order_routes = Router::new()
        .route("/checkout", post(handlers::orders::checkout))
        .route("/", get(handlers::orders::list_orders))
        .route("/admin", get(handlers::orders::admin_list_orders))
        .route("/admin/{id}", get(handlers::orders::admin_get_order))
        .route("/{id}", get(handlers::orders::get_order));

    let payment_routes = Router::new()
        .route("/checkout", post(handlers::payments::create_checkout_session))
        .route("/webhook", post(handlers::payments::payment_webhook))
        .route("/success", get(handlers::payments::payment_success))
        .route("/cancel", get(handlers::payments::payment_cancel));

    let api = Router::new()
        .nest("/cart", cart_routes)
        .nest("/orders", order_routes)
        .nest("/payments", payment_routes);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
