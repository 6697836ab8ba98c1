use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, events::EventSender, gateway::PaymentGateway};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use payments::PaymentService;

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            cart: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            orders: Arc::new(OrderService::new(db.clone())),
            payments: Arc::new(PaymentService::new(db, event_sender, gateway, config)),
        }
    }
}
