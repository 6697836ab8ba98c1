use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the services. Consumed by a background logger
/// task; delivery is best-effort and never blocks a request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderPaymentFailed(Uuid),

    // Cart events
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Inventory events
    StockDepleted { product_id: Uuid },
    Oversold { product_id: Uuid, order_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Sends an event, logging instead of failing if the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(?event, "Failed to publish event: {e}");
        }
    }
}

/// Background task draining the event channel. Runs for the lifetime of the
/// process; exits when all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => info!(%order_id, "order created"),
            Event::OrderPaid(order_id) => info!(%order_id, "order paid"),
            Event::OrderPaymentFailed(order_id) => info!(%order_id, "order payment failed"),
            Event::CartItemAdded {
                cart_id,
                product_id,
            } => info!(%cart_id, %product_id, "cart item added"),
            Event::CartCleared(cart_id) => info!(%cart_id, "cart cleared"),
            Event::StockDepleted { product_id } => info!(%product_id, "stock depleted"),
            Event::Oversold {
                product_id,
                order_id,
            } => warn!(%product_id, %order_id, "stock oversold on payment confirmation"),
        }
    }
}
