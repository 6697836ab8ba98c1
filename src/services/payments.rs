use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{cart_item, order, order_item, CartItem, Order, OrderItem, OrderStatus, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{
        webhook::{EVENT_PAYMENT_COMPLETED, EVENT_PAYMENT_FAILED},
        to_minor_units, CreateSessionRequest, PaymentGateway, SessionLineItem, WebhookEvent,
    },
    services::cart::find_cart,
    services::catalog,
};

/// Deferred checkout and webhook reconciliation.
///
/// Session creation records intent (REQUIRES_PAYMENT_METHOD) without touching
/// stock or the cart; the webhook reconciler later settles the order to PAID
/// or FAILED and performs the inventory side effects.
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<AppConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionResponse {
    pub order_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            config,
        }
    }

    /// Creates a hosted payment session for the user's cart.
    ///
    /// The order is committed in REQUIRES_PAYMENT_METHOD before the gateway
    /// call, so a gateway failure leaves a retriable order behind rather than
    /// a paid-for order that was never recorded. Stock and the cart are left
    /// untouched; abandonment costs nothing.
    #[instrument(skip(self), fields(user_id = user_id))]
    pub async fn create_checkout_session(
        &self,
        user_id: i64,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        let cart = find_cart(self.db.as_ref(), user_id)
            .await?
            .ok_or(ServiceError::CartEmpty)?;
        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(self.db.as_ref())
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        let currency = self.config.default_currency.clone();
        let mut total = rust_decimal::Decimal::ZERO;
        let mut session_items = Vec::with_capacity(lines.len());
        let mut snapshots = Vec::with_capacity(lines.len());
        for (line, product) in lines {
            let product = match product {
                Some(p) if p.active => p,
                _ => return Err(ServiceError::ProductUnavailable(line.product_id)),
            };
            // Only "any stock left" here; quantity sufficiency is settled at
            // confirmation time, when the decrement actually happens.
            if product.stock <= 0 {
                return Err(ServiceError::OutOfStock(product.id));
            }

            total += product.price * rust_decimal::Decimal::from(line.quantity);
            session_items.push(SessionLineItem {
                name: product.title.clone(),
                quantity: line.quantity,
                unit_amount: to_minor_units(&currency, product.price)?,
                currency: currency.clone(),
                product_id: product.id,
                image_url: product.image_url.clone(),
            });
            snapshots.push((line, product));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            status: Set(OrderStatus::RequiresPaymentMethod),
            total_amount: Set(total),
            currency: Set(currency),
            payment_ref: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        for (line, product) in &snapshots {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                title: Set(product.title.clone()),
                unit_price: Set(product.price),
                quantity: Set(line.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        let session = self
            .gateway
            .create_session(CreateSessionRequest {
                line_items: session_items,
                success_url: format!(
                    "{}/checkout/success?orderId={}",
                    self.config.frontend_url, order.id
                ),
                cancel_url: format!(
                    "{}/checkout/cancel?orderId={}",
                    self.config.frontend_url, order.id
                ),
                order_id: order.id,
                user_id,
            })
            .await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        info!(order_id = %order.id, session_id = %session.id, "payment session created");

        Ok(CheckoutSessionResponse {
            order_id: order.id,
            session_id: session.id,
            checkout_url: session.url,
        })
    }

    /// Applies one decoded webhook delivery. Unknown event types and events
    /// without usable metadata are accepted as no-ops so the provider stops
    /// retrying them.
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        match event.event_type.as_str() {
            EVENT_PAYMENT_COMPLETED => self.complete_payment(event).await,
            EVENT_PAYMENT_FAILED => self.fail_payment(event).await,
            other => {
                debug!(event_type = other, "ignoring unhandled webhook event");
                Ok(())
            }
        }
    }

    /// Settles an order to PAID, decrements stock from the order's immutable
    /// snapshots and empties the buyer's cart, all in one transaction.
    ///
    /// Idempotency rides on the conditional UPDATE: the first delivery to win
    /// the row moves it to PAID, every replay matches zero rows and
    /// short-circuits before any inventory work. PAID applies from any other
    /// status, so a completion arriving after an early failure still lands.
    async fn complete_payment(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        let Some(order_id) = event.order_id else {
            warn!("payment completion without order metadata, ignoring");
            return Ok(());
        };

        let txn = self.db.begin().await?;

        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.ne(OrderStatus::Paid));
        if let Some(payment_ref) = &event.payment_ref {
            update = update.col_expr(
                order::Column::PaymentRef,
                Expr::value(payment_ref.clone()),
            );
        }
        if update.exec(&txn).await?.rows_affected == 0 {
            info!(%order_id, "order already paid or unknown, skipping");
            return Ok(());
        }

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id}")))?;

        // Decrement from the snapshots, not the live cart. A shortfall means
        // someone checked out the same units since the session was created;
        // the confirmed payment wins and stock is clamped at zero.
        let mut oversold = Vec::new();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in items {
            if !catalog::try_decrement_stock(&txn, item.product_id, item.quantity).await? {
                catalog::drain_stock(&txn, item.product_id).await?;
                oversold.push(item.product_id);
            }
        }

        if let Some(cart) = find_cart(&txn, order.user_id).await? {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        for product_id in oversold {
            warn!(%product_id, %order_id, "confirmed payment exceeded remaining stock");
            self.event_sender
                .send_or_log(Event::Oversold {
                    product_id,
                    order_id,
                })
                .await;
        }
        info!(%order_id, "order reconciled to PAID");

        Ok(())
    }

    /// Marks an order FAILED unless it has already been paid. A failure
    /// arriving after a completion is a stale signal and must not regress the
    /// order, hence the status guard in the UPDATE itself.
    async fn fail_payment(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        let Some(order_id) = event.order_id else {
            warn!("payment failure without order metadata, ignoring");
            return Ok(());
        };

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Failed))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.ne(OrderStatus::Paid))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::OrderPaymentFailed(order_id))
                .await;
            info!(%order_id, "order marked FAILED");
        } else {
            info!(%order_id, "failure event for paid or unknown order, skipping");
        }

        Ok(())
    }
}
