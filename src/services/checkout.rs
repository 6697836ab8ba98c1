use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{cart_item, order, order_item, CartItem, OrderStatus, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::find_cart, catalog, orders::OrderWithItems},
};

/// Immediate checkout: converts a cart into a PENDING order and decrements
/// stock in the same transaction. No payment session is involved; this is the
/// path for flows that settle out of band.
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Converts the user's cart into an order.
    ///
    /// All of it happens in one transaction: validate lines, snapshot prices
    /// into order items, conditionally decrement stock per line, empty the
    /// cart. Any line failing its stock predicate rolls the whole thing back,
    /// so two concurrent checkouts can never both claim the last unit.
    #[instrument(skip(self), fields(user_id = user_id))]
    pub async fn checkout(&self, user_id: i64) -> Result<OrderWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = find_cart(&txn, user_id)
            .await?
            .ok_or(ServiceError::CartEmpty)?;

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&txn)
            .await?;
        if lines.is_empty() {
            return Err(ServiceError::CartEmpty);
        }

        // Pre-validate so the common failure modes produce a precise error
        // before any row is touched. The decrement below remains the
        // authoritative stock check.
        let mut total = Decimal::ZERO;
        let mut validated = Vec::with_capacity(lines.len());
        for (line, product) in lines {
            let product = match product {
                Some(p) if p.active => p,
                _ => return Err(ServiceError::ProductUnavailable(line.product_id)),
            };
            if product.stock < line.quantity {
                return Err(ServiceError::InsufficientStock(line.product_id));
            }
            total += product.price * Decimal::from(line.quantity);
            validated.push((line, product));
        }

        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            currency: Set(self.config.default_currency.clone()),
            payment_ref: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(validated.len());
        let mut depleted = Vec::new();
        for (line, product) in validated {
            let item = order_item::ActiveModel {
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
            items.push(item);

            // Dropping the transaction without commit rolls back the order
            // and every decrement made so far.
            if !catalog::try_decrement_stock(&txn, product.id, line.quantity).await? {
                return Err(ServiceError::InsufficientStock(product.id));
            }
            if product.stock == line.quantity {
                depleted.push(product.id);
            }
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        for product_id in depleted {
            self.event_sender
                .send_or_log(Event::StockDepleted { product_id })
                .await;
        }
        info!(order_id = %order.id, total = %order.total_amount, "checkout completed");

        Ok(OrderWithItems { order, items })
    }
}
