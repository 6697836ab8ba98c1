use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog,
};

/// Per-user cart store. Every user has at most one cart (enforced by a unique
/// index on `user_id`); a user with no cart row is indistinguishable from a
/// user with an empty cart.
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

/// A cart line joined with its product, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: ProductModel,
}

/// Full cart view. `id` is `None` for users that have never added anything.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Option<Uuid>,
    pub user_id: i64,
    pub items: Vec<CartLine>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart with product details, or an empty view if the
    /// user has no cart yet.
    pub async fn get_cart(&self, user_id: i64) -> Result<CartView, ServiceError> {
        let Some(cart) = find_cart(self.db.as_ref(), user_id).await? else {
            return Ok(CartView {
                id: None,
                user_id,
                items: Vec::new(),
            });
        };

        let lines = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(crate::entities::Product)
            .all(self.db.as_ref())
            .await?;

        let items = lines
            .into_iter()
            .filter_map(|(line, product)| {
                product.map(|product| CartLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product,
                })
            })
            .collect();

        Ok(CartView {
            id: Some(cart.id),
            user_id,
            items,
        })
    }

    /// Adds `quantity` units of a product to the user's cart, creating the
    /// cart on first use and merging into an existing line for the same
    /// product. The requested quantity is validated against current stock;
    /// nothing is reserved until checkout.
    #[instrument(skip(self), fields(user_id = user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: i64,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = catalog::load_active_product(&txn, product_id).await?;
        if product.stock < quantity {
            return Err(ServiceError::InsufficientStock(product_id));
        }

        let cart = find_or_create_cart(&txn, user_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let line = match existing {
            Some(line) => {
                let merged = line.quantity + quantity;
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?
            }
            None => {
                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;
        info!(quantity = line.quantity, "cart line upserted");

        Ok(line)
    }

    /// Replaces the quantity of an existing line. Fails with `LineNotFound`
    /// when the user has no cart or no line for this product.
    pub async fn set_quantity(
        &self,
        user_id: i64,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let line = find_line(&txn, user_id, product_id)
            .await?
            .ok_or(ServiceError::LineNotFound(product_id))?;

        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let line = active.update(&txn).await?;

        txn.commit().await?;
        Ok(line)
    }

    /// Adds one unit of the product, with the same merge and stock rules as
    /// [`CartService::add_item`].
    pub async fn increment(
        &self,
        user_id: i64,
        product_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        self.add_item(user_id, product_id, 1).await
    }

    /// Removes one unit of the product. A line whose quantity would drop to
    /// zero is deleted; returns `None` in that case.
    pub async fn decrement(
        &self,
        user_id: i64,
        product_id: Uuid,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        let txn = self.db.begin().await?;

        let line = find_line(&txn, user_id, product_id)
            .await?
            .ok_or(ServiceError::LineNotFound(product_id))?;

        let result = if line.quantity <= 1 {
            line.delete(&txn).await?;
            None
        } else {
            let remaining = line.quantity - 1;
            let mut active: cart_item::ActiveModel = line.into();
            active.quantity = Set(remaining);
            active.updated_at = Set(Utc::now());
            Some(active.update(&txn).await?)
        };

        txn.commit().await?;
        Ok(result)
    }

    /// Deletes a product's line if present. Removing a line that does not
    /// exist is a no-op.
    pub async fn remove_item(&self, user_id: i64, product_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = find_cart(self.db.as_ref(), user_id).await? else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Empties the user's cart. Always succeeds, including for users with no
    /// cart.
    pub async fn clear(&self, user_id: i64) -> Result<(), ServiceError> {
        let Some(cart) = find_cart(self.db.as_ref(), user_id).await? else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(self.db.as_ref())
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        Ok(())
    }
}

pub(crate) async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> Result<Option<CartModel>, ServiceError> {
    Ok(Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

pub(crate) async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> Result<CartModel, ServiceError> {
    if let Some(cart) = find_cart(conn, user_id).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok(cart)
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
    product_id: Uuid,
) -> Result<Option<CartItemModel>, ServiceError> {
    let Some(cart) = find_cart(conn, user_id).await? else {
        return Ok(None);
    };

    Ok(CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}
