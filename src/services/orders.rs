use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    entities::{order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus},
    errors::ServiceError,
};

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// An order with its immutable line snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// One page of orders, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedOrders {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
    pub items: Vec<OrderWithItems>,
}

/// Listing filter. `user_id: None` is the admin view across all users.
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub user_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Read side of the order ledger.
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists orders newest first, with their items, one page at a time.
    /// Page numbers are 1-based; out-of-range pages return an empty page with
    /// accurate totals.
    pub async fn list(&self, filter: OrderListFilter) -> Result<PaginatedOrders, ServiceError> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let items = self.load_items(&orders).await?;

        Ok(PaginatedOrders {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
            items,
        })
    }

    /// Fetches a single order, scoped to its owner.
    pub async fn get_for_user(
        &self,
        user_id: i64,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id}")))?;

        self.with_items(order).await
    }

    /// Fetches a single order without ownership scoping. Admin only.
    pub async fn get(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id}")))?;

        self.with_items(order).await
    }

    async fn with_items(&self, order: OrderModel) -> Result<OrderWithItems, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await?;
        Ok(OrderWithItems { order, items })
    }

    /// Hydrates a page of orders with their items in one query.
    async fn load_items(
        &self,
        orders: &[OrderModel],
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        for item in OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .all(self.db.as_ref())
            .await?
        {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .iter()
            .map(|o| OrderWithItems {
                order: o.clone(),
                items: by_order.remove(&o.id).unwrap_or_default(),
            })
            .collect())
    }
}
