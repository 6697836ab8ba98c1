use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    entities::OrderStatus,
    errors::ServiceError,
    services::orders::{OrderListFilter, OrderWithItems, PaginatedOrders},
    AppState,
};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListOrdersQuery {
    #[validate(range(min = 1))]
    pub page: Option<u64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AdminListOrdersQuery {
    #[validate(range(min = 1))]
    pub page: Option<u64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
    pub user_id: Option<i64>,
}

/// POST /api/v1/orders/checkout
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<OrderWithItems>), ServiceError> {
    let order = state.services.checkout.checkout(user.user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<PaginatedOrders>, ServiceError> {
    query.validate()?;
    let page = state
        .services
        .orders
        .list(OrderListFilter {
            user_id: Some(user.user_id),
            status: query.status,
            page: query.page,
            limit: query.limit,
        })
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/orders/{id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    let order = state
        .services
        .orders
        .get_for_user(user.user_id, order_id)
        .await?;
    Ok(Json(order))
}

/// GET /api/v1/orders/admin
pub async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<AdminListOrdersQuery>,
) -> Result<Json<PaginatedOrders>, ServiceError> {
    user.require_admin()?;
    query.validate()?;
    let page = state
        .services
        .orders
        .list(OrderListFilter {
            user_id: query.user_id,
            status: query.status,
            page: query.page,
            limit: query.limit,
        })
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/orders/admin/{id}
pub async fn admin_get_order(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    user.require_admin()?;
    let order = state.services.orders.get(order_id).await?;
    Ok(Json(order))
}
