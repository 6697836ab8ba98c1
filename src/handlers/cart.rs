use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    entities::CartItemModel,
    errors::ServiceError,
    services::cart::CartView,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// GET /api/v1/cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<CartView>, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(Json(cart))
}

/// POST /api/v1/cart
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItemModel>), ServiceError> {
    payload.validate()?;
    let line = state
        .services
        .cart
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PUT /api/v1/cart/{product_id}
pub async fn set_quantity(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<Json<CartItemModel>, ServiceError> {
    payload.validate()?;
    let line = state
        .services
        .cart
        .set_quantity(user.user_id, product_id, payload.quantity)
        .await?;
    Ok(Json(line))
}

/// PATCH /api/v1/cart/{product_id}/increment
pub async fn increment_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartItemModel>, ServiceError> {
    let line = state
        .services
        .cart
        .increment(user.user_id, product_id)
        .await?;
    Ok(Json(line))
}

/// PATCH /api/v1/cart/{product_id}/decrement
///
/// Responds with the updated line, or `null` when the last unit was removed
/// and the line deleted.
pub async fn decrement_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Option<CartItemModel>>, ServiceError> {
    let line = state
        .services
        .cart
        .decrement(user.user_id, product_id)
        .await?;
    Ok(Json(line))
}

/// DELETE /api/v1/cart/{product_id}
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .cart
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/cart
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.clear(user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
