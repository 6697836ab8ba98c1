//! Read-only catalog access plus the one mutation this service is allowed to
//! make: the atomic conditional stock decrement.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entities::{product, Product, ProductModel},
    errors::ServiceError,
};

/// Loads a product regardless of its active flag.
pub async fn load_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Option<ProductModel>, ServiceError> {
    Ok(Product::find_by_id(product_id).one(conn).await?)
}

/// Loads a product that exists and is active, or fails with
/// `ProductUnavailable`.
pub async fn load_active_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<ProductModel, ServiceError> {
    Product::find_by_id(product_id)
        .filter(product::Column::Active.eq(true))
        .one(conn)
        .await?
        .ok_or(ServiceError::ProductUnavailable(product_id))
}

/// Atomically decrements stock, guarded against going negative:
/// `UPDATE products SET stock = stock - q WHERE id = ? AND stock >= q`.
///
/// Returns whether the decrement applied. Zero rows affected means the
/// remaining stock is insufficient; the caller decides whether that fails the
/// operation (checkout) or clamps (payment reconciliation). A plain
/// read-check-write here would race with concurrent checkouts for the last
/// unit, so the stock predicate lives in the UPDATE itself.
pub async fn try_decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Drains the remaining stock to zero. Used when a confirmed payment covers
/// more units than are left: the payment is authoritative, so the oversell is
/// logged upstream instead of rejected.
pub async fn drain_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<(), ServiceError> {
    Product::update_many()
        .col_expr(product::Column::Stock, Expr::value(0))
        .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}
