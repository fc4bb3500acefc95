//! Inventory ledger: the only code allowed to write `products.stock`.
//!
//! Both primitives are generic over [`ConnectionTrait`] so they compose into
//! the caller's transaction; the order service runs them inside the same
//! atomic unit as the order rows.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;

use crate::entities::product;
use crate::errors::ServiceError;

/// Decrements stock by `quantity`, failing when fewer units are available.
///
/// The check and the write are one conditional UPDATE, so two concurrent
/// reservations can never both pass a check that only one can satisfy.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "reservation quantity must be at least 1".to_string(),
        ));
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Distinguish an unknown product from an exhausted one.
        return match product::Entity::find_by_id(product_id).one(conn).await? {
            None => Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            ))),
            Some(p) => {
                warn!(
                    product_id,
                    available = p.stock,
                    requested = quantity,
                    "reservation rejected"
                );
                Err(ServiceError::InsufficientStock(format!(
                    "'{}' has {} unit(s) left, {} requested",
                    p.name, p.stock, quantity
                )))
            }
        };
    }

    Ok(())
}

/// Increments stock by `quantity`, unconditionally. A released quantity always
/// returns to stock; only an unknown product id is an error.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::ValidationError(
            "release quantity must be at least 1".to_string(),
        ));
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "Product {} not found",
            product_id
        )));
    }

    Ok(())
}
