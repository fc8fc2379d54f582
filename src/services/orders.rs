//! Order lifecycle transitions.
//!
//! Status changes follow a fixed graph and are written together with their
//! history row in one transaction. Callers invalidate dashboard statistics
//! only after [`transition`] has returned, i.e. after commit.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::order::OrderStatus;

/// Result of a committed transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    pub order_id: Uuid,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub delivered: bool,
}

/// Allowed edges: pending → approved | rejected, approved → delivered,
/// rejected → pending.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Approved)
            | (OrderStatus::Pending, OrderStatus::Rejected)
            | (OrderStatus::Approved, OrderStatus::Delivered)
            | (OrderStatus::Rejected, OrderStatus::Pending)
    )
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), AppError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

fn history_action(to: OrderStatus) -> &'static str {
    match to {
        OrderStatus::Delivered => "delivered",
        _ => "status_change",
    }
}

#[derive(Debug, FromRow)]
struct CurrentOrder {
    status: OrderStatus,
    delivered: bool,
}

/// Move an order to `to`, recording the change in `order_history`.
///
/// Delivering sets both `status` and the `delivered` flag.
pub async fn transition(
    pool: &PgPool,
    order_id: Uuid,
    to: OrderStatus,
    actor_id: Uuid,
    note: Option<&str>,
) -> Result<TransitionResult, AppError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, CurrentOrder>(
        "SELECT status, delivered FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::OrderNotFound(order_id))?;

    validate_transition(current.status, to)?;

    let delivered = current.delivered || to == OrderStatus::Delivered;
    sqlx::query("UPDATE orders SET status = $1, delivered = $2, updated_at = NOW() WHERE id = $3")
        .bind(to)
        .bind(delivered)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO order_history (order_id, action, old_status, new_status, actor_id, note)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(order_id)
    .bind(history_action(to))
    .bind(current.status)
    .bind(to)
    .bind(actor_id)
    .bind(note)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        order_id = %order_id,
        from = current.status.as_str(),
        to = to.as_str(),
        actor_id = %actor_id,
        "Order status changed"
    );

    Ok(TransitionResult {
        order_id,
        previous_status: current.status,
        new_status: to,
        delivered,
    })
}

/// Mark an approved order delivered.
pub async fn deliver(
    pool: &PgPool,
    order_id: Uuid,
    actor_id: Uuid,
) -> Result<TransitionResult, AppError> {
    transition(pool, order_id, OrderStatus::Delivered, actor_id, None).await
}
