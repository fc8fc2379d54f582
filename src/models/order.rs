//! Order, line item, and order history models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
    Delivered,
}

impl OrderStatus {
    /// All statuses in dashboard display order.
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::Rejected,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Delivered => "delivered",
        }
    }
}

/// Full order row.
///
/// `delivered` and `status` are written separately and can disagree; readers
/// treat an order as delivered when either says so (see [`Order::is_delivered`]).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_delivered(&self) -> bool {
        self.delivered || self.status == OrderStatus::Delivered
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Audit trail entry for an order status change.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: String,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request body for an order status change.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateOrderStatus {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, delivered: bool) -> Order {
        Order {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            status,
            delivered,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn order_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
        let parsed: OrderStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, OrderStatus::Pending);
    }

    #[test]
    fn delivered_flag_or_status_counts_as_delivered() {
        assert!(order(OrderStatus::Delivered, false).is_delivered());
        assert!(order(OrderStatus::Approved, true).is_delivered());
        assert!(!order(OrderStatus::Approved, false).is_delivered());
    }

    #[test]
    fn status_note_length_is_validated() {
        let ok = UpdateOrderStatus {
            status: OrderStatus::Approved,
            note: Some("looks good".to_string()),
        };
        assert!(ok.validate().is_ok());

        let too_long = UpdateOrderStatus {
            status: OrderStatus::Approved,
            note: Some("x".repeat(501)),
        };
        assert!(too_long.validate().is_err());
    }
}
