//! Database connection pool and the order store capability consumed by the
//! statistics pipeline.
//!
//! [`OrderStore`] is the only way the aggregation engine and the cache layer
//! read data. [`postgres::PgStore`] runs grouped SQL against PostgreSQL;
//! `memory::MemoryStore`, built for tests and the `test-util` feature,
//! answers the same questions from in-process rows.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::order::OrderStatus;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Failure of the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Raised by stores that are not backed by a pool.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Tables whose churn drives cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Orders,
    OrderItems,
    Users,
    Products,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::OrderItems => "order_items",
            Table::Users => "users",
            Table::Products => "products",
        }
    }
}

/// Cardinality and recency of one table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TableSignal {
    pub row_count: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Delivered vs not delivered, where delivered = flag OR status.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct DeliverySplitRow {
    pub delivered: i64,
    pub not_delivered: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct SummaryRow {
    pub total: i64,
    pub delivered: i64,
    pub pending_delivery: i64,
}

/// One line item of a delivered order (full-load path).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DeliveredItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub order_created_at: DateTime<Utc>,
}

/// Summed quantity of one product over delivered orders (grouped path).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProductQuantity {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub first_seen: DateTime<Utc>,
}

/// A delivered order joined with its owner (full-load path).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DeliveredOrder {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub unite: Option<String>,
    pub administration: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivered-order count for one administration label (grouped path).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AdministrationCount {
    pub administration: String,
    pub count: i64,
    pub first_seen: DateTime<Utc>,
}

/// Delivered-order count for one user (grouped path).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserDeliveryCount {
    pub user_id: Uuid,
    pub user_name: String,
    pub unite: Option<String>,
    pub count: i64,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Read capability over orders, users, and products.
///
/// Every "delivered" predicate is `delivered = true OR status = 'delivered'`.
pub trait OrderStore: Send + Sync {
    fn table_signal(
        &self,
        table: Table,
    ) -> impl Future<Output = Result<TableSignal, StoreError>> + Send;

    fn status_counts(&self) -> impl Future<Output = Result<Vec<StatusCount>, StoreError>> + Send;

    fn delivery_split(&self) -> impl Future<Output = Result<DeliverySplitRow, StoreError>> + Send;

    fn summary_counts(&self) -> impl Future<Output = Result<SummaryRow, StoreError>> + Send;

    fn count_delivered_orders(&self) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn count_products(&self) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Line items of every delivered order, oldest order first.
    fn delivered_items(
        &self,
    ) -> impl Future<Output = Result<Vec<DeliveredItem>, StoreError>> + Send;

    /// Distinct product ids appearing in delivered orders, ascending.
    fn delivered_product_ids(&self)
        -> impl Future<Output = Result<Vec<Uuid>, StoreError>> + Send;

    /// Quantity summed per product over delivered orders, restricted to
    /// `product_ids` when given.
    fn product_quantities(
        &self,
        product_ids: Option<&[Uuid]>,
    ) -> impl Future<Output = Result<Vec<ProductQuantity>, StoreError>> + Send;

    /// Delivered orders with their owners, oldest first.
    fn delivered_orders(
        &self,
    ) -> impl Future<Output = Result<Vec<DeliveredOrder>, StoreError>> + Send;

    /// Delivered-order counts per trimmed, non-empty administration.
    fn administration_counts(
        &self,
    ) -> impl Future<Output = Result<Vec<AdministrationCount>, StoreError>> + Send;

    fn user_delivery_counts(
        &self,
    ) -> impl Future<Output = Result<Vec<UserDeliveryCount>, StoreError>> + Send;

    /// Orders created per UTC calendar day in `[from, to]`. Days without
    /// orders are absent.
    fn orders_per_day(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<Vec<DayCount>, StoreError>> + Send;
}
