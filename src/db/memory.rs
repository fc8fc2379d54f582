//! In-process [`OrderStore`] over plain vectors.
//!
//! Answers every query the way the SQL in `postgres.rs` does, including the
//! `delivered OR status = 'delivered'` predicate, and records which queries
//! were issued so callers can observe the aggregation plan.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use super::{
    AdministrationCount, DayCount, DeliveredItem, DeliveredOrder, DeliverySplitRow, OrderStore,
    ProductQuantity, StatusCount, StoreError, SummaryRow, Table, TableSignal, UserDeliveryCount,
};
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::models::product::Product;
use crate::models::user::{User, UserRole};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    products: Vec<Product>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    last_write: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing write timestamp so every mutation moves `MAX(updated_at)`.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_write {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        self.last_write = Some(ts);
        ts
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn product(&self, id: Uuid) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Delivered orders sorted oldest first, ties in insertion order.
    fn delivered_orders(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.iter().filter(|o| o.is_delivered()).collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: Mutex<Option<String>>,
    queries: Mutex<Vec<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, name: &str, administration: Option<&str>) -> Uuid {
        let mut tables = self.write();
        let ts = tables.next_timestamp();
        let id = Uuid::new_v4();
        tables.users.push(User {
            id,
            name: name.to_string(),
            email: format!("{id}@storefront.test"),
            matricule: None,
            administration: administration.map(str::to_string),
            unite: None,
            role: UserRole::User,
            is_approved: true,
            created_at: ts,
            updated_at: ts,
        });
        id
    }

    pub fn set_unite(&self, user_id: Uuid, unite: &str) {
        let mut tables = self.write();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.unite = Some(unite.to_string());
        }
    }

    /// Rename a user's administration, bumping `updated_at`.
    pub fn set_administration(&self, user_id: Uuid, administration: Option<&str>) {
        let mut tables = self.write();
        let ts = tables.next_timestamp();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.administration = administration.map(str::to_string);
            user.updated_at = ts;
        }
    }

    pub fn add_product(&self, name: &str) -> Uuid {
        let mut tables = self.write();
        let ts = tables.next_timestamp();
        let id = Uuid::new_v4();
        tables.products.push(Product {
            id,
            name: name.to_string(),
            created_at: ts,
            updated_at: ts,
        });
        id
    }

    /// Insert an order created at `created_at` with `(product_id, quantity)` lines.
    pub fn add_order(
        &self,
        user_id: Uuid,
        status: OrderStatus,
        delivered: bool,
        created_at: DateTime<Utc>,
        items: &[(Uuid, i32)],
    ) -> Uuid {
        let mut tables = self.write();
        let ts = tables.next_timestamp();
        let id = Uuid::new_v4();
        tables.orders.push(Order {
            id,
            user_id,
            status,
            delivered,
            created_at,
            updated_at: ts,
        });
        for (product_id, quantity) in items {
            tables.items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: *product_id,
                quantity: *quantity,
            });
        }
        id
    }

    /// Mark an order delivered the way the lifecycle service does: both fields.
    pub fn mark_delivered(&self, order_id: Uuid) {
        let mut tables = self.write();
        let ts = tables.next_timestamp();
        if let Some(order) = tables.orders.iter_mut().find(|o| o.id == order_id) {
            order.status = OrderStatus::Delivered;
            order.delivered = true;
            order.updated_at = ts;
        }
    }

    /// Make every subsequent query fail with `reason`, or recover with `None`.
    pub fn set_failing(&self, reason: Option<&str>) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = reason.map(str::to_string);
        }
    }

    /// Names of the queries issued so far, in order.
    pub fn queries(&self) -> Vec<&'static str> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn clear_queries(&self) {
        if let Ok(mut queries) = self.queries.lock() {
            queries.clear();
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the query and run `f` against a read snapshot of the tables.
    fn read<T>(&self, query: &'static str, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query);
        }
        if let Some(reason) = self.failing.lock().ok().and_then(|f| f.clone()) {
            return Err(StoreError::Unavailable(reason));
        }
        let tables = self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&tables))
    }
}

fn signal(timestamps: impl Iterator<Item = DateTime<Utc>>, count: usize) -> TableSignal {
    TableSignal {
        row_count: count as i64,
        last_modified: timestamps.max(),
    }
}

impl OrderStore for MemoryStore {
    async fn table_signal(&self, table: Table) -> Result<TableSignal, StoreError> {
        self.read("table_signal", |t| match table {
            Table::Orders => signal(t.orders.iter().map(|o| o.updated_at), t.orders.len()),
            Table::Users => signal(t.users.iter().map(|u| u.updated_at), t.users.len()),
            Table::Products => signal(t.products.iter().map(|p| p.updated_at), t.products.len()),
            Table::OrderItems => signal(std::iter::empty(), t.items.len()),
        })
    }

    async fn status_counts(&self) -> Result<Vec<StatusCount>, StoreError> {
        self.read("status_counts", |t| {
            let mut counts: Vec<StatusCount> = Vec::new();
            for order in &t.orders {
                match counts.iter_mut().find(|c| c.status == order.status) {
                    Some(c) => c.count += 1,
                    None => counts.push(StatusCount {
                        status: order.status,
                        count: 1,
                    }),
                }
            }
            counts
        })
    }

    async fn delivery_split(&self) -> Result<DeliverySplitRow, StoreError> {
        self.read("delivery_split", |t| {
            let delivered = t.orders.iter().filter(|o| o.is_delivered()).count() as i64;
            DeliverySplitRow {
                delivered,
                not_delivered: t.orders.len() as i64 - delivered,
            }
        })
    }

    async fn summary_counts(&self) -> Result<SummaryRow, StoreError> {
        self.read("summary_counts", |t| SummaryRow {
            total: t.orders.len() as i64,
            delivered: t.orders.iter().filter(|o| o.is_delivered()).count() as i64,
            pending_delivery: t
                .orders
                .iter()
                .filter(|o| !o.is_delivered() && o.status != OrderStatus::Rejected)
                .count() as i64,
        })
    }

    async fn count_delivered_orders(&self) -> Result<i64, StoreError> {
        self.read("count_delivered_orders", |t| {
            t.orders.iter().filter(|o| o.is_delivered()).count() as i64
        })
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        self.read("count_products", |t| t.products.len() as i64)
    }

    async fn delivered_items(&self) -> Result<Vec<DeliveredItem>, StoreError> {
        self.read("delivered_items", |t| {
            t.delivered_orders()
                .into_iter()
                .flat_map(|order| {
                    t.items
                        .iter()
                        .filter(move |item| item.order_id == order.id)
                        .filter_map(move |item| {
                            t.product(item.product_id).map(|product| DeliveredItem {
                                product_id: product.id,
                                product_name: product.name.clone(),
                                quantity: i64::from(item.quantity),
                                order_created_at: order.created_at,
                            })
                        })
                })
                .collect()
        })
    }

    async fn delivered_product_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        self.read("delivered_product_ids", |t| {
            let mut ids: Vec<Uuid> = t
                .delivered_orders()
                .into_iter()
                .flat_map(|order| {
                    t.items
                        .iter()
                        .filter(move |item| item.order_id == order.id)
                        .map(|item| item.product_id)
                })
                .collect();
            ids.sort();
            ids.dedup();
            ids
        })
    }

    async fn product_quantities(
        &self,
        product_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ProductQuantity>, StoreError> {
        self.read("product_quantities", |t| {
            let mut grouped: HashMap<Uuid, ProductQuantity> = HashMap::new();
            for order in t.delivered_orders() {
                for item in t.items.iter().filter(|i| i.order_id == order.id) {
                    if product_ids.is_some_and(|ids| !ids.contains(&item.product_id)) {
                        continue;
                    }
                    let Some(product) = t.product(item.product_id) else {
                        continue;
                    };
                    let entry = grouped.entry(product.id).or_insert_with(|| ProductQuantity {
                        product_id: product.id,
                        product_name: product.name.clone(),
                        quantity: 0,
                        first_seen: order.created_at,
                    });
                    entry.quantity += i64::from(item.quantity);
                    entry.first_seen = entry.first_seen.min(order.created_at);
                }
            }
            // GROUP BY without ORDER BY: row order is unspecified.
            grouped.into_values().collect()
        })
    }

    async fn delivered_orders(&self) -> Result<Vec<DeliveredOrder>, StoreError> {
        self.read("delivered_orders", |t| {
            t.delivered_orders()
                .into_iter()
                .filter_map(|order| {
                    t.user(order.user_id).map(|user| DeliveredOrder {
                        order_id: order.id,
                        user_id: user.id,
                        user_name: user.name.clone(),
                        unite: user.unite.clone(),
                        administration: user.administration.clone(),
                        created_at: order.created_at,
                    })
                })
                .collect()
        })
    }

    async fn administration_counts(&self) -> Result<Vec<AdministrationCount>, StoreError> {
        self.read("administration_counts", |t| {
            let mut grouped: HashMap<String, AdministrationCount> = HashMap::new();
            for order in t.delivered_orders() {
                let Some(administration) = t
                    .user(order.user_id)
                    .and_then(|u| u.administration.as_deref())
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                else {
                    continue;
                };
                let entry = grouped
                    .entry(administration.to_string())
                    .or_insert_with(|| AdministrationCount {
                        administration: administration.to_string(),
                        count: 0,
                        first_seen: order.created_at,
                    });
                entry.count += 1;
                entry.first_seen = entry.first_seen.min(order.created_at);
            }
            grouped.into_values().collect()
        })
    }

    async fn user_delivery_counts(&self) -> Result<Vec<UserDeliveryCount>, StoreError> {
        self.read("user_delivery_counts", |t| {
            let mut grouped: HashMap<Uuid, UserDeliveryCount> = HashMap::new();
            for order in t.delivered_orders() {
                let Some(user) = t.user(order.user_id) else {
                    continue;
                };
                let entry = grouped.entry(user.id).or_insert_with(|| UserDeliveryCount {
                    user_id: user.id,
                    user_name: user.name.clone(),
                    unite: user.unite.clone(),
                    count: 0,
                    first_seen: order.created_at,
                });
                entry.count += 1;
                entry.first_seen = entry.first_seen.min(order.created_at);
            }
            grouped.into_values().collect()
        })
    }

    async fn orders_per_day(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayCount>, StoreError> {
        self.read("orders_per_day", |t| {
            let mut days: Vec<DayCount> = Vec::new();
            for order in &t.orders {
                let day = order.created_at.date_naive();
                if day < from || day > to {
                    continue;
                }
                match days.iter_mut().find(|d| d.day == day) {
                    Some(d) => d.count += 1,
                    None => days.push(DayCount { day, count: 1 }),
                }
            }
            days.sort_by_key(|d| d.day);
            days
        })
    }
}
