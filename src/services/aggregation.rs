//! Dashboard statistics aggregation.
//!
//! [`StatsEngine`] turns store queries into [`StatBundle`]s. It never returns
//! an error: a failed query becomes a zero-valued bundle tagged
//! `error_fallback` so the dashboard always has something to draw.
//!
//! Distributions are sorted by count descending; equal counts follow the
//! configured [`TieBreak`], then the label, so repeated runs over unchanged
//! data produce identical bundles.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::{StatsConfig, TieBreak};
use crate::db::{DeliveredItem, DeliveredOrder, OrderStore, StoreError};
use crate::models::order::OrderStatus;
use crate::models::stats::{DashboardSnapshot, DetailRecord, StatBundle, StatName};
use crate::services::sanitizer::{LabelSanitizer, DEFAULT_DEPARTMENTS};

/// How a distribution is computed, chosen from the candidate row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    /// Load the delivered records and fold them in process.
    InMemory,
    /// One grouped query executed by the store.
    Grouped,
    /// Grouped queries over fixed-size batches of product ids.
    Chunked,
}

impl QueryPlan {
    pub fn choose(order_rows: i64, product_rows: i64, config: &StatsConfig) -> Self {
        if product_rows > config.large_product_threshold {
            QueryPlan::Chunked
        } else if order_rows > config.large_order_threshold {
            QueryPlan::Grouped
        } else {
            QueryPlan::InMemory
        }
    }
}

/// One candidate row of a distribution before sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ranked {
    label: String,
    value: i64,
    first_seen: DateTime<Utc>,
}

/// Sort descending by value; ties by policy, then label.
fn rank(mut entries: Vec<Ranked>, tie_break: TieBreak) -> Vec<Ranked> {
    entries.sort_by(|a, b| {
        b.value
            .cmp(&a.value)
            .then_with(|| match tie_break {
                TieBreak::FirstSeen => a.first_seen.cmp(&b.first_seen),
                TieBreak::Alphabetical => Ordering::Equal,
            })
            .then_with(|| a.label.cmp(&b.label))
    });
    entries
}

/// Accumulate `(key, label, at)` occurrences into per-key counts, keeping
/// the earliest timestamp and first-seen order.
struct Tally<K> {
    index: HashMap<K, usize>,
    keys: Vec<K>,
    entries: Vec<Ranked>,
}

impl<K: std::hash::Hash + Eq + Clone> Tally<K> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn add(&mut self, key: K, label: &str, amount: i64, at: DateTime<Utc>) {
        match self.index.get(&key) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                entry.value += amount;
                entry.first_seen = entry.first_seen.min(at);
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.keys.push(key);
                self.entries.push(Ranked {
                    label: label.to_string(),
                    value: amount,
                    first_seen: at,
                });
            }
        }
    }

    fn into_entries(self) -> Vec<Ranked> {
        self.entries
    }

    fn into_keyed(self) -> impl Iterator<Item = (K, Ranked)> {
        self.keys.into_iter().zip(self.entries)
    }
}

fn fold_items(items: Vec<DeliveredItem>) -> Vec<Ranked> {
    let mut tally = Tally::<Uuid>::new();
    for item in &items {
        tally.add(item.product_id, &item.product_name, item.quantity, item.order_created_at);
    }
    tally.into_entries()
}

fn fold_administrations(orders: &[DeliveredOrder]) -> Vec<Ranked> {
    let mut tally = Tally::<String>::new();
    for order in orders {
        let Some(administration) = order
            .administration
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        else {
            continue;
        };
        tally.add(administration.to_string(), administration, 1, order.created_at);
    }
    tally.into_entries()
}

/// One user's count with what tells them apart from a namesake.
struct UserEntry {
    id: Uuid,
    unite: Option<String>,
    ranked: Ranked,
}

fn fold_users(orders: &[DeliveredOrder]) -> Vec<UserEntry> {
    let mut tally = Tally::<Uuid>::new();
    let mut units: HashMap<Uuid, Option<String>> = HashMap::new();
    for order in orders {
        tally.add(order.user_id, &order.user_name, 1, order.created_at);
        units
            .entry(order.user_id)
            .or_insert_with(|| order.unite.clone());
    }
    tally
        .into_keyed()
        .map(|(id, ranked)| UserEntry {
            id,
            unite: units.remove(&id).flatten(),
            ranked,
        })
        .collect()
}

/// Make user labels unique. Namesakes get their unit appended; labels still
/// equal after that get the start of the user id.
fn label_users(mut users: Vec<UserEntry>) -> Vec<Ranked> {
    suffix_collisions(&mut users, |u| {
        u.unite
            .as_deref()
            .map(str::trim)
            .filter(|unite| !unite.is_empty())
            .map(str::to_string)
    });
    suffix_collisions(&mut users, |u| {
        Some(u.id.simple().to_string().chars().take(8).collect())
    });
    users.into_iter().map(|u| u.ranked).collect()
}

fn suffix_collisions(users: &mut [UserEntry], suffix: impl Fn(&UserEntry) -> Option<String>) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for user in users.iter() {
        *seen.entry(user.ranked.label.clone()).or_default() += 1;
    }
    for user in users.iter_mut() {
        if seen.get(&user.ranked.label).is_some_and(|n| *n > 1) {
            if let Some(suffix) = suffix(&*user) {
                user.ranked.label = format!("{} ({suffix})", user.ranked.label);
            }
        }
    }
}

fn split(entries: &[Ranked]) -> (Vec<String>, Vec<i64>) {
    entries.iter().map(|e| (e.label.clone(), e.value)).unzip()
}

/// Calendar days ending at `today`, oldest first.
pub fn trend_days(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..u64::from(days))
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .collect()
}

/// Labels a statistic always carries, independent of the data.
pub fn fixed_labels(stat: StatName, today: NaiveDate, trend_len: u32) -> Vec<String> {
    let labels: Vec<&str> = match stat {
        StatName::OrderStatus => OrderStatus::ALL.iter().map(|s| s.as_str()).collect(),
        StatName::DeliverySplit => vec!["delivered", "not_delivered"],
        StatName::Summary => vec!["total", "delivered", "pending_delivery"],
        StatName::OrderTrend => {
            return trend_days(today, trend_len)
                .into_iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect()
        }
        StatName::TopProducts | StatName::Administrations | StatName::UserDeliveries => vec![],
    };
    labels.into_iter().map(str::to_string).collect()
}

/// Computes dashboard statistics from an [`OrderStore`].
pub struct StatsEngine<'a, S> {
    store: &'a S,
    config: &'a StatsConfig,
    sanitizer: &'a LabelSanitizer,
}

impl<'a, S: OrderStore> StatsEngine<'a, S> {
    pub fn new(store: &'a S, config: &'a StatsConfig, sanitizer: &'a LabelSanitizer) -> Self {
        Self {
            store,
            config,
            sanitizer,
        }
    }

    /// Compute one statistic. `today` anchors the trend window.
    pub async fn compute(&self, stat: StatName, today: NaiveDate) -> StatBundle {
        match stat {
            StatName::OrderStatus => self.order_status_counts().await,
            StatName::DeliverySplit => self.delivery_split().await,
            StatName::TopProducts => self.top_delivered_products().await,
            StatName::Administrations => self.administration_distribution().await,
            StatName::UserDeliveries => self.user_delivery_counts().await,
            StatName::OrderTrend => self.order_trend(today).await,
            StatName::Summary => self.summary().await,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Compute every statistic concurrently, bypassing any cache.
    pub async fn snapshot(&self, today: NaiveDate) -> DashboardSnapshot {
        let (status, split, products, administrations, users, trend, summary) = tokio::join!(
            self.order_status_counts(),
            self.delivery_split(),
            self.top_delivered_products(),
            self.administration_distribution(),
            self.user_delivery_counts(),
            self.order_trend(today),
            self.summary(),
        );
        let bundles: BTreeMap<StatName, StatBundle> =
            [status, split, products, administrations, users, trend, summary]
                .into_iter()
                .map(|bundle| (bundle.name, bundle))
                .collect();
        DashboardSnapshot {
            bundles,
            generated_at: Utc::now(),
            is_cached: false,
        }
    }

    pub async fn order_status_counts(&self) -> StatBundle {
        let result = self.store.status_counts().await.map(|rows| {
            let values = OrderStatus::ALL
                .iter()
                .map(|status| {
                    rows.iter()
                        .filter(|r| r.status == *status)
                        .map(|r| r.count)
                        .sum()
                })
                .collect();
            StatBundle::measured(StatName::OrderStatus, self.labels(StatName::OrderStatus), values)
        });
        self.settle(StatName::OrderStatus, result)
    }

    pub async fn delivery_split(&self) -> StatBundle {
        let result = self.store.delivery_split().await.map(|row| {
            StatBundle::measured(
                StatName::DeliverySplit,
                self.labels(StatName::DeliverySplit),
                vec![row.delivered, row.not_delivered],
            )
        });
        self.settle(StatName::DeliverySplit, result)
    }

    pub async fn summary(&self) -> StatBundle {
        let result = self.store.summary_counts().await.map(|row| {
            StatBundle::measured(
                StatName::Summary,
                self.labels(StatName::Summary),
                vec![row.total, row.delivered, row.pending_delivery],
            )
        });
        self.settle(StatName::Summary, result)
    }

    pub async fn top_delivered_products(&self) -> StatBundle {
        let result = self.try_top_products().await;
        self.settle(StatName::TopProducts, result)
    }

    async fn try_top_products(&self) -> Result<StatBundle, StoreError> {
        let delivered = self.store.count_delivered_orders().await?;
        let products = self.store.count_products().await?;
        let plan = QueryPlan::choose(delivered, products, self.config);
        tracing::debug!(?plan, delivered, products, "Aggregating top delivered products");

        let entries = match plan {
            QueryPlan::InMemory => fold_items(self.store.delivered_items().await?),
            QueryPlan::Grouped => self
                .store
                .product_quantities(None)
                .await?
                .into_iter()
                .map(|row| Ranked {
                    label: row.product_name,
                    value: row.quantity,
                    first_seen: row.first_seen,
                })
                .collect(),
            QueryPlan::Chunked => {
                let ids = self.store.delivered_product_ids().await?;
                let mut entries = Vec::with_capacity(ids.len());
                for chunk in ids.chunks(self.config.product_chunk_size) {
                    let rows = self.store.product_quantities(Some(chunk)).await?;
                    entries.extend(rows.into_iter().map(|row| Ranked {
                        label: row.product_name,
                        value: row.quantity,
                        first_seen: row.first_seen,
                    }));
                }
                entries
            }
        };

        let ranked = rank(entries, self.config.tie_break);
        let details = ranked
            .iter()
            .map(|e| DetailRecord::Product {
                product: e.label.clone(),
                quantity: e.value,
            })
            .collect();
        let top: Vec<Ranked> = ranked.into_iter().take(self.config.top_products).collect();
        let (labels, values) = split(&top);
        Ok(StatBundle::measured(StatName::TopProducts, labels, values).with_details(details))
    }

    /// Delivered orders per administration, restricted to labels that pass
    /// the sanitizer. Falls back to the default departments when none do.
    pub async fn administration_distribution(&self) -> StatBundle {
        let result = self.try_administrations().await;
        self.settle(StatName::Administrations, result)
    }

    async fn try_administrations(&self) -> Result<StatBundle, StoreError> {
        let delivered = self.store.count_delivered_orders().await?;
        let entries = match QueryPlan::choose(delivered, 0, self.config) {
            QueryPlan::InMemory => fold_administrations(&self.store.delivered_orders().await?),
            QueryPlan::Grouped | QueryPlan::Chunked => self
                .store
                .administration_counts()
                .await?
                .into_iter()
                .map(|row| Ranked {
                    label: row.administration,
                    value: row.count,
                    first_seen: row.first_seen,
                })
                .collect(),
        };

        let total = entries.len();
        let valid: Vec<Ranked> = entries
            .into_iter()
            .filter(|e| self.sanitizer.is_valid_grouping_label(&e.label))
            .collect();
        if valid.len() < total {
            // Rejected labels may carry user identifiers; log the count only.
            tracing::warn!(
                rejected = total - valid.len(),
                kept = valid.len(),
                "Rejected administration labels"
            );
        }

        if valid.is_empty() {
            tracing::info!("No valid administration labels, using default departments");
            return Ok(StatBundle::default_departments(&DEFAULT_DEPARTMENTS));
        }

        let ranked = rank(valid, self.config.tie_break);
        let details = ranked
            .iter()
            .map(|e| DetailRecord::Administration {
                administration: e.label.clone(),
                delivered_orders: e.value,
            })
            .collect();
        let (labels, values) = split(&ranked);
        Ok(StatBundle::measured(StatName::Administrations, labels, values).with_details(details))
    }

    pub async fn user_delivery_counts(&self) -> StatBundle {
        let result = self.try_user_deliveries().await;
        self.settle(StatName::UserDeliveries, result)
    }

    async fn try_user_deliveries(&self) -> Result<StatBundle, StoreError> {
        let delivered = self.store.count_delivered_orders().await?;
        let users = match QueryPlan::choose(delivered, 0, self.config) {
            QueryPlan::InMemory => fold_users(&self.store.delivered_orders().await?),
            QueryPlan::Grouped | QueryPlan::Chunked => self
                .store
                .user_delivery_counts()
                .await?
                .into_iter()
                .map(|row| UserEntry {
                    id: row.user_id,
                    unite: row.unite,
                    ranked: Ranked {
                        label: row.user_name,
                        value: row.count,
                        first_seen: row.first_seen,
                    },
                })
                .collect(),
        };

        let ranked = rank(label_users(users), self.config.tie_break);
        let details = ranked
            .iter()
            .map(|e| DetailRecord::User {
                user: e.label.clone(),
                delivered_orders: e.value,
            })
            .collect();
        let (labels, values) = split(&ranked);
        Ok(StatBundle::measured(StatName::UserDeliveries, labels, values).with_details(details))
    }

    /// Orders created per day over the trend window ending at `today`,
    /// zero-filled, oldest first.
    pub async fn order_trend(&self, today: NaiveDate) -> StatBundle {
        let days = trend_days(today, self.config.trend_days);
        let labels: Vec<String> = days
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        let Some(&from) = days.first() else {
            return StatBundle::measured(StatName::OrderTrend, labels, Vec::new());
        };

        match self.store.orders_per_day(from, today).await {
            Ok(rows) => {
                let values = days
                    .iter()
                    .map(|day| {
                        rows.iter()
                            .find(|r| r.day == *day)
                            .map(|r| r.count)
                            .unwrap_or(0)
                    })
                    .collect();
                StatBundle::measured(StatName::OrderTrend, labels, values)
            }
            Err(e) => {
                tracing::warn!(stat = %StatName::OrderTrend, error = %e, "Aggregation failed, serving fallback");
                StatBundle::error_fallback(StatName::OrderTrend, labels, e.to_string())
            }
        }
    }

    fn labels(&self, stat: StatName) -> Vec<String> {
        fixed_labels(stat, Utc::now().date_naive(), self.config.trend_days)
    }

    /// Convert a store failure into the statistic's fallback bundle.
    fn settle(&self, stat: StatName, result: Result<StatBundle, StoreError>) -> StatBundle {
        match result {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(stat = %stat, error = %e, "Aggregation failed, serving fallback");
                StatBundle::error_fallback(stat, self.labels(stat), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::stats::BundleSource;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn sanitizer() -> LabelSanitizer {
        LabelSanitizer::new(4).unwrap()
    }

    #[tokio::test]
    async fn status_counts_scenario() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", Some("Direction Commerciale"));
        for (status, delivered) in [
            (OrderStatus::Pending, false),
            (OrderStatus::Pending, false),
            (OrderStatus::Approved, false),
            (OrderStatus::Delivered, true),
            (OrderStatus::Rejected, false),
        ] {
            store.add_order(user, status, delivered, at(2, 9), &[]);
        }
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.order_status_counts().await;
        assert_eq!(bundle.labels, vec!["pending", "approved", "rejected", "delivered"]);
        assert_eq!(bundle.values(), &[2, 1, 1, 1]);
        assert!(bundle.is_real_data);
        assert_eq!(bundle.source, BundleSource::Database);
    }

    #[tokio::test]
    async fn top_products_scenario() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", None);
        let a = store.add_product("ProductA");
        let b = store.add_product("ProductB");
        store.add_order(user, OrderStatus::Delivered, true, at(1, 9), &[(a, 2)]);
        store.add_order(user, OrderStatus::Delivered, true, at(1, 10), &[(a, 3), (b, 1)]);
        store.add_order(user, OrderStatus::Pending, false, at(1, 11), &[(b, 40)]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.top_delivered_products().await;
        assert_eq!(bundle.labels, vec!["ProductA", "ProductB"]);
        assert_eq!(bundle.series.len(), 1);
        assert_eq!(bundle.series[0].data, vec![5, 1]);
    }

    #[tokio::test]
    async fn top_products_truncates_but_keeps_full_details() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", None);
        for i in 0..12 {
            let product = store.add_product(&format!("Produit {i:02}"));
            store.add_order(user, OrderStatus::Delivered, true, at(1, 9), &[(product, i + 1)]);
        }
        let mut config = StatsConfig::default();
        config.top_products = 8;
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.top_delivered_products().await;
        assert_eq!(bundle.labels.len(), 8);
        assert_eq!(bundle.labels[0], "Produit 11");
        assert_eq!(bundle.details.len(), 12);
    }

    #[tokio::test]
    async fn trend_zero_fills_seven_ascending_days() {
        let store = MemoryStore::new();
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.order_trend(today()).await;
        assert_eq!(
            bundle.labels,
            vec![
                "2026-03-04",
                "2026-03-05",
                "2026-03-06",
                "2026-03-07",
                "2026-03-08",
                "2026-03-09",
                "2026-03-10"
            ]
        );
        assert_eq!(bundle.values(), &[0; 7]);
    }

    #[tokio::test]
    async fn trend_counts_orders_inside_window_only() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", None);
        store.add_order(user, OrderStatus::Pending, false, at(3, 23), &[]);
        store.add_order(user, OrderStatus::Pending, false, at(4, 0), &[]);
        store.add_order(user, OrderStatus::Approved, false, at(10, 8), &[]);
        store.add_order(user, OrderStatus::Approved, false, at(10, 17), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.order_trend(today()).await;
        assert_eq!(bundle.values(), &[1, 0, 0, 0, 0, 0, 2]);
    }

    #[tokio::test]
    async fn administration_distribution_filters_contaminated_labels() {
        let store = MemoryStore::new();
        let commerce = store.add_user("Awa", Some("Direction Commerciale"));
        let info = store.add_user("Moussa", Some(" Service Informatique "));
        let leaked = store.add_user("Ely", Some("Ely (2025)"));
        let role = store.add_user("Sidi", Some("admin"));
        for user in [commerce, commerce, info, leaked, role] {
            store.add_order(user, OrderStatus::Delivered, true, at(2, 9), &[]);
        }
        // Not delivered: ignored.
        store.add_order(info, OrderStatus::Approved, false, at(2, 10), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.administration_distribution().await;
        assert_eq!(bundle.labels, vec!["Direction Commerciale", "Service Informatique"]);
        assert_eq!(bundle.values(), &[2, 1]);
        assert!(bundle.is_real_data);
        assert_eq!(
            bundle.details[0],
            DetailRecord::Administration {
                administration: "Direction Commerciale".to_string(),
                delivered_orders: 2,
            }
        );
    }

    #[tokio::test]
    async fn administration_distribution_falls_back_to_default_departments() {
        let store = MemoryStore::new();
        let leaked = store.add_user("Ely", Some("Ely (2025)"));
        let status = store.add_user("Sidi", Some("En attente"));
        let blank = store.add_user("Aicha", Some("   "));
        for user in [leaked, status, blank] {
            store.add_order(user, OrderStatus::Delivered, true, at(2, 9), &[]);
        }
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.administration_distribution().await;
        assert_eq!(bundle.labels, DEFAULT_DEPARTMENTS.to_vec());
        assert_eq!(bundle.values(), &[0; 5]);
        assert!(!bundle.is_real_data);
        assert_eq!(bundle.source, BundleSource::DefaultDepartments);
    }

    #[tokio::test]
    async fn administration_distribution_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.add_user("Awa", Some("Direction Commerciale"));
        let b = store.add_user("Moussa", Some("Service Informatique"));
        let c = store.add_user("Khadija", Some("Direction Technique"));
        store.add_order(b, OrderStatus::Delivered, true, at(1, 9), &[]);
        store.add_order(a, OrderStatus::Delivered, true, at(1, 10), &[]);
        store.add_order(c, OrderStatus::Delivered, true, at(1, 11), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let first = engine.administration_distribution().await;
        let second = engine.administration_distribution().await;
        assert_eq!(first, second);
        // Equal counts: earliest delivered order first.
        assert_eq!(
            first.labels,
            vec!["Service Informatique", "Direction Commerciale", "Direction Technique"]
        );
    }

    #[tokio::test]
    async fn alphabetical_tie_break_orders_equal_counts_by_label() {
        let store = MemoryStore::new();
        let a = store.add_user("Awa", Some("Direction Commerciale"));
        let b = store.add_user("Moussa", Some("Service Informatique"));
        store.add_order(b, OrderStatus::Delivered, true, at(1, 9), &[]);
        store.add_order(a, OrderStatus::Delivered, true, at(1, 10), &[]);
        let mut config = StatsConfig::default();
        config.tie_break = TieBreak::Alphabetical;
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.administration_distribution().await;
        assert_eq!(bundle.labels, vec!["Direction Commerciale", "Service Informatique"]);
    }

    #[tokio::test]
    async fn delivered_flag_or_status_counts_as_delivered() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", Some("Direction Commerciale"));
        // Flag set but status lagging behind.
        store.add_order(user, OrderStatus::Approved, true, at(1, 9), &[]);
        // Status set but flag lagging behind.
        store.add_order(user, OrderStatus::Delivered, false, at(1, 10), &[]);
        store.add_order(user, OrderStatus::Pending, false, at(1, 11), &[]);
        store.add_order(user, OrderStatus::Rejected, false, at(1, 12), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let split = engine.delivery_split().await;
        assert_eq!(split.values(), &[2, 2]);

        let users = engine.user_delivery_counts().await;
        assert_eq!(users.labels, vec!["Awa"]);
        assert_eq!(users.values(), &[2]);

        let summary = engine.summary().await;
        assert_eq!(summary.values(), &[4, 2, 1]);
    }

    #[tokio::test]
    async fn large_order_volume_switches_to_grouped_queries() {
        let store = MemoryStore::new();
        let awa = store.add_user("Awa", Some("Direction Commerciale"));
        let moussa = store.add_user("Moussa", Some("Service Informatique"));
        let a = store.add_product("ProductA");
        let b = store.add_product("ProductB");
        store.add_order(awa, OrderStatus::Delivered, true, at(1, 9), &[(a, 2)]);
        store.add_order(moussa, OrderStatus::Delivered, true, at(1, 10), &[(a, 3), (b, 1)]);
        store.add_order(awa, OrderStatus::Delivered, true, at(1, 11), &[(b, 1)]);

        let small = StatsConfig::default();
        let mut large = StatsConfig::default();
        large.large_order_threshold = 1;
        let sanitizer = sanitizer();

        let in_memory = StatsEngine::new(&store, &small, &sanitizer);
        store.clear_queries();
        let expected_products = in_memory.top_delivered_products().await;
        let expected_admins = in_memory.administration_distribution().await;
        let expected_users = in_memory.user_delivery_counts().await;
        let queries = store.queries();
        assert!(queries.contains(&"delivered_items"));
        assert!(queries.contains(&"delivered_orders"));
        assert!(!queries.contains(&"product_quantities"));

        let grouped = StatsEngine::new(&store, &large, &sanitizer);
        store.clear_queries();
        assert_eq!(grouped.top_delivered_products().await, expected_products);
        assert_eq!(grouped.administration_distribution().await, expected_admins);
        assert_eq!(grouped.user_delivery_counts().await, expected_users);
        let queries = store.queries();
        assert!(queries.contains(&"product_quantities"));
        assert!(queries.contains(&"administration_counts"));
        assert!(queries.contains(&"user_delivery_counts"));
        assert!(!queries.contains(&"delivered_items"));
        assert!(!queries.contains(&"delivered_orders"));
    }

    #[tokio::test]
    async fn namesakes_are_labelled_by_unit() {
        let store = MemoryStore::new();
        let buyer = store.add_user("Awa Diop", None);
        let accountant = store.add_user("Awa Diop", None);
        let moussa = store.add_user("Moussa", None);
        store.set_unite(buyer, "Achats");
        store.set_unite(accountant, "Comptabilité");
        store.add_order(buyer, OrderStatus::Delivered, true, at(1, 9), &[]);
        store.add_order(buyer, OrderStatus::Delivered, true, at(1, 10), &[]);
        store.add_order(accountant, OrderStatus::Delivered, true, at(1, 11), &[]);
        store.add_order(moussa, OrderStatus::Delivered, true, at(1, 12), &[]);

        let small = StatsConfig::default();
        let mut large = StatsConfig::default();
        large.large_order_threshold = 1;
        let sanitizer = sanitizer();

        let bundle = StatsEngine::new(&store, &small, &sanitizer)
            .user_delivery_counts()
            .await;
        assert_eq!(
            bundle.labels,
            vec!["Awa Diop (Achats)", "Awa Diop (Comptabilité)", "Moussa"]
        );
        assert_eq!(bundle.values(), &[2, 1, 1]);

        let grouped = StatsEngine::new(&store, &large, &sanitizer)
            .user_delivery_counts()
            .await;
        assert_eq!(grouped.labels, bundle.labels);
    }

    #[tokio::test]
    async fn namesakes_in_one_unit_fall_back_to_user_id() {
        let store = MemoryStore::new();
        let first = store.add_user("Awa Diop", None);
        let second = store.add_user("Awa Diop", None);
        store.set_unite(first, "Achats");
        store.set_unite(second, "Achats");
        store.add_order(first, OrderStatus::Delivered, true, at(1, 9), &[]);
        store.add_order(second, OrderStatus::Delivered, true, at(1, 10), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let bundle = engine.user_delivery_counts().await;
        let expected: Vec<String> = [first, second]
            .iter()
            .map(|id| format!("Awa Diop (Achats) ({})", &id.simple().to_string()[..8]))
            .collect();
        assert_eq!(bundle.labels, expected);
        assert_eq!(bundle.details.len(), 2);
    }

    #[tokio::test]
    async fn unique_names_are_left_alone() {
        let store = MemoryStore::new();
        let awa = store.add_user("Awa Diop", None);
        store.set_unite(awa, "Achats");
        store.add_order(awa, OrderStatus::Delivered, true, at(1, 9), &[]);
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        assert_eq!(engine.user_delivery_counts().await.labels, vec!["Awa Diop"]);
    }

    #[tokio::test]
    async fn large_catalog_chunks_product_queries() {
        let store = MemoryStore::new();
        let user = store.add_user("Awa", None);
        let mut expected = Vec::new();
        for i in 0..5 {
            let product = store.add_product(&format!("Produit {i}"));
            store.add_order(user, OrderStatus::Delivered, true, at(1, 9 + i), &[(product, 10 - i as i32)]);
            expected.push(format!("Produit {i}"));
        }
        let mut config = StatsConfig::default();
        config.large_product_threshold = 2;
        config.product_chunk_size = 2;
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        store.clear_queries();
        let bundle = engine.top_delivered_products().await;
        assert_eq!(bundle.labels, expected);
        assert_eq!(bundle.values(), &[10, 9, 8, 7, 6]);
        let chunk_queries = store
            .queries()
            .into_iter()
            .filter(|q| *q == "product_quantities")
            .count();
        assert_eq!(chunk_queries, 3);
    }

    #[tokio::test]
    async fn store_failure_yields_tagged_zero_bundles() {
        let store = MemoryStore::new();
        store.set_failing(Some("connection refused"));
        let config = StatsConfig::default();
        let sanitizer = sanitizer();
        let engine = StatsEngine::new(&store, &config, &sanitizer);

        let snapshot = engine.snapshot(today()).await;
        assert_eq!(snapshot.bundles.len(), StatName::ALL.len());
        for bundle in snapshot.bundles.values() {
            assert_eq!(bundle.source, BundleSource::ErrorFallback);
            assert!(!bundle.is_real_data);
            assert!(bundle.values().iter().all(|v| *v == 0));
        }
        let status = snapshot.get(StatName::OrderStatus).unwrap();
        assert_eq!(status.labels.len(), 4);
        let trend = snapshot.get(StatName::OrderTrend).unwrap();
        assert_eq!(trend.labels.len(), 7);
        assert_eq!(trend.labels.last().map(String::as_str), Some("2026-03-10"));
    }

    #[test]
    fn plan_thresholds() {
        let config = StatsConfig::default();
        assert_eq!(QueryPlan::choose(500, 1000, &config), QueryPlan::InMemory);
        assert_eq!(QueryPlan::choose(501, 10, &config), QueryPlan::Grouped);
        assert_eq!(QueryPlan::choose(10, 1001, &config), QueryPlan::Chunked);
    }

    #[test]
    fn trend_days_span_the_window() {
        let days = trend_days(today(), 7);
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], today() - Duration::days(6));
        assert_eq!(days[6], today());
    }
}
