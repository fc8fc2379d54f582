//! Dashboard snapshot assembly.
//!
//! Loads every statistic through the cache, pushes fresh snapshots to
//! subscribers after lifecycle writes, and renders the snapshot for the
//! initial page payload.

use chrono::Utc;
use tokio::sync::broadcast;

use crate::db::OrderStore;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::stats::{DashboardSnapshot, DetailRecord, StatBundle, StatName};
use crate::services::aggregation::StatsEngine;
use crate::services::cache::StatsCache;

/// Name of the server-sent event carrying a snapshot.
pub const SNAPSHOT_EVENT: &str = "dashboard";

/// Load all statistics, through the cache unless `bypass` is set.
///
/// `is_cached` is set only when every statistic was a cache hit.
pub async fn load_snapshot<S: OrderStore>(
    engine: &StatsEngine<'_, S>,
    cache: &StatsCache,
    bypass: bool,
) -> DashboardSnapshot {
    let today = Utc::now().date_naive();
    let store = engine.store();
    let stat = |name: StatName| {
        cache.get_or_compute(store, name, bypass, move || engine.compute(name, today))
    };

    let results = tokio::join!(
        stat(StatName::OrderStatus),
        stat(StatName::DeliverySplit),
        stat(StatName::TopProducts),
        stat(StatName::Administrations),
        stat(StatName::UserDeliveries),
        stat(StatName::OrderTrend),
        stat(StatName::Summary),
    );
    let results = [
        results.0, results.1, results.2, results.3, results.4, results.5, results.6,
    ];

    let hits = results.iter().filter(|(_, hit)| *hit).count();
    tracing::debug!(hits, bypass, "Dashboard snapshot loaded");

    DashboardSnapshot {
        is_cached: hits == results.len(),
        bundles: results
            .into_iter()
            .map(|(bundle, _)| (bundle.name, bundle))
            .collect(),
        generated_at: Utc::now(),
    }
}

/// Invalidate order-derived statistics and publish a recomputed snapshot.
///
/// Call only after the triggering write has committed.
pub async fn refresh_after_write<S: OrderStore>(
    engine: &StatsEngine<'_, S>,
    cache: &StatsCache,
    events: &broadcast::Sender<DashboardSnapshot>,
) -> DashboardSnapshot {
    cache.invalidate_order_stats().await;
    let snapshot = load_snapshot(engine, cache, false).await;
    match events.send(snapshot.clone()) {
        Ok(receivers) => tracing::debug!(receivers, "Dashboard snapshot broadcast"),
        Err(_) => tracing::debug!("No dashboard subscribers"),
    }
    snapshot
}

/// One page of a distribution's full detail list.
pub fn details_page(bundle: &StatBundle, pagination: &Pagination) -> PagedResult<DetailRecord> {
    PagedResult::from_slice(&bundle.details, pagination)
}

/// Snapshot JSON escaped for a double-quoted HTML attribute.
pub fn embed_attribute(snapshot: &DashboardSnapshot) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(snapshot)?;
    Ok(escape_attribute(&json))
}

fn escape_attribute(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 8);
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
