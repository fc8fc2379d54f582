//! Dashboard routes: statistics snapshot, live updates, and drill-down pages.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::db::postgres::PgStore;
use crate::errors::{ApiResponse, AppError};
use crate::middleware::rbac::RequireAdmin;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::stats::{DashboardSnapshot, DetailRecord, StatName};
use crate::services::aggregation::StatsEngine;
use crate::services::dashboard::{self, SNAPSHOT_EVENT};
use crate::AppState;

/// Query parameters for the snapshot endpoint. `nocache` is a client
/// cache-buster and is ignored server-side.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub refresh: Option<String>,
    pub nocache: Option<String>,
}

impl SnapshotQuery {
    pub fn bypass(&self) -> bool {
        matches!(self.refresh.as_deref(), Some("1" | "true"))
    }
}

/// GET /admin/dashboard/data: all statistics in one snapshot.
///
/// The body is the bare snapshot, the same shape as the `dashboard` event
/// and the embedded payload. Failures still use the error envelope.
pub async fn data(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<SnapshotQuery>,
) -> Json<DashboardSnapshot> {
    let store = PgStore::new(state.db.clone());
    let engine = StatsEngine::new(&store, &state.config.stats, &state.sanitizer);
    Json(dashboard::load_snapshot(&engine, &state.cache, query.bypass()).await)
}

/// GET /admin/dashboard/events: current snapshot, then one event per
/// lifecycle write.
pub async fn events(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let store = PgStore::new(state.db.clone());
    let engine = StatsEngine::new(&store, &state.config.stats, &state.sanitizer);
    let current = dashboard::load_snapshot(&engine, &state.cache, false).await;

    tracing::debug!(user = %admin.name, "Dashboard event stream opened");

    let initial = stream::iter(snapshot_event(&current).map(Ok));
    Sse::new(initial.chain(updates(rx))).keep_alive(KeepAlive::default())
}

fn updates(
    rx: broadcast::Receiver<DashboardSnapshot>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    if let Some(event) = snapshot_event(&snapshot) {
                        return Some((Ok(event), rx));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dashboard subscriber lagged, snapshots dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn snapshot_event(snapshot: &DashboardSnapshot) -> Option<Event> {
    match Event::default().event(SNAPSHOT_EVENT).json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode dashboard event");
            None
        }
    }
}

/// GET /admin/dashboard/details/{stat}: full detail list of a distribution.
pub async fn details(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(stat): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<ApiResponse<PagedResult<DetailRecord>>>, AppError> {
    let stat: StatName = stat.parse().map_err(|_| AppError::UnknownStat(stat))?;
    if !stat.is_distribution() {
        return Err(AppError::NoDetails(stat));
    }

    let store = PgStore::new(state.db.clone());
    let engine = StatsEngine::new(&store, &state.config.stats, &state.sanitizer);
    let today = Utc::now().date_naive();
    let (bundle, _) = state
        .cache
        .get_or_compute(&store, stat, false, || engine.compute(stat, today))
        .await;

    Ok(ApiResponse::success(dashboard::details_page(
        &bundle,
        &pagination,
    )))
}

/// GET /admin/dashboard/embed: snapshot escaped for a page attribute.
pub async fn embed(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<String, AppError> {
    let store = PgStore::new(state.db.clone());
    let engine = StatsEngine::new(&store, &state.config.stats, &state.sanitizer);
    let snapshot = dashboard::load_snapshot(&engine, &state.cache, false).await;
    Ok(dashboard::embed_attribute(&snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(refresh: Option<&str>) -> SnapshotQuery {
        SnapshotQuery {
            refresh: refresh.map(str::to_string),
            nocache: Some("1767225600000".to_string()),
        }
    }

    #[test]
    fn refresh_flag_bypasses_cache() {
        assert!(query(Some("1")).bypass());
        assert!(query(Some("true")).bypass());
        assert!(!query(Some("0")).bypass());
        assert!(!query(None).bypass());
    }
}
