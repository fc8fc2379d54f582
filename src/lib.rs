pub mod config;
pub mod db;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod services;

use sqlx::PgPool;
use tokio::sync::broadcast;

use models::stats::DashboardSnapshot;
use services::cache::StatsCache;
use services::sanitizer::LabelSanitizer;

/// Snapshots buffered per dashboard subscriber before it starts lagging.
pub const EVENT_CAPACITY: usize = 16;

/// Shared application state passed to all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: config::AppConfig,
    pub cache: StatsCache,
    pub sanitizer: LabelSanitizer,
    pub events: broadcast::Sender<DashboardSnapshot>,
}
