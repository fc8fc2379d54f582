use std::net::SocketAddr;

use anyhow::Context;
use mimalloc::MiMalloc;
use storefront_stats::config::{AppConfig, CacheBackendKind};
use storefront_stats::services::cache::{CacheBackend, MemoryCache, RedisCache, StatsCache};
use storefront_stats::services::sanitizer::LabelSanitizer;
use storefront_stats::{db, routes, AppState, EVENT_CAPACITY};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_stats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let backend = match config.cache_backend {
        CacheBackendKind::Redis => match RedisCache::connect(&config.redis_url).await {
            Ok(redis) => CacheBackend::Redis(redis),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, using in-process cache");
                CacheBackend::Memory(MemoryCache::new())
            }
        },
        CacheBackendKind::Memory => CacheBackend::Memory(MemoryCache::new()),
    };
    tracing::info!(backend = backend.name(), "Statistics cache ready");

    let sanitizer = LabelSanitizer::new(config.stats.digit_run_threshold)
        .context("Failed to build label sanitizer")?;
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid BACKEND_HOST/BACKEND_PORT")?;

    let state = AppState {
        db: pool,
        cache: StatsCache::new(backend, &config.stats),
        config,
        sanitizer,
        events,
    };
    let app = routes::router(state);

    tracing::info!(host = %addr, "Starting storefront statistics server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
