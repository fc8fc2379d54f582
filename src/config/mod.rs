use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::stats::StatName;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub cache_backend: CacheBackendKind,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub stats: StatsConfig,
}

/// Which cache backend fronts the aggregation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend: {other}")),
        }
    }
}

/// Ordering applied to equal counts in distribution statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Earliest delivered order (or first row seen) wins.
    FirstSeen,
    Alphabetical,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_seen" => Ok(Self::FirstSeen),
            "alphabetical" => Ok(Self::Alphabetical),
            other => Err(format!("unknown tie-break policy: {other}")),
        }
    }
}

/// Tuning for the statistics pipeline.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub ttl_minutes: BTreeMap<StatName, u64>,
    pub top_products: usize,
    pub digit_run_threshold: usize,
    pub tie_break: TieBreak,
    pub large_order_threshold: i64,
    pub large_product_threshold: i64,
    pub product_chunk_size: usize,
    pub trend_days: u32,
}

impl StatsConfig {
    pub const MIN_TOP_PRODUCTS: usize = 8;
    pub const MAX_TOP_PRODUCTS: usize = 15;

    /// Default cache lifetime per statistic, in minutes.
    pub fn default_ttl_minutes(stat: StatName) -> u64 {
        match stat {
            StatName::OrderStatus | StatName::DeliverySplit | StatName::Summary => 10,
            StatName::OrderTrend => 15,
            StatName::UserDeliveries => 20,
            StatName::TopProducts | StatName::Administrations => 30,
        }
    }

    pub fn ttl(&self, stat: StatName) -> Duration {
        let minutes = self
            .ttl_minutes
            .get(&stat)
            .copied()
            .unwrap_or_else(|| Self::default_ttl_minutes(stat));
        Duration::from_secs(minutes * 60)
    }

    pub fn from_env() -> Self {
        let ttl_minutes = StatName::ALL
            .into_iter()
            .map(|stat| {
                let var = format!("STATS_TTL_{}_MINUTES", stat.as_str().to_ascii_uppercase());
                (stat, env_or(&var, Self::default_ttl_minutes(stat)))
            })
            .collect();

        Self {
            ttl_minutes,
            top_products: env_or("STATS_TOP_PRODUCTS", 10usize)
                .clamp(Self::MIN_TOP_PRODUCTS, Self::MAX_TOP_PRODUCTS),
            digit_run_threshold: env_or("STATS_DIGIT_RUN_THRESHOLD", 4usize).clamp(3, 4),
            tie_break: env_or("STATS_TIE_BREAK", TieBreak::FirstSeen),
            large_order_threshold: env_or("STATS_LARGE_ORDER_THRESHOLD", 500),
            large_product_threshold: env_or("STATS_LARGE_PRODUCT_THRESHOLD", 1000),
            product_chunk_size: env_or("STATS_PRODUCT_CHUNK_SIZE", 50usize).max(1),
            trend_days: env_or("STATS_TREND_DAYS", 7u32).max(1),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: StatName::ALL
                .into_iter()
                .map(|stat| (stat, Self::default_ttl_minutes(stat)))
                .collect(),
            top_products: 10,
            digit_run_threshold: 4,
            tie_break: TieBreak::FirstSeen,
            large_order_threshold: 500,
            large_product_threshold: 1000,
            product_chunk_size: 50,
            trend_days: 7,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            cache_backend: env_or("CACHE_BACKEND", CacheBackendKind::Redis),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("BACKEND_PORT", 3000),
            jwt_secret: env::var("JWT_SECRET")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            stats: StatsConfig::from_env(),
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_stay_within_ten_to_thirty_minutes() {
        let config = StatsConfig::default();
        for stat in StatName::ALL {
            let ttl = config.ttl(stat).as_secs();
            assert!((600..=1800).contains(&ttl), "{stat} ttl {ttl}");
        }
    }

    #[test]
    fn ttl_is_per_statistic() {
        let mut config = StatsConfig::default();
        config.ttl_minutes.insert(StatName::Summary, 12);
        assert_eq!(config.ttl(StatName::Summary), Duration::from_secs(720));
        assert_eq!(config.ttl(StatName::TopProducts), Duration::from_secs(1800));
    }

    #[test]
    fn parses_cache_backend_and_tie_break() {
        assert_eq!("Memory".parse::<CacheBackendKind>(), Ok(CacheBackendKind::Memory));
        assert!("memcached".parse::<CacheBackendKind>().is_err());
        assert_eq!("alphabetical".parse::<TieBreak>(), Ok(TieBreak::Alphabetical));
        assert_eq!(" first_seen ".parse::<TieBreak>(), Ok(TieBreak::FirstSeen));
    }
}
