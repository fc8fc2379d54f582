//! Statistic cache with signal-derived keys.
//!
//! Keys embed the row count and latest `updated_at` of every table a
//! statistic reads, so any committed write makes the previous key
//! unreachable. Statistics keyed on a coarse time bucket rely on the TTL
//! and on explicit invalidation after lifecycle writes.
//!
//! The backend is either Redis or an in-process TTL map. Backend failures
//! never fail a request: they degrade to a miss and the value is computed
//! uncached.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use crate::config::StatsConfig;
use crate::db::{OrderStore, StoreError, Table, TableSignal};
use crate::models::stats::{StatBundle, StatName};

/// Namespace and schema version shared by every key.
pub const KEY_PREFIX: &str = "dashboard:v1";

const SCAN_BATCH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Coarse time component appended to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Hour,
    Day,
}

impl TimeBucket {
    fn segment(&self, now: DateTime<Utc>) -> String {
        match self {
            TimeBucket::Hour => format!("h{}", now.format("%Y%m%d%H")),
            TimeBucket::Day => format!("d{}", now.format("%Y%m%d")),
        }
    }
}

/// Which signals make up the key of one statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStrategy {
    /// Tables whose signals are embedded, in key order.
    pub tables: &'static [Table],
    /// Embed `MAX(updated_at)` next to each row count.
    pub recency: bool,
    pub bucket: Option<TimeBucket>,
}

impl KeyStrategy {
    pub fn for_stat(stat: StatName) -> Self {
        match stat {
            StatName::OrderStatus | StatName::DeliverySplit => Self {
                tables: &[Table::Orders],
                recency: true,
                bucket: None,
            },
            StatName::TopProducts => Self {
                tables: &[Table::Orders, Table::OrderItems, Table::Products],
                recency: true,
                bucket: None,
            },
            StatName::Administrations | StatName::UserDeliveries => Self {
                tables: &[Table::Orders, Table::Users],
                recency: true,
                bucket: None,
            },
            StatName::OrderTrend => Self {
                tables: &[Table::Orders],
                recency: true,
                bucket: Some(TimeBucket::Day),
            },
            StatName::Summary => Self {
                tables: &[Table::Orders],
                recency: false,
                bucket: Some(TimeBucket::Hour),
            },
        }
    }
}

/// Build the key of `stat` from table signals given in `strategy.tables` order.
pub fn build_key(
    stat: StatName,
    strategy: &KeyStrategy,
    signals: &[TableSignal],
    now: DateTime<Utc>,
) -> String {
    let mut key = format!("{KEY_PREFIX}:{}", stat.as_str());
    for signal in signals {
        key.push(':');
        if strategy.recency {
            let ts = signal
                .last_modified
                .map(|t| t.timestamp_millis())
                .unwrap_or(0);
            key.push_str(&format!("{}-{ts}", signal.row_count));
        } else {
            key.push_str(&signal.row_count.to_string());
        }
    }
    if let Some(bucket) = strategy.bucket {
        key.push(':');
        key.push_str(&bucket.segment(now));
    }
    key
}

/// Prefix matching every key of `stat`.
pub fn stat_prefix(stat: StatName) -> String {
    format!("{KEY_PREFIX}:{}:", stat.as_str())
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// A stored value with its insertion instant and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// In-process TTL map. Expired entries are never returned and are purged
/// on every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                ttl,
            },
        );
    }

    pub fn forget(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn forget_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Redis-backed cache sharing one multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let exists = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut conn)
            .await?;
        Ok(exists)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(value)
    }

    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    /// Delete every key starting with `prefix`, walking the keyspace with SCAN.
    pub async fn forget_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await?;
            if !keys.is_empty() {
                let deleted = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<i64>(&mut conn)
                    .await?;
                removed += usize::try_from(deleted).unwrap_or(0);
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum CacheBackend {
    Redis(RedisCache),
    Memory(MemoryCache),
}

impl CacheBackend {
    pub fn name(&self) -> &'static str {
        match self {
            CacheBackend::Redis(_) => "redis",
            CacheBackend::Memory(_) => "memory",
        }
    }

    pub async fn has(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.has(key).await,
            CacheBackend::Memory(memory) => Ok(memory.has(key)),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.get(key).await,
            CacheBackend::Memory(memory) => Ok(memory.get(key)),
        }
    }

    pub async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.put(key, &value, ttl).await,
            CacheBackend::Memory(memory) => {
                memory.put(key, value, ttl);
                Ok(())
            }
        }
    }

    pub async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.forget(key).await,
            CacheBackend::Memory(memory) => Ok(memory.forget(key)),
        }
    }

    pub async fn forget_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.forget_prefix(prefix).await,
            CacheBackend::Memory(memory) => Ok(memory.forget_prefix(prefix)),
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            CacheBackend::Redis(redis) => redis.ping().await,
            CacheBackend::Memory(_) => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistic cache
// ---------------------------------------------------------------------------

/// Per-statistic cache in front of the aggregation engine.
#[derive(Debug, Clone)]
pub struct StatsCache {
    backend: CacheBackend,
    ttls: BTreeMap<StatName, Duration>,
}

impl StatsCache {
    pub fn new(backend: CacheBackend, config: &StatsConfig) -> Self {
        let ttls = StatName::ALL
            .into_iter()
            .map(|stat| (stat, config.ttl(stat)))
            .collect();
        Self { backend, ttls }
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    pub fn ttl(&self, stat: StatName) -> Duration {
        self.ttls
            .get(&stat)
            .copied()
            .unwrap_or_else(|| Duration::from_secs(StatsConfig::default_ttl_minutes(stat) * 60))
    }

    /// Current key of `stat`, read from the store's table signals.
    pub async fn key_for<S: OrderStore>(
        &self,
        store: &S,
        stat: StatName,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let strategy = KeyStrategy::for_stat(stat);
        let mut signals = Vec::with_capacity(strategy.tables.len());
        for table in strategy.tables {
            signals.push(store.table_signal(*table).await?);
        }
        Ok(build_key(stat, &strategy, &signals, now))
    }

    /// Return the cached bundle for `stat`, or compute and store it.
    ///
    /// `bypass` skips the lookup but still replaces the stored value. The
    /// flag in the result is `true` only for a cache hit.
    pub async fn get_or_compute<S, F, Fut>(
        &self,
        store: &S,
        stat: StatName,
        bypass: bool,
        compute: F,
    ) -> (StatBundle, bool)
    where
        S: OrderStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StatBundle>,
    {
        let key = match self.key_for(store, stat, Utc::now()).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(stat = %stat, error = %e, "Cache key signals unavailable, computing uncached");
                return (compute().await, false);
            }
        };

        if !bypass {
            if let Some(bundle) = self.lookup(&key).await {
                tracing::debug!(stat = %stat, key = %key, "Cache hit");
                return (bundle, true);
            }
            tracing::debug!(stat = %stat, key = %key, "Cache miss");
        } else {
            tracing::debug!(stat = %stat, key = %key, "Cache bypassed");
        }

        let bundle = compute().await;
        if bundle.is_error() {
            tracing::debug!(stat = %stat, "Not caching fallback bundle");
        } else {
            self.store(&key, stat, &bundle).await;
        }
        (bundle, false)
    }

    async fn lookup(&self, key: &str) -> Option<StatBundle> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    async fn store(&self, key: &str, stat: StatName, bundle: &StatBundle) {
        let result = match serde_json::to_string(bundle) {
            Ok(raw) => self.backend.put(key, raw, self.ttl(stat)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(backend = self.backend.name(), stat = %stat, error = %e, "Cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        match self.backend.forget(key).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
                false
            }
        }
    }

    /// Drop every key of `stat`, whatever its signals.
    pub async fn invalidate_prefix(&self, stat: StatName) -> usize {
        match self.backend.forget_prefix(&stat_prefix(stat)).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(stat = %stat, error = %e, "Cache prefix invalidation failed");
                0
            }
        }
    }

    /// Drop every statistic derived from order or delivery state. All seven
    /// read the orders table.
    pub async fn invalidate_order_stats(&self) -> usize {
        let mut removed = 0;
        for stat in StatName::ALL {
            removed += self.invalidate_prefix(stat).await;
        }
        tracing::info!(removed, "Invalidated order statistics");
        removed
    }
}
