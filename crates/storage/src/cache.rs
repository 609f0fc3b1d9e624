//! Persistent forecast cache with time-based invalidation.
//!
//! Entries are keyed by resource URL. A fresh entry (younger than the
//! TTL) short-circuits the network; stale entries are superseded by the
//! next write and swept by [`ForecastCache::purge_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use field::VectorGridPayload;
use forecast_common::{ForecastError, ForecastResult};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePayload {
    /// Undecoded raster bytes (scalar overlays)
    Raster { bytes: Vec<u8> },
    /// Decoded U/V arrays and grid metadata (wind)
    VectorGrid(VectorGridPayload),
}

impl CachePayload {
    /// Approximate payload size in bytes.
    pub fn size(&self) -> usize {
        match self {
            CachePayload::Raster { bytes } => bytes.len(),
            CachePayload::VectorGrid(grid) => (grid.u.len() + grid.v.len()) * 4,
        }
    }
}

/// One cached resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub payload: CachePayload,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, payload: CachePayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            payload,
            timestamp,
        }
    }

    /// Age at `now`; entries from the future count as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Predicate over entries, used for scans.
pub type EntryPredicate<'a> = &'a (dyn Fn(&CacheEntry) -> bool + Send + Sync);

/// Durable key-value store behind the forecast cache.
///
/// At most one entry per key; `put` fully replaces.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn open(&self) -> ForecastResult<()>;

    async fn close(&self) -> ForecastResult<()>;

    async fn get(&self, key: &str) -> ForecastResult<Option<CacheEntry>>;

    async fn put(&self, entry: CacheEntry) -> ForecastResult<()>;

    /// Delete keys, returning how many existed.
    async fn bulk_delete(&self, keys: &[String]) -> ForecastResult<usize>;

    /// Keys of the entries matching `predicate`.
    async fn filter(&self, predicate: EntryPredicate<'_>) -> ForecastResult<Vec<String>>;
}

/// Cache counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub purged: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    purged: AtomicU64,
}

/// TTL policy over an injected [`CacheStore`].
pub struct ForecastCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    stats: AtomicStats,
}

impl ForecastCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            stats: AtomicStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn open(&self) -> ForecastResult<()> {
        self.store.open().await
    }

    pub async fn close(&self) -> ForecastResult<()> {
        self.store.close().await
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) < self.ttl
    }

    /// Fresh entry for `url`, if any.
    pub async fn lookup_fresh(&self, url: &str) -> ForecastResult<Option<CacheEntry>> {
        self.lookup_fresh_at(url, Utc::now()).await
    }

    /// Same as [`ForecastCache::lookup_fresh`] with an explicit clock.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn lookup_fresh_at(&self, url: &str, now: DateTime<Utc>) -> ForecastResult<Option<CacheEntry>> {
        match self.store.get(url).await? {
            Some(entry) if self.is_fresh(&entry, now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                counter!("forecast_cache_hits_total").increment(1);
                debug!(age_secs = entry.age(now).as_secs(), "cache hit");
                Ok(Some(entry))
            }
            stale => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                counter!("forecast_cache_misses_total").increment(1);
                debug!(stale = stale.is_some(), "cache miss");
                Ok(None)
            }
        }
    }

    /// Persist a payload stamped with the current time.
    pub async fn store_payload(&self, url: &str, payload: CachePayload) -> ForecastResult<CacheEntry> {
        self.store_payload_at(url, payload, Utc::now()).await
    }

    #[instrument(skip(self, payload), fields(url = %url, size = payload.size()))]
    pub async fn store_payload_at(
        &self,
        url: &str,
        payload: CachePayload,
        now: DateTime<Utc>,
    ) -> ForecastResult<CacheEntry> {
        let entry = CacheEntry::new(url, payload, now);
        self.store.put(entry.clone()).await?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        counter!("forecast_cache_writes_total").increment(1);
        debug!("cache entry written");
        Ok(entry)
    }

    /// Delete every entry older than the TTL.
    pub async fn purge_expired(&self) -> ForecastResult<usize> {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> ForecastResult<usize> {
        let ttl = self.ttl;
        let expired = self
            .store
            .filter(&move |entry: &CacheEntry| entry.age(now) >= ttl)
            .await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let removed = self.store.bulk_delete(&expired).await?;
        self.stats.purged.fetch_add(removed as u64, Ordering::Relaxed);
        counter!("forecast_cache_purged_total").increment(removed as u64);
        info!(removed, ttl_secs = ttl.as_secs(), "purged expired cache entries");
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
            purged: self.stats.purged.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn closed_error() -> ForecastError {
    ForecastError::Cache("cache store is closed".to_string())
}
