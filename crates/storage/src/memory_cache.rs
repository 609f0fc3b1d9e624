//! In-memory LRU cache store.
//!
//! Used by tests and by viewers that should not touch the disk. Beyond
//! `capacity` entries the least recently used one is evicted.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use forecast_common::ForecastResult;

use crate::cache::{closed_error, CacheEntry, CacheStore, EntryPredicate};

pub struct MemoryCacheStore {
    /// LRU cache: url -> entry
    cache: RwLock<LruCache<String, CacheEntry>>,
    open: AtomicBool,
    capacity: usize,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        let cache_size = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cache_size)),
            open: AtomicBool::new(false),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    fn check_open(&self) -> ForecastResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(closed_error())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self) -> ForecastResult<()> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> ForecastResult<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> ForecastResult<Option<CacheEntry>> {
        self.check_open()?;
        // LRU lookups reorder, so even reads take the write lock
        let mut cache = self.cache.write().await;
        Ok(cache.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> ForecastResult<()> {
        self.check_open()?;
        let mut cache = self.cache.write().await;
        cache.put(entry.url.clone(), entry);
        Ok(())
    }

    async fn bulk_delete(&self, keys: &[String]) -> ForecastResult<usize> {
        self.check_open()?;
        let mut cache = self.cache.write().await;
        Ok(keys.iter().filter(|k| cache.pop(k.as_str()).is_some()).count())
    }

    async fn filter(&self, predicate: EntryPredicate<'_>) -> ForecastResult<Vec<String>> {
        self.check_open()?;
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePayload;
    use chrono::Utc;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry::new(url, CachePayload::Raster { bytes: vec![1] }, Utc::now())
    }

    #[tokio::test]
    async fn test_closed_store_rejects_access() {
        let store = MemoryCacheStore::new(4);
        assert!(store.get("a").await.is_err());
        store.open().await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        store.close().await.unwrap();
        assert!(store.put(entry("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_put_replaces_and_evicts_lru() {
        let store = MemoryCacheStore::new(2);
        store.open().await.unwrap();
        store.put(entry("a")).await.unwrap();
        store.put(entry("a")).await.unwrap();
        assert_eq!(store.len().await, 1);

        store.put(entry("b")).await.unwrap();
        store.get("a").await.unwrap();
        store.put(entry("c")).await.unwrap();
        assert!(store.get("b").await.unwrap().is_none());
        assert!(store.get("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bulk_delete_counts_existing() {
        let store = MemoryCacheStore::new(8);
        store.open().await.unwrap();
        store.put(entry("a")).await.unwrap();
        let removed = store
            .bulk_delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_empty().await);
    }
}
