//! Directory-backed cache store.
//!
//! One JSON file per entry, named by a UUIDv5 of the URL. Writes land in
//! a temporary file that is renamed over the target, so readers never
//! see a partial entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use forecast_common::{ForecastError, ForecastResult};

use crate::cache::{closed_error, CacheEntry, CacheStore, EntryPredicate};

const ENTRY_EXTENSION: &str = "json";

pub struct FileCacheStore {
    root: PathBuf,
    open: AtomicBool,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entry for `url`.
    pub fn entry_path(&self, url: &str) -> PathBuf {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes());
        self.root.join(format!("{}.{}", id, ENTRY_EXTENSION))
    }

    fn check_open(&self) -> ForecastResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(closed_error())
        }
    }

    /// Read one entry file; unreadable or corrupt files count as absent.
    async fn read_entry(path: &Path) -> ForecastResult<Option<CacheEntry>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_io(path, e)),
        };

        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt cache entry");
                Ok(None)
            }
        }
    }
}

fn cache_io(path: &Path, err: std::io::Error) -> ForecastError {
    ForecastError::Cache(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl CacheStore for FileCacheStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn open(&self) -> ForecastResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| cache_io(&self.root, e))?;
        self.open.store(true, Ordering::Release);
        debug!("file cache opened");
        Ok(())
    }

    async fn close(&self) -> ForecastResult<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> ForecastResult<Option<CacheEntry>> {
        self.check_open()?;
        let entry = Self::read_entry(&self.entry_path(key)).await?;
        Ok(entry.filter(|e| e.url == key))
    }

    #[instrument(skip(self, entry), fields(url = %entry.url))]
    async fn put(&self, entry: CacheEntry) -> ForecastResult<()> {
        self.check_open()?;
        let target = self.entry_path(&entry.url);
        let tmp = target.with_extension(format!("{}.tmp-{}", ENTRY_EXTENSION, Uuid::new_v4()));

        let data = serde_json::to_vec(&entry)?;
        fs::write(&tmp, &data).await.map_err(|e| cache_io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(cache_io(&target, e));
        }

        debug!(bytes = data.len(), "cache entry persisted");
        Ok(())
    }

    async fn bulk_delete(&self, keys: &[String]) -> ForecastResult<usize> {
        self.check_open()?;
        let mut removed = 0;
        for key in keys {
            let path = self.entry_path(key);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(cache_io(&path, e)),
            }
        }
        Ok(removed)
    }

    async fn filter(&self, predicate: EntryPredicate<'_>) -> ForecastResult<Vec<String>> {
        self.check_open()?;
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| cache_io(&self.root, e))?;

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|e| cache_io(&self.root, e))? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(entry) = Self::read_entry(&path).await? {
                if predicate(&entry) {
                    keys.push(entry.url);
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePayload;
    use chrono::Utc;

    fn entry(url: &str, bytes: &[u8]) -> CacheEntry {
        CacheEntry::new(url, CachePayload::Raster { bytes: bytes.to_vec() }, Utc::now())
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache"));
        store.open().await.unwrap();
        store.put(entry("https://x/a", b"one")).await.unwrap();
        store.close().await.unwrap();

        let reopened = FileCacheStore::new(dir.path().join("cache"));
        reopened.open().await.unwrap();
        let got = reopened.get("https://x/a").await.unwrap().unwrap();
        assert_eq!(got.payload, CachePayload::Raster { bytes: b"one".to_vec() });
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.open().await.unwrap();
        store.put(entry("https://x/a", b"one")).await.unwrap();
        store.put(entry("https://x/a", b"two")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
        let got = store.get("https://x/a").await.unwrap().unwrap();
        assert_eq!(got.payload, CachePayload::Raster { bytes: b"two".to_vec() });
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.open().await.unwrap();
        std::fs::write(store.entry_path("https://x/bad"), b"{not json").unwrap();
        assert!(store.get("https://x/bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filter_and_bulk_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path());
        store.open().await.unwrap();
        store.put(entry("https://x/a", b"1")).await.unwrap();
        store.put(entry("https://x/b", b"22")).await.unwrap();

        let mut big = store
            .filter(&|e: &CacheEntry| e.payload.size() > 1)
            .await
            .unwrap();
        big.sort();
        assert_eq!(big, vec!["https://x/b".to_string()]);

        assert_eq!(store.bulk_delete(&big).await.unwrap(), 1);
        assert!(store.get("https://x/b").await.unwrap().is_none());
        assert!(store.get("https://x/a").await.unwrap().is_some());
    }
}
