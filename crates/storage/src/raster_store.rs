//! Remote store of per-date forecast rasters.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use object_store::http::HttpBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use forecast_common::{ForecastError, ForecastResult};

/// Where raster files are served from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RasterBackend {
    /// Plain HTTP(S) under `base_url`
    Http,
    /// A local directory mirroring the remote layout
    Local { root: PathBuf },
    /// Process memory, filled through [`RasterStore::put`]
    Memory,
}

/// Configuration for the raster store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterStoreConfig {
    /// URL prefix every resource URL starts with
    pub base_url: String,
    pub backend: RasterBackend,
}

impl Default for RasterStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/rasters".to_string(),
            backend: RasterBackend::Http,
        }
    }
}

/// Read access to raster files addressed by full resource URL.
pub struct RasterStore {
    store: Arc<dyn ObjectStore>,
    base_url: String,
    fetches: AtomicU64,
}

impl RasterStore {
    pub fn new(config: &RasterStoreConfig) -> ForecastResult<Self> {
        let store: Arc<dyn ObjectStore> = match &config.backend {
            RasterBackend::Http => Arc::new(
                HttpBuilder::new()
                    .with_url(config.base_url.as_str())
                    .build()
                    .map_err(|e| ForecastError::Config(format!("Failed to create HTTP store: {}", e)))?,
            ),
            RasterBackend::Local { root } => Arc::new(LocalFileSystem::new_with_prefix(root).map_err(|e| {
                ForecastError::Config(format!("Failed to open {}: {}", root.display(), e))
            })?),
            RasterBackend::Memory => Arc::new(InMemory::new()),
        };
        Ok(Self::with_store(&config.base_url, store))
    }

    /// Wrap an existing object store.
    pub fn with_store(base_url: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            base_url: base_url.trim_end_matches('/').to_string(),
            fetches: AtomicU64::new(0),
        }
    }

    /// In-memory store, mostly for tests.
    pub fn in_memory(base_url: &str) -> Self {
        Self::with_store(base_url, Arc::new(InMemory::new()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Object path of a resource URL.
    pub fn object_path(&self, url: &str) -> ForecastResult<Path> {
        let relative = url
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| {
                ForecastError::Resolution(format!("{} is not under {}", url, self.base_url))
            })?;
        Ok(Path::from(relative))
    }

    /// Fetch a raster.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> ForecastResult<Bytes> {
        let location = self.object_path(url)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        counter!("forecast_raster_fetches_total").increment(1);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ForecastError::Transport(format!("{} not found", url)),
            other => ForecastError::Transport(format!("Failed to read {}: {}", url, other)),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| ForecastError::Transport(format!("Failed to read bytes of {}: {}", url, e)))?;

        debug!(size = bytes.len(), "fetched raster");
        Ok(bytes)
    }

    /// Upload a raster.
    #[instrument(skip(self, data), fields(url = %url, size = data.len()))]
    pub async fn put(&self, url: &str, data: Bytes) -> ForecastResult<()> {
        let location = self.object_path(url)?;
        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| ForecastError::Transport(format!("Failed to write {}: {}", url, e)))?;
        Ok(())
    }

    /// Check if a raster exists.
    pub async fn exists(&self, url: &str) -> ForecastResult<bool> {
        let location = self.object_path(url)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ForecastError::Transport(format!("Failed to check {}: {}", url, e))),
        }
    }

    /// Resource URLs under a path prefix such as `20240301/UV`.
    pub async fn list(&self, prefix: &str) -> ForecastResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut urls = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| ForecastError::Transport(format!("List failed: {}", e)))?
        {
            urls.push(format!("{}/{}", self.base_url, meta.location));
        }

        urls.sort();
        Ok(urls)
    }

    /// Number of fetches issued since creation.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
