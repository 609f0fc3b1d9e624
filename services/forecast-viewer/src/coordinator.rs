//! Selection-driven overlay loading.
//!
//! Every selection change cancels the load in flight, resolves the raster
//! URL, consults the cache, fetches (and for wind, decodes in the worker
//! pool) on a miss, and swaps the result into the map. Only the latest
//! selection may mount; stale loads end quietly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use field::{raster, ScalarField, VectorField};
use forecast_common::{ColorRamp, ForecastError, ForecastResult, Selection};
use renderer::{
    HeadlessMap, LayerId, OverlayLayer, ParticleAnimationOverlay, ParticleConfig, PumpStats, RenderResult,
    ScalarFieldOverlay,
};
use storage::{CachePayload, CacheStore, FileCacheStore, ForecastCache, MemoryCacheStore, RasterStore};

use crate::config::{CacheBackend, ViewerConfig};
use crate::resource::{OverlayRegistry, ResourcePlan, ResourceResolver};
use crate::worker::DecodeWorkerPool;

/// How a load ended.
#[derive(Debug)]
pub enum LoadOutcome {
    Mounted,
    /// Superseded by a newer selection
    Cancelled,
    /// The previous overlay is still mounted
    Failed(ForecastError),
}

impl LoadOutcome {
    pub fn is_mounted(&self) -> bool {
        matches!(self, LoadOutcome::Mounted)
    }

    fn label(&self) -> &'static str {
        match self {
            LoadOutcome::Mounted => "mounted",
            LoadOutcome::Cancelled => "cancelled",
            LoadOutcome::Failed(_) => "failed",
        }
    }
}

/// Layers currently owned by the coordinator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MountedLayers {
    pub scalar: Option<LayerId>,
    pub vector: Option<LayerId>,
}

#[derive(Default)]
struct LoadState {
    token: CancellationToken,
    mounted: MountedLayers,
}

#[derive(Clone, Copy)]
enum LoadKind {
    Scalar,
    Vector,
}

/// Field plus the payload to persist once it is mounted.
struct Loaded<F> {
    field: Arc<F>,
    fresh: Option<CachePayload>,
}

enum Mount {
    Scalar {
        field: Arc<ScalarField>,
        ramp: ColorRamp,
    },
    Wind {
        field: Arc<VectorField>,
        speed: Arc<ScalarField>,
        speed_ramp: ColorRamp,
    },
}

struct Inner {
    map: Arc<Mutex<HeadlessMap>>,
    // Lock order is `map` then `state`. Cache writes hold `state` alone.
    state: Mutex<LoadState>,
    resolver: ResourceResolver,
    store: Arc<RasterStore>,
    cache: Arc<ForecastCache>,
    workers: DecodeWorkerPool,
    particles: ParticleConfig,
    visible: AtomicBool,
    scalar_loads: AtomicUsize,
    vector_loads: AtomicUsize,
    loading_tx: watch::Sender<bool>,
}

/// Owns the mounted overlays and drives loads from selection changes.
#[derive(Clone)]
pub struct OverlayLoadCoordinator {
    inner: Arc<Inner>,
}

impl OverlayLoadCoordinator {
    pub fn new(
        map: Arc<Mutex<HeadlessMap>>,
        resolver: ResourceResolver,
        store: Arc<RasterStore>,
        cache: Arc<ForecastCache>,
        particles: ParticleConfig,
        max_concurrent_decodes: usize,
    ) -> Self {
        let (loading_tx, _) = watch::channel(false);
        let workers = DecodeWorkerPool::new(store.clone(), max_concurrent_decodes);
        Self {
            inner: Arc::new(Inner {
                map,
                state: Mutex::new(LoadState::default()),
                resolver,
                store,
                cache,
                workers,
                particles,
                visible: AtomicBool::new(true),
                scalar_loads: AtomicUsize::new(0),
                vector_loads: AtomicUsize::new(0),
                loading_tx,
            }),
        }
    }

    /// Build the map, stores and cache described by `config`.
    pub fn from_config(config: &ViewerConfig) -> ForecastResult<Self> {
        let store = Arc::new(RasterStore::new(&config.store)?);
        let cache_store: Arc<dyn CacheStore> = match &config.cache.backend {
            CacheBackend::File { dir } => Arc::new(FileCacheStore::new(dir)),
            CacheBackend::Memory { capacity } => Arc::new(MemoryCacheStore::new(*capacity)),
        };
        let cache = Arc::new(ForecastCache::new(cache_store, config.cache.ttl()));
        let registry = OverlayRegistry::from_styles(&config.overlays)?;
        let resolver = ResourceResolver::new(&config.store.base_url, &config.extension, registry);
        let particles = config.particles.to_particle_config().map_err(ForecastError::Config)?;
        let map = HeadlessMap::new(
            config.map.width,
            config.map.height,
            (config.map.center[0], config.map.center[1]),
            config.map.zoom,
        );

        Ok(Self::new(
            Arc::new(Mutex::new(map)),
            resolver,
            store,
            cache,
            particles,
            config.max_concurrent_decodes,
        ))
    }

    pub fn map(&self) -> Arc<Mutex<HeadlessMap>> {
        self.inner.map.clone()
    }

    pub fn cache(&self) -> &Arc<ForecastCache> {
        &self.inner.cache
    }

    pub fn store(&self) -> &Arc<RasterStore> {
        &self.inner.store
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.inner.resolver
    }

    /// Open the cache and sweep expired entries.
    pub async fn initialize(&self) -> ForecastResult<()> {
        self.inner.cache.open().await?;
        let purged = self.inner.cache.purge_expired().await?;
        info!(purged, ttl_secs = self.inner.cache.ttl().as_secs(), "overlay coordinator ready");
        Ok(())
    }

    /// Cancel whatever is loading and close the cache.
    pub async fn shutdown(&self) -> ForecastResult<()> {
        {
            let _map = self.inner.map.lock().await;
            let state = self.inner.state.lock().await;
            state.token.cancel();
        }
        self.inner.cache.close().await?;
        let stats = self.inner.cache.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            writes = stats.writes,
            "overlay coordinator stopped"
        );
        Ok(())
    }

    /// Start loading `selection`, superseding any load in flight.
    ///
    /// The returned handle resolves once this load mounts, fails or is
    /// cancelled; callers are free to ignore it.
    pub async fn on_selection_change(&self, selection: Selection) -> JoinHandle<LoadOutcome> {
        let token = CancellationToken::new();
        {
            let _map = self.inner.map.lock().await;
            let mut state = self.inner.state.lock().await;
            let previous = std::mem::replace(&mut state.token, token.clone());
            previous.cancel();
        }

        counter!("forecast_selection_changes_total").increment(1);
        info!(selection = %selection, "selection changed");

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(selection, token).await })
    }

    /// Show or hide the mounted overlays, now and for later mounts.
    pub async fn set_visible(&self, visible: bool) {
        let mut map = self.inner.map.lock().await;
        let state = self.inner.state.lock().await;
        self.inner.visible.store(visible, Ordering::Release);
        apply_visibility(&mut map, state.mounted, visible);
        debug!(visible, "overlay visibility changed");
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::Acquire)
    }

    /// Animated zoom on the map.
    pub async fn set_zoom(&self, zoom: f64) {
        self.inner.map.lock().await.set_zoom(zoom, true);
    }

    pub async fn mounted(&self) -> MountedLayers {
        let _map = self.inner.map.lock().await;
        self.inner.state.lock().await.mounted
    }

    /// Field behind the mounted scalar overlay.
    pub async fn scalar_field(&self) -> Option<Arc<ScalarField>> {
        let map = self.inner.map.lock().await;
        let id = self.inner.state.lock().await.mounted.scalar?;
        map.layer::<ScalarFieldOverlay>(id)?.field().cloned()
    }

    /// Field behind the mounted particle overlay.
    pub async fn vector_field(&self) -> Option<Arc<VectorField>> {
        let map = self.inner.map.lock().await;
        let id = self.inner.state.lock().await.mounted.vector?;
        map.layer::<ParticleAnimationOverlay>(id)?.field().cloned()
    }

    /// Run due timers and pending redraws.
    pub async fn pump(&self, now: Instant) -> PumpStats {
        self.inner.map.lock().await.pump(now)
    }

    /// Current map image as PNG.
    pub async fn render_png(&self) -> ForecastResult<Vec<u8>> {
        let map = self.inner.map.lock().await;
        let pixmap = map.compose()?;
        Ok(renderer::png::encode_png(&pixmap)?)
    }

    pub async fn save_frame(&self, path: &Path) -> ForecastResult<()> {
        let map = self.inner.map.lock().await;
        let pixmap = map.compose()?;
        Ok(renderer::png::save_png(&pixmap, path)?)
    }

    /// Whether any load is running.
    pub fn is_loading(&self) -> bool {
        *self.inner.loading_tx.borrow()
    }

    pub fn is_loading_scalar(&self) -> bool {
        self.inner.scalar_loads.load(Ordering::Acquire) > 0
    }

    pub fn is_loading_vector(&self) -> bool {
        self.inner.vector_loads.load(Ordering::Acquire) > 0
    }

    /// Loading indicator: true while either kind of load runs.
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading_tx.subscribe()
    }
}

fn ensure_live(token: &CancellationToken) -> ForecastResult<()> {
    if token.is_cancelled() {
        Err(ForecastError::Cancelled)
    } else {
        Ok(())
    }
}

fn scalar_from_payload(payload: &CachePayload) -> ForecastResult<ScalarField> {
    match payload {
        CachePayload::Raster { bytes } => Ok(ScalarField::from_payload(&raster::decode_scalar(bytes)?)?),
        CachePayload::VectorGrid(_) => Err(ForecastError::Decode("entry holds wind data".to_string())),
    }
}

fn vector_from_payload(payload: &CachePayload) -> ForecastResult<VectorField> {
    match payload {
        CachePayload::VectorGrid(grid) => Ok(VectorField::from_payload(grid)?),
        CachePayload::Raster { bytes } => {
            let grid = raster::decode_vector(bytes, &AtomicBool::new(false))?;
            Ok(VectorField::from_payload(&grid)?)
        }
    }
}

/// Insert `layer` where `old` sits (or at `fallback`), then drop `old`.
fn replace_layer(
    map: &mut HeadlessMap,
    old: Option<LayerId>,
    fallback: usize,
    layer: Box<dyn OverlayLayer>,
) -> RenderResult<LayerId> {
    let index = old.and_then(|id| map.layer_index(id)).unwrap_or(fallback);
    let id = map.insert_layer(index, layer)?;
    if let Some(old) = old {
        map.remove_layer(old);
    }
    Ok(id)
}

fn apply_visibility(map: &mut HeadlessMap, mounted: MountedLayers, visible: bool) {
    if let Some(id) = mounted.scalar {
        map.with_layer::<ScalarFieldOverlay, _>(id, |overlay, ctx| {
            if visible {
                overlay.show(ctx)
            } else {
                overlay.hide(ctx)
            }
        });
    }
    if let Some(id) = mounted.vector {
        map.with_layer::<ParticleAnimationOverlay, _>(id, |overlay, ctx| {
            if visible {
                overlay.show(ctx)
            } else {
                overlay.hide(ctx)
            }
        });
    }
}

/// Keeps a loading counter raised while alive.
struct LoadingGuard<'a> {
    inner: &'a Inner,
    kind: LoadKind,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.counter(self.kind).fetch_sub(1, Ordering::AcqRel);
        self.inner.publish_loading();
    }
}

impl Inner {
    fn counter(&self, kind: LoadKind) -> &AtomicUsize {
        match kind {
            LoadKind::Scalar => &self.scalar_loads,
            LoadKind::Vector => &self.vector_loads,
        }
    }

    fn begin_loading(&self, kind: LoadKind) -> LoadingGuard<'_> {
        self.counter(kind).fetch_add(1, Ordering::AcqRel);
        self.publish_loading();
        LoadingGuard { inner: self, kind }
    }

    fn publish_loading(&self) {
        let loading =
            self.scalar_loads.load(Ordering::Acquire) > 0 || self.vector_loads.load(Ordering::Acquire) > 0;
        self.loading_tx.send_if_modified(|current| {
            if *current == loading {
                false
            } else {
                *current = loading;
                true
            }
        });
    }

    async fn run(self: Arc<Self>, selection: Selection, token: CancellationToken) -> LoadOutcome {
        let outcome = match self.load(&selection, &token).await {
            Ok(()) => {
                info!(selection = %selection, "overlay mounted");
                LoadOutcome::Mounted
            }
            Err(e) if e.is_cancelled() => {
                debug!(selection = %selection, "load superseded");
                LoadOutcome::Cancelled
            }
            Err(e) => {
                warn!(
                    selection = %selection,
                    kind = e.kind(),
                    error = %e,
                    "overlay load failed, keeping previous overlay"
                );
                LoadOutcome::Failed(e)
            }
        };
        counter!("forecast_loads_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn load(&self, selection: &Selection, token: &CancellationToken) -> ForecastResult<()> {
        match self.resolver.resolve(selection)? {
            ResourcePlan::Scalar { url, ramp } => {
                let _loading = self.begin_loading(LoadKind::Scalar);
                let loaded = self.load_scalar(&url, token).await?;
                self.mount(token, Mount::Scalar { field: loaded.field, ramp })
                    .await?;
                self.remember(token, &url, loaded.fresh).await;
            }
            ResourcePlan::Wind { url, speed_ramp } => {
                let _loading = self.begin_loading(LoadKind::Vector);
                let loaded = self.load_vector(&url, token).await?;
                let speed = Arc::new(ScalarField::from_vector_magnitudes(&loaded.field));
                self.mount(
                    token,
                    Mount::Wind {
                        field: loaded.field,
                        speed,
                        speed_ramp,
                    },
                )
                .await?;
                self.remember(token, &url, loaded.fresh).await;
            }
        }
        Ok(())
    }

    /// Fresh cache entry, with read errors treated as a miss.
    async fn cached(&self, url: &str) -> Option<CachePayload> {
        match self.cache.lookup_fresh(url).await {
            Ok(entry) => entry.map(|e| e.payload),
            Err(e) => {
                warn!(url = %url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// Persist a freshly fetched payload unless the load has been superseded.
    ///
    /// Cancellation takes the state lock, so a write either completes before
    /// the cancel or never starts.
    async fn remember(&self, token: &CancellationToken, url: &str, payload: Option<CachePayload>) {
        let Some(payload) = payload else {
            return;
        };
        let _state = self.state.lock().await;
        if token.is_cancelled() {
            debug!(url = %url, "load superseded, skipping cache write");
            return;
        }
        if let Err(e) = self.cache.store_payload(url, payload).await {
            warn!(url = %url, error = %e, "cache write failed");
        }
    }

    #[instrument(skip(self, token))]
    async fn load_scalar(&self, url: &str, token: &CancellationToken) -> ForecastResult<Loaded<ScalarField>> {
        if let Some(payload) = self.cached(url).await {
            ensure_live(token)?;
            match scalar_from_payload(&payload) {
                Ok(field) => {
                    return Ok(Loaded {
                        field: Arc::new(field),
                        fresh: None,
                    })
                }
                Err(e) => warn!(error = %e, "unusable cache entry, fetching again"),
            }
        }

        ensure_live(token)?;
        let bytes = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ForecastError::Cancelled),
            fetched = self.store.fetch(url) => fetched?,
        };

        let payload = CachePayload::Raster { bytes: bytes.to_vec() };
        let field = scalar_from_payload(&payload).inspect_err(|_| {
            counter!("forecast_decode_failures_total").increment(1);
        })?;
        ensure_live(token)?;

        Ok(Loaded {
            field: Arc::new(field),
            fresh: Some(payload),
        })
    }

    #[instrument(skip(self, token))]
    async fn load_vector(&self, url: &str, token: &CancellationToken) -> ForecastResult<Loaded<VectorField>> {
        if let Some(payload) = self.cached(url).await {
            ensure_live(token)?;
            match vector_from_payload(&payload) {
                Ok(field) => {
                    return Ok(Loaded {
                        field: Arc::new(field),
                        fresh: None,
                    })
                }
                Err(e) => warn!(error = %e, "unusable cache entry, fetching again"),
            }
        }

        ensure_live(token)?;
        // Dropping the ticket on cancellation terminates the job.
        let mut ticket = self.workers.submit(url);
        let grid = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ForecastError::Cancelled),
            payload = ticket.payload() => payload?,
        };
        ensure_live(token)?;

        let field = VectorField::from_payload(&grid)?;
        Ok(Loaded {
            field: Arc::new(field),
            fresh: Some(CachePayload::VectorGrid(grid)),
        })
    }

    /// Swap new overlays in under the map lock.
    async fn mount(&self, token: &CancellationToken, mount: Mount) -> ForecastResult<()> {
        let mut map = self.map.lock().await;
        let mut state = self.state.lock().await;
        ensure_live(token)?;

        let mut mounted = state.mounted;
        match mount {
            Mount::Scalar { field, ramp } => {
                let overlay = ScalarFieldOverlay::with_field(ramp, field);
                mounted.scalar = Some(replace_layer(&mut map, mounted.scalar, 0, Box::new(overlay))?);
                if let Some(old) = mounted.vector.take() {
                    map.remove_layer(old);
                }
            }
            Mount::Wind {
                field,
                speed,
                speed_ramp,
            } => {
                let particles = ParticleAnimationOverlay::with_field(self.particles.clone(), field)?;
                let underlay = ScalarFieldOverlay::with_field(speed_ramp, speed);
                mounted.scalar = Some(replace_layer(&mut map, mounted.scalar, 0, Box::new(underlay))?);
                // The old underlay is gone, record the new one first.
                state.mounted = mounted;
                let top = map.layer_count();
                mounted.vector = Some(replace_layer(&mut map, mounted.vector, top, Box::new(particles))?);
            }
        }
        state.mounted = mounted;

        if !self.visible.load(Ordering::Acquire) {
            apply_visibility(&mut map, mounted, false);
        }
        debug!(scalar = ?mounted.scalar, vector = ?mounted.vector, "overlays swapped");
        Ok(())
    }
}
