//! Selection changes end to end: cache, fetch, worker decode, mounting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use forecast_common::{ForecastError, ForecastResult, OverlayKind, Selection};
use forecast_viewer::{LoadOutcome, OverlayLoadCoordinator, OverlayRegistry, ResourceResolver, WIND_VECTOR_CODE};
use renderer::{HeadlessMap, ParticleAnimationOverlay, ParticleConfig, ScalarFieldOverlay};
use storage::{
    CacheEntry, CachePayload, CacheStore, EntryPredicate, FileCacheStore, ForecastCache, MemoryCacheStore,
    RasterStore, DEFAULT_TTL,
};
use test_utils::fixtures::{dates, grid, store::BASE_URL, store::EXTENSION};
use test_utils::{create_uniform_wind, temp_dir, temperature_raster, vortex_wind_raster, wind_raster};

struct Harness {
    coordinator: OverlayLoadCoordinator,
    store: Arc<RasterStore>,
    cache: Arc<ForecastCache>,
}

fn particles() -> ParticleConfig {
    ParticleConfig {
        paths: 50,
        seed: Some(7),
        ..ParticleConfig::default()
    }
}

async fn harness_with(cache: Arc<ForecastCache>, registry: OverlayRegistry) -> Harness {
    let store = Arc::new(RasterStore::in_memory(BASE_URL));
    let resolver = ResourceResolver::new(BASE_URL, EXTENSION, registry);
    let map = Arc::new(Mutex::new(HeadlessMap::new(128, 96, (17.0, 43.0), 5.0)));
    let coordinator = OverlayLoadCoordinator::new(map, resolver, store.clone(), cache.clone(), particles(), 2);
    coordinator.initialize().await.unwrap();
    Harness {
        coordinator,
        store,
        cache,
    }
}

async fn harness() -> Harness {
    let cache = Arc::new(ForecastCache::new(Arc::new(MemoryCacheStore::new(64)), DEFAULT_TTL));
    harness_with(cache, OverlayRegistry::with_defaults()).await
}

fn wind(day: i64) -> Selection {
    Selection::new(OverlayKind::Wind, dates::forecast_start(), dates::target(day), false)
}

fn url(h: &Harness, code: &str, day: i64) -> String {
    h.coordinator
        .resolver()
        .raster_url(code, dates::forecast_start(), dates::target(day), false)
}

async fn put_uniform_wind(h: &Harness, day: i64, u: f32) {
    let g = grid::BALKANS_QUARTER_DEG;
    let (us, vs) = create_uniform_wind(g.n_cols, g.n_rows, u, 0.0);
    h.store
        .put(&url(h, WIND_VECTOR_CODE, day), wind_raster(&g, &us, &vs))
        .await
        .unwrap();
}

// ============================================================================
// Cache behavior
// ============================================================================

#[tokio::test]
async fn test_wind_miss_fetches_decodes_and_mounts() {
    let h = harness().await;
    let wind_url = url(&h, WIND_VECTOR_CODE, 1);
    h.store
        .put(&wind_url, vortex_wind_raster(&grid::BALKANS_QUARTER_DEG, 12.0))
        .await
        .unwrap();

    let outcome = h.coordinator.on_selection_change(wind(1)).await.await.unwrap();
    assert!(outcome.is_mounted(), "got {:?}", outcome);

    assert_eq!(h.store.fetch_count(), 1);
    let stats = h.cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.writes), (0, 1, 1));

    let entry = h.cache.lookup_fresh(&wind_url).await.unwrap().unwrap();
    assert!(matches!(entry.payload, CachePayload::VectorGrid(_)));
    assert!(entry.age(Utc::now()) < Duration::from_secs(5));

    let mounted = h.coordinator.mounted().await;
    assert!(mounted.scalar.is_some());
    assert!(mounted.vector.is_some());

    let field = h.coordinator.vector_field().await.unwrap();
    let (lo, hi) = field.range().unwrap();
    assert!(hi > lo);

    // The underlay shows the speed of the same data.
    let speed = h.coordinator.scalar_field().await.unwrap();
    let (_, speed_hi) = speed.range().unwrap();
    assert!((speed_hi - hi).abs() < 1e-3);
}

#[tokio::test]
async fn test_repeat_selection_within_ttl_hits_cache() {
    let h = harness().await;
    put_uniform_wind(&h, 0, 5.0).await;

    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());
    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());

    assert_eq!(h.store.fetch_count(), 1);
    let stats = h.cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
}

#[tokio::test]
async fn test_stale_entry_is_fetched_again() {
    let h = harness().await;
    let tmean_url = url(&h, "TMEAN", 2);
    h.store
        .put(&tmean_url, temperature_raster(&grid::BALKANS_QUARTER_DEG))
        .await
        .unwrap();
    h.cache
        .store_payload_at(
            &tmean_url,
            CachePayload::Raster { bytes: b"stale".to_vec() },
            Utc::now() - chrono::Duration::hours(25),
        )
        .await
        .unwrap();

    let selection = Selection::new(OverlayKind::TemperatureMean, dates::forecast_start(), dates::target(2), false);
    assert!(h.coordinator.on_selection_change(selection).await.await.unwrap().is_mounted());

    assert_eq!(h.store.fetch_count(), 1);
    let entry = h.cache.lookup_fresh(&tmean_url).await.unwrap().unwrap();
    assert!(entry.age(Utc::now()) < Duration::from_secs(5));
    assert_ne!(entry.payload, CachePayload::Raster { bytes: b"stale".to_vec() });
}

#[tokio::test]
async fn test_initialize_purges_expired_entries() {
    let dir = temp_dir();
    {
        let seed = ForecastCache::new(Arc::new(FileCacheStore::new(dir.path())), DEFAULT_TTL);
        seed.open().await.unwrap();
        let old = Utc::now() - chrono::Duration::hours(30);
        seed.store_payload_at("https://forecast.test/rasters/old", CachePayload::Raster { bytes: vec![1] }, old)
            .await
            .unwrap();
        seed.store_payload("https://forecast.test/rasters/new", CachePayload::Raster { bytes: vec![2] })
            .await
            .unwrap();
        seed.close().await.unwrap();
    }

    let cache = Arc::new(ForecastCache::new(Arc::new(FileCacheStore::new(dir.path())), DEFAULT_TTL));
    let h = harness_with(cache, OverlayRegistry::with_defaults()).await;

    assert_eq!(h.cache.stats().purged, 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_superseded_selection_never_mounts() {
    let h = harness().await;
    put_uniform_wind(&h, 1, 5.0).await;
    put_uniform_wind(&h, 2, 10.0).await;

    let first = h.coordinator.on_selection_change(wind(1)).await;
    let second = h.coordinator.on_selection_change(wind(2)).await;

    assert!(matches!(first.await.unwrap(), LoadOutcome::Cancelled));
    assert!(second.await.unwrap().is_mounted());

    let field = h.coordinator.vector_field().await.unwrap();
    assert_eq!(field.value_at(20.0, 43.0).unwrap().u, 10.0);
    assert!(h.cache.lookup_fresh(&url(&h, WIND_VECTOR_CODE, 1)).await.unwrap().is_none());
    assert!(!h.coordinator.is_loading());
}

#[tokio::test]
async fn test_selection_change_during_decode_discards_result() {
    let h = harness().await;
    put_uniform_wind(&h, 1, 5.0).await;
    put_uniform_wind(&h, 2, 10.0).await;

    let first = h.coordinator.on_selection_change(wind(1)).await;
    // Let the first load start and hand its raster to the worker pool.
    tokio::task::yield_now().await;
    let second = h.coordinator.on_selection_change(wind(2)).await;

    assert!(matches!(first.await.unwrap(), LoadOutcome::Cancelled));
    assert!(second.await.unwrap().is_mounted());

    let field = h.coordinator.vector_field().await.unwrap();
    assert_eq!(field.value_at(20.0, 43.0).unwrap().u, 10.0);
    assert!(h.cache.lookup_fresh(&url(&h, WIND_VECTOR_CODE, 1)).await.unwrap().is_none());

    let map = h.coordinator.map();
    assert_eq!(map.lock().await.layer_count(), 2);
}

/// Memory store whose writes take a while and are recorded when they land.
struct SlowCacheStore {
    inner: MemoryCacheStore,
    delay: Duration,
    write_started: Notify,
    writes: std::sync::Mutex<Vec<(String, Instant)>>,
}

impl SlowCacheStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryCacheStore::new(64),
            delay,
            write_started: Notify::new(),
            writes: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn writes_of(&self, url: &str) -> Vec<Instant> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl CacheStore for SlowCacheStore {
    async fn open(&self) -> ForecastResult<()> {
        self.inner.open().await
    }

    async fn close(&self) -> ForecastResult<()> {
        self.inner.close().await
    }

    async fn get(&self, key: &str) -> ForecastResult<Option<CacheEntry>> {
        self.inner.get(key).await
    }

    async fn put(&self, entry: CacheEntry) -> ForecastResult<()> {
        self.write_started.notify_one();
        tokio::time::sleep(self.delay).await;
        let url = entry.url.clone();
        self.inner.put(entry).await?;
        self.writes.lock().unwrap().push((url, Instant::now()));
        Ok(())
    }

    async fn bulk_delete(&self, keys: &[String]) -> ForecastResult<usize> {
        self.inner.bulk_delete(keys).await
    }

    async fn filter(&self, predicate: EntryPredicate<'_>) -> ForecastResult<Vec<String>> {
        self.inner.filter(predicate).await
    }
}

#[tokio::test]
async fn test_selection_change_during_cache_write_waits_for_it() {
    let slow = Arc::new(SlowCacheStore::new(Duration::from_millis(100)));
    let cache = Arc::new(ForecastCache::new(slow.clone(), DEFAULT_TTL));
    let h = harness_with(cache, OverlayRegistry::with_defaults()).await;
    put_uniform_wind(&h, 1, 5.0).await;
    put_uniform_wind(&h, 2, 10.0).await;

    let first = h.coordinator.on_selection_change(wind(1)).await;
    // The first load has mounted and is now persisting its payload.
    slow.write_started.notified().await;
    let second = h.coordinator.on_selection_change(wind(2)).await;
    let superseded_at = Instant::now();

    assert!(first.await.unwrap().is_mounted());
    assert!(second.await.unwrap().is_mounted());

    let first_writes = slow.writes_of(&url(&h, WIND_VECTOR_CODE, 1));
    assert_eq!(first_writes.len(), 1);
    assert!(first_writes.iter().all(|at| *at <= superseded_at));
    assert_eq!(slow.writes_of(&url(&h, WIND_VECTOR_CODE, 2)).len(), 1);

    let field = h.coordinator.vector_field().await.unwrap();
    assert_eq!(field.value_at(20.0, 43.0).unwrap().u, 10.0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_load_keeps_previous_overlay() {
    let h = harness().await;
    let tmax_url = url(&h, "TMAX", 0);
    h.store
        .put(&tmax_url, temperature_raster(&grid::BALKANS_QUARTER_DEG))
        .await
        .unwrap();

    let tmax = Selection::new(OverlayKind::TemperatureMax, dates::forecast_start(), dates::target(0), false);
    assert!(h.coordinator.on_selection_change(tmax).await.await.unwrap().is_mounted());
    let before = h.coordinator.mounted().await;
    let field_before = h.coordinator.scalar_field().await.unwrap();

    // Nothing published for humidity.
    let rh = Selection::new(OverlayKind::Humidity, dates::forecast_start(), dates::target(0), false);
    match h.coordinator.on_selection_change(rh).await.await.unwrap() {
        LoadOutcome::Failed(ForecastError::Transport(_)) => {}
        other => panic!("expected transport failure, got {:?}", other),
    }

    assert_eq!(h.coordinator.mounted().await, before);
    assert!(Arc::ptr_eq(&h.coordinator.scalar_field().await.unwrap(), &field_before));
    assert!(!h.coordinator.is_loading_scalar());
}

#[tokio::test]
async fn test_undecodable_wind_is_not_cached() {
    let h = harness().await;
    let wind_url = url(&h, WIND_VECTOR_CODE, 3);
    // A one-band raster where two bands are expected.
    h.store
        .put(&wind_url, temperature_raster(&grid::BALKANS_QUARTER_DEG))
        .await
        .unwrap();

    match h.coordinator.on_selection_change(wind(3)).await.await.unwrap() {
        LoadOutcome::Failed(ForecastError::Decode(msg)) => assert!(msg.contains("2 bands")),
        other => panic!("expected decode failure, got {:?}", other),
    }
    assert!(h.cache.lookup_fresh(&wind_url).await.unwrap().is_none());
    assert_eq!(h.coordinator.mounted().await.vector, None);
    assert!(!h.coordinator.is_loading_vector());
}

#[tokio::test]
async fn test_missing_wind_raster_is_a_transport_failure() {
    let h = harness().await;

    match h.coordinator.on_selection_change(wind(4)).await.await.unwrap() {
        LoadOutcome::Failed(ForecastError::Transport(msg)) => assert!(msg.contains("not found")),
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert_eq!(h.coordinator.mounted().await.vector, None);
    assert!(!h.coordinator.is_loading_vector());
}

#[tokio::test]
async fn test_unregistered_overlay_fails_without_fetching() {
    let cache = Arc::new(ForecastCache::new(Arc::new(MemoryCacheStore::new(8)), DEFAULT_TTL));
    let h = harness_with(cache, OverlayRegistry::new()).await;

    let selection = Selection::new(OverlayKind::CloudCover, dates::forecast_start(), dates::target(0), false);
    match h.coordinator.on_selection_change(selection).await.await.unwrap() {
        LoadOutcome::Failed(ForecastError::UnknownOverlay(_)) => {}
        other => panic!("expected unknown overlay, got {:?}", other),
    }
    assert_eq!(h.store.fetch_count(), 0);
}

// ============================================================================
// Map interaction
// ============================================================================

#[tokio::test]
async fn test_scalar_selection_replaces_wind_overlays() {
    let h = harness().await;
    put_uniform_wind(&h, 0, 5.0).await;
    h.store
        .put(&url(&h, "TMEAN", 0), temperature_raster(&grid::BALKANS_QUARTER_DEG))
        .await
        .unwrap();

    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());
    let tmean = Selection::new(OverlayKind::TemperatureMean, dates::forecast_start(), dates::target(0), false);
    assert!(h.coordinator.on_selection_change(tmean).await.await.unwrap().is_mounted());

    let mounted = h.coordinator.mounted().await;
    assert_eq!(mounted.vector, None);
    let map = h.coordinator.map();
    let map = map.lock().await;
    assert_eq!(map.layer_ids(), vec![mounted.scalar.unwrap()]);
}

#[tokio::test]
async fn test_hidden_overlays_stay_hidden_across_loads() {
    let h = harness().await;
    put_uniform_wind(&h, 0, 5.0).await;
    put_uniform_wind(&h, 1, 6.0).await;

    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());
    h.coordinator.set_visible(false).await;
    assert!(h.coordinator.on_selection_change(wind(1)).await.await.unwrap().is_mounted());

    let mounted = h.coordinator.mounted().await;
    let map = h.coordinator.map();
    let map = map.lock().await;
    let scalar = map.layer::<ScalarFieldOverlay>(mounted.scalar.unwrap()).unwrap();
    let particles = map.layer::<ParticleAnimationOverlay>(mounted.vector.unwrap()).unwrap();
    assert!(!scalar.base().is_visible());
    assert!(!particles.base().is_visible());
}

#[tokio::test]
async fn test_mounted_wind_animates_and_renders() {
    let h = harness().await;
    h.store
        .put(
            &url(&h, WIND_VECTOR_CODE, 0),
            vortex_wind_raster(&grid::BALKANS_QUARTER_DEG, 15.0),
        )
        .await
        .unwrap();
    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());

    let t0 = h.coordinator.map().lock().await.scheduler().now();
    let first = h.coordinator.pump(t0).await;
    assert_eq!(first.redraws, 2);
    for i in 1..=5 {
        h.coordinator.pump(t0 + Duration::from_millis(20 * i)).await;
    }

    let vector = h.coordinator.mounted().await.vector.unwrap();
    {
        let map = h.coordinator.map();
        let map = map.lock().await;
        let overlay = map.layer::<ParticleAnimationOverlay>(vector).unwrap();
        assert!(overlay.is_animating());
        assert_eq!(overlay.frames(), 5);
    }

    let png = h.coordinator.render_png().await.unwrap();
    assert_eq!(&png[1..4], b"PNG");

    h.coordinator.set_zoom(6.0).await;
    assert_eq!(h.coordinator.map().lock().await.zoom(), 6.0);
}

#[tokio::test]
async fn test_loading_signal_settles_false() {
    let h = harness().await;
    put_uniform_wind(&h, 0, 5.0).await;
    let mut loading = h.coordinator.subscribe_loading();

    assert!(h.coordinator.on_selection_change(wind(0)).await.await.unwrap().is_mounted());

    assert!(loading.has_changed().unwrap());
    assert!(!*loading.borrow_and_update());
    assert!(!h.coordinator.is_loading_scalar());
    assert!(!h.coordinator.is_loading_vector());
}

#[tokio::test]
async fn test_shutdown_closes_cache() {
    let h = harness().await;
    h.coordinator.shutdown().await.unwrap();
    assert!(h.cache.lookup_fresh("https://forecast.test/rasters/x").await.is_err());
}
