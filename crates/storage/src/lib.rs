//! Storage for the forecast overlay client.
//!
//! Provides:
//! - [`RasterStore`]: remote raster files over `object_store` (HTTP, local, memory)
//! - [`CacheStore`]: durable key-value store of cache entries, with file and
//!   in-memory backends
//! - [`ForecastCache`]: TTL policy and counters on top of a cache store

pub mod cache;
pub mod file_cache;
pub mod memory_cache;
pub mod raster_store;

pub use cache::{CacheEntry, CachePayload, CacheStats, CacheStore, EntryPredicate, ForecastCache, DEFAULT_TTL};
pub use file_cache::FileCacheStore;
pub use memory_cache::MemoryCacheStore;
pub use raster_store::{RasterBackend, RasterStore, RasterStoreConfig};
