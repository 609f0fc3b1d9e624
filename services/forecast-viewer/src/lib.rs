//! Ten-day forecast overlay viewer.
//!
//! Wires selection changes to raster loading, caching, background wind
//! decoding and the map overlays that draw the result.

pub mod config;
pub mod coordinator;
pub mod demo;
pub mod resource;
pub mod worker;

pub use config::{CacheBackend, CacheConfig, MapConfig, ParticleSettings, ViewerConfig};
pub use coordinator::{LoadOutcome, MountedLayers, OverlayLoadCoordinator};
pub use resource::{OverlayRegistry, OverlayStyle, ResourcePlan, ResourceResolver, WIND_VECTOR_CODE};
pub use worker::{DecodeRequest, DecodeWorkerPool, JobErrorKind, WorkerResponse, WorkerTicket};
