//! Map overlays for forecast fields.
//!
//! - [`host`]: the map contract overlays are written against
//! - [`map::HeadlessMap`]: an in-process host with timers and compositing
//! - [`surface::CanvasSurface`]: raster surface following pan/zoom/resize
//! - [`field_overlay::FieldOverlay`]: click/hover sampling, filter, visibility
//! - [`particles::ParticleAnimationOverlay`]: animated wind particles
//! - [`scalar_overlay::ScalarFieldOverlay`]: color-mapped scalar grids

pub mod error;
pub mod field_overlay;
pub mod host;
pub mod layer;
pub mod map;
pub mod particles;
pub mod png;
pub mod scalar_overlay;
pub mod scheduler;
pub mod surface;

pub use error::{RenderError, RenderResult};
pub use field_overlay::{FieldFilter, FieldOverlay, FieldSample};
pub use host::{EventKind, LayerContext, LayerId, MapEvent, MapHost, ViewInfo, OVERLAY_PANE};
pub use layer::OverlayLayer;
pub use map::{HeadlessMap, PumpStats};
pub use particles::{
    Particle, ParticleAnimationOverlay, ParticleConfig, StrokeColor, StrokeWidth, ZoomStep, ZoomTuning,
};
pub use scalar_overlay::ScalarFieldOverlay;
pub use scheduler::{Scheduler, TimerHandle, TimerId};
pub use surface::CanvasSurface;
