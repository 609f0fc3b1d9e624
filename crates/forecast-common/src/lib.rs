//! Common types and utilities shared across the forecast overlay crates.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod overlay;
pub mod style;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{ForecastError, ForecastResult};
pub use grid::GridSpec;
pub use overlay::{OverlayKind, Selection};
pub use style::{ColorRamp, ColorStop, Rgba};
pub use time::ForecastWindow;
