//! Coordinate reference system transformations.
//!
//! Implements map projections from scratch without external dependencies.

pub mod mercator;

pub use mercator::{WebMercator, MAX_LATITUDE, TILE_SIZE};
