//! Field data model for forecast overlays.
//!
//! - [`Vector`]: immutable (u, v) wind quantity
//! - [`GriddedField`]: regular grid of optional values with point queries,
//!   valid-cell extent, value range and random valid positions
//! - [`raster`]: the combined raster wire format shared by scalar and wind data

pub mod error;
pub mod gridded;
pub mod raster;
pub mod vector;

pub use error::{FieldError, FieldResult};
pub use gridded::{FieldValue, GriddedField, ScalarField, VectorField};
pub use raster::{ScalarGridPayload, VectorGridPayload};
pub use vector::Vector;
