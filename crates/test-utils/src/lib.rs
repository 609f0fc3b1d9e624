//! Shared test utilities for the forecast overlay workspace.
//!
//! - Synthetic scalar and wind rasters, and the fields built from them
//! - Common fixtures: grids, dates, store layout
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
