//! Synthetic forecast data for tests.
//!
//! All generators are deterministic so assertions can rely on exact
//! values. Arrays are row-major with row 0 at the northern edge, the
//! layout the raster codec uses.

use std::sync::Arc;

use bytes::Bytes;
use field::{raster, ScalarField, VectorField};
use forecast_common::GridSpec;

/// No-data marker used by every generated raster.
pub const NO_DATA: f32 = -9999.0;

/// Creates a grid with predictable values.
///
/// Each cell value is `col * 1000 + row`, so a misplaced sample is easy
/// to spot.
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0);
/// assert_eq!(grid[10], 1.0);
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Temperature-like values in °C, cold in the north-west, warm in the south-east.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            data.push(-10.0 + x_factor * 20.0 + y_factor * 20.0);
        }
    }
    data
}

/// Constant U/V components.
pub fn create_uniform_wind(width: usize, height: usize, u: f32, v: f32) -> (Vec<f32>, Vec<f32>) {
    let n = width * height;
    (vec![u; n], vec![v; n])
}

/// Solid-body rotation around the grid center, `max_speed` at the corners.
pub fn create_vortex_wind(width: usize, height: usize, max_speed: f32) -> (Vec<f32>, Vec<f32>) {
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);

    let mut u = Vec::with_capacity(width * height);
    let mut v = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let dx = col as f32 - cx;
            // Rows grow southwards, flip to get a northward axis
            let dy = cy - row as f32;
            let k = max_speed / max_dist;
            u.push(-dy * k);
            v.push(dx * k);
        }
    }
    (u, v)
}

/// Blank out the first `cols` columns of every row.
pub fn mask_west_columns(values: &mut [f32], width: usize, cols: usize) {
    for (idx, value) in values.iter_mut().enumerate() {
        if idx % width < cols {
            *value = NO_DATA;
        }
    }
}

/// Encoded single-band raster.
pub fn scalar_raster(grid: &GridSpec, values: &[f32]) -> Bytes {
    raster::encode(grid, NO_DATA, &[values]).expect("scalar raster fixture")
}

/// Encoded two-band (U, V) raster.
pub fn wind_raster(grid: &GridSpec, u: &[f32], v: &[f32]) -> Bytes {
    raster::encode(grid, NO_DATA, &[u, v]).expect("wind raster fixture")
}

/// Vortex wind raster on `grid`.
pub fn vortex_wind_raster(grid: &GridSpec, max_speed: f32) -> Bytes {
    let (u, v) = create_vortex_wind(grid.n_cols, grid.n_rows, max_speed);
    wind_raster(grid, &u, &v)
}

/// Temperature raster on `grid`.
pub fn temperature_raster(grid: &GridSpec) -> Bytes {
    scalar_raster(grid, &create_temperature_grid(grid.n_cols, grid.n_rows))
}

/// Shared uniform wind field.
pub fn uniform_vector_field(grid: GridSpec, u: f32, v: f32) -> Arc<VectorField> {
    let (us, vs) = create_uniform_wind(grid.n_cols, grid.n_rows, u, v);
    Arc::new(VectorField::from_components(grid, &us, &vs, NO_DATA).expect("uniform wind fixture"))
}

/// Shared temperature field.
pub fn temperature_field(grid: GridSpec) -> Arc<ScalarField> {
    let values = create_temperature_grid(grid.n_cols, grid.n_rows);
    Arc::new(ScalarField::from_values(grid, &values, NO_DATA).expect("temperature fixture"))
}
