//! Synthetic forecast rasters for trying the viewer without a server.

use std::f64::consts::PI;

use chrono::NaiveDate;
use tracing::{debug, info};

use field::raster;
use forecast_common::{ForecastResult, ForecastWindow, GridSpec, OverlayKind};
use storage::RasterStore;

use crate::resource::{ResourceResolver, WIND_VECTOR_CODE};

pub const NO_DATA: f32 = -9999.0;

/// Quarter-degree grid over the Balkans.
pub fn demo_grid() -> GridSpec {
    GridSpec::new(40, 32, 13.0, 39.0, 0.25, 0.25)
}

/// Write every registered overlay for every day of the run starting at
/// `start`. Returns the number of rasters written.
pub async fn write_demo_rasters(
    store: &RasterStore,
    resolver: &ResourceResolver,
    start: NaiveDate,
    clip: bool,
) -> ForecastResult<usize> {
    let grid = demo_grid();
    let mut written = 0;

    for (day, target) in ForecastWindow::new(start).dates().into_iter().enumerate() {
        for kind in OverlayKind::ALL {
            if !resolver.registry().contains(kind) {
                continue;
            }

            let (url, data) = if kind.is_vector() {
                let (mut u, mut v) = wind_components(&grid, day);
                if clip {
                    mask_outside(&grid, &mut u);
                    mask_outside(&grid, &mut v);
                }
                let url = resolver.raster_url(WIND_VECTOR_CODE, start, target, clip);
                (url, raster::encode(&grid, NO_DATA, &[&u, &v])?)
            } else {
                let mut values = scalar_values(&grid, kind, day);
                if clip {
                    mask_outside(&grid, &mut values);
                }
                let url = resolver.raster_url(resolver.registry().code(kind)?, start, target, clip);
                (url, raster::encode(&grid, NO_DATA, &[&values])?)
            };

            debug!(url = %url, size = data.len(), "writing demo raster");
            store.put(&url, data).await?;
            written += 1;
        }
    }

    info!(written, start = %start, clip, "demo rasters written");
    Ok(written)
}

fn normalized(grid: &GridSpec, col: usize, row: usize) -> (f64, f64) {
    let x = col as f64 / (grid.n_cols.max(2) - 1) as f64;
    let y = row as f64 / (grid.n_rows.max(2) - 1) as f64;
    (x, y)
}

fn scalar_values(grid: &GridSpec, kind: OverlayKind, day: usize) -> Vec<f32> {
    let phase = day as f64 * PI / 5.0;
    let mut values = Vec::with_capacity(grid.len());

    for row in 0..grid.n_rows {
        for col in 0..grid.n_cols {
            let (x, y) = normalized(grid, col, row);
            let wave = (2.0 * PI * x + phase).sin() * (PI * y).cos();
            let value = match kind {
                // Row 0 is north, so colder at small y.
                OverlayKind::TemperatureMean => 8.0 + 14.0 * y + 3.0 * wave,
                OverlayKind::TemperatureMin => 1.0 + 12.0 * y + 3.0 * wave,
                OverlayKind::TemperatureMax => 15.0 + 16.0 * y + 3.0 * wave,
                OverlayKind::Humidity => 60.0 + 35.0 * wave,
                OverlayKind::Rainfall => (40.0 * wave).max(0.0),
                OverlayKind::CloudCover => (50.0 + 60.0 * wave).clamp(0.0, 100.0),
                OverlayKind::Wind => 0.0,
            };
            values.push(value as f32);
        }
    }
    values
}

/// Counter-clockwise vortex drifting east over the run.
fn wind_components(grid: &GridSpec, day: usize) -> (Vec<f32>, Vec<f32>) {
    let cx = 0.3 + 0.04 * day as f64;
    let cy = 0.5;
    let mut u = Vec::with_capacity(grid.len());
    let mut v = Vec::with_capacity(grid.len());

    for row in 0..grid.n_rows {
        for col in 0..grid.n_cols {
            let (x, y) = normalized(grid, col, row);
            // Northward is -y on the grid.
            let dx = x - cx;
            let dy = cy - y;
            let r = (dx * dx + dy * dy).sqrt().max(1e-6);
            let speed = 18.0 * (r / 0.25) * (-r / 0.25).exp();
            u.push((-dy / r * speed + 2.0) as f32);
            v.push((dx / r * speed) as f32);
        }
    }
    (u, v)
}

/// Blank everything outside an ellipse standing in for the country outline.
fn mask_outside(grid: &GridSpec, values: &mut [f32]) {
    for row in 0..grid.n_rows {
        for col in 0..grid.n_cols {
            let (x, y) = normalized(grid, col, row);
            let d = ((x - 0.5) / 0.4).powi(2) + ((y - 0.5) / 0.4).powi(2);
            if d > 1.0 {
                values[grid.flat_index(col, row)] = NO_DATA;
            }
        }
    }
}
