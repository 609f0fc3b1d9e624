//! Spherical (Web) Mercator projection.
//!
//! Maps longitude/latitude onto a square pixel world whose side is
//! `TILE_SIZE * 2^zoom`. Pixel y grows southwards, origin at the
//! north-west corner (-180°, ~85.05°N), matching slippy-map tiles.

use std::f64::consts::PI;

use forecast_common::BoundingBox;

/// Side of one map tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit where the projection becomes square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Web Mercator projection at fractional zoom levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl WebMercator {
    /// World size in pixels at a zoom level.
    pub fn world_size(zoom: f64) -> f64 {
        TILE_SIZE * 2f64.powf(zoom)
    }

    /// Project lon/lat (degrees) to world pixel coordinates.
    pub fn project(lon: f64, lat: f64, zoom: f64) -> (f64, f64) {
        let size = Self::world_size(zoom);
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

        let x = (lon + 180.0) / 360.0 * size;
        let lat_rad = lat.to_radians();
        let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size;
        (x, y)
    }

    /// Inverse of [`WebMercator::project`].
    pub fn unproject(x: f64, y: f64, zoom: f64) -> (f64, f64) {
        let size = Self::world_size(zoom);

        let lon = x / size * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();
        (lon, lat)
    }

    /// Geographic bounds of a pixel rectangle given its top-left world pixel.
    pub fn pixel_bounds(origin: (f64, f64), width: f64, height: f64, zoom: f64) -> BoundingBox {
        let (west, north) = Self::unproject(origin.0, origin.1, zoom);
        let (east, south) = Self::unproject(origin.0 + width, origin.1 + height, zoom);
        BoundingBox::new(west, south, east, north)
    }
}
