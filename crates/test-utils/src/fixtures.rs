//! Common test fixtures for forecast overlay tests.

/// Common bounding boxes as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// Balkan peninsula, the extent of the small grids below
    pub const BALKANS: (f64, f64, f64, f64) = (13.0, 39.0, 29.0, 47.0);
}

/// Grid specifications for rasters.
pub mod grid {
    use forecast_common::GridSpec;

    /// 0.25° grid over the Balkans (64 x 32)
    pub const BALKANS_QUARTER_DEG: GridSpec = GridSpec {
        n_cols: 64,
        n_rows: 32,
        x_ll: 13.0,
        y_ll: 39.0,
        dx: 0.25,
        dy: 0.25,
    };

    /// 1° grid, 20 x 10, small enough to reason about by hand
    pub const SIMPLE_20X10: GridSpec = GridSpec {
        n_cols: 20,
        n_rows: 10,
        x_ll: -10.0,
        y_ll: -5.0,
        dx: 1.0,
        dy: 1.0,
    };

    /// Global 1° grid on the 0–360° longitude convention
    pub const GLOBAL_0_360: GridSpec = GridSpec {
        n_cols: 360,
        n_rows: 180,
        x_ll: 0.0,
        y_ll: -90.0,
        dx: 1.0,
        dy: 1.0,
    };
}

/// Forecast dates.
pub mod dates {
    use chrono::NaiveDate;

    /// First day of the reference forecast run (2024-03-01)
    pub fn forecast_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
    }

    /// `offset` days into the reference run
    pub fn target(offset: i64) -> NaiveDate {
        forecast_start() + chrono::Duration::days(offset)
    }
}

/// Remote store layout.
pub mod store {
    /// Base URL used by tests backed by an in-memory store
    pub const BASE_URL: &str = "https://forecast.test/rasters";

    /// Raster file extension
    pub const EXTENSION: &str = "fgrd";
}

/// Scratch directory for file-backed stores, removed on drop.
pub fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir")
}
