//! Rasters as published, decoded into fields.

use std::sync::atomic::AtomicBool;

use field::{raster, FieldError, ScalarField, VectorField};
use rand::rngs::StdRng;
use rand::SeedableRng;
use test_utils::{
    create_temperature_grid, create_uniform_wind, fixtures, mask_west_columns, scalar_raster, vortex_wind_raster,
    wind_raster, NO_DATA,
};

// ============================================================================
// Masked rasters
// ============================================================================

#[test]
fn test_masked_columns_are_absent() {
    let grid = fixtures::grid::BALKANS_QUARTER_DEG;
    let mut values = create_temperature_grid(grid.n_cols, grid.n_rows);
    mask_west_columns(&mut values, grid.n_cols, 8);

    let payload = raster::decode_scalar(&scalar_raster(&grid, &values)).unwrap();
    let field = ScalarField::from_payload(&payload).unwrap();

    assert_eq!(field.valid_count(), (grid.n_cols - 8) * grid.n_rows);
    // Eight quarter-degree columns are two degrees.
    let extent = field.valid_extent().unwrap();
    assert_eq!(extent.min_x, 15.0);
    assert_eq!(extent.max_x, 29.0);

    assert!(field.contains(14.0, 43.0));
    assert!(!field.has_value_at(14.0, 43.0));
    assert!(field.has_value_at(16.0, 43.0));
}

#[test]
fn test_random_positions_land_on_values() {
    let grid = fixtures::grid::BALKANS_QUARTER_DEG;
    let (mut u, mut v) = create_uniform_wind(grid.n_cols, grid.n_rows, 3.0, 4.0);
    mask_west_columns(&mut u, grid.n_cols, 32);
    mask_west_columns(&mut v, grid.n_cols, 32);

    let payload = raster::decode_vector(&wind_raster(&grid, &u, &v), &AtomicBool::new(false)).unwrap();
    let field = VectorField::from_payload(&payload).unwrap();
    assert_eq!(field.range(), Some((5.0, 5.0)));

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let (x, y) = field.random_position(&mut rng).unwrap();
        assert!(x >= 21.0, "position {} is in the masked half", x);
        assert!(field.has_value_at(x, y));
    }
}

#[test]
fn test_all_missing_field_has_no_extent_or_range() {
    let grid = fixtures::grid::SIMPLE_20X10;
    let values = vec![NO_DATA; grid.len()];
    let payload = raster::decode_scalar(&scalar_raster(&grid, &values)).unwrap();
    let field = ScalarField::from_payload(&payload).unwrap();

    assert_eq!(field.valid_extent(), None);
    assert_eq!(field.range(), None);
    assert!(field.random_position(&mut StdRng::seed_from_u64(1)).is_none());
}

// ============================================================================
// Wind rasters
// ============================================================================

#[test]
fn test_vortex_speed_grows_outwards() {
    let grid = fixtures::grid::BALKANS_QUARTER_DEG;
    let payload = raster::decode_vector(&vortex_wind_raster(&grid, 20.0), &AtomicBool::new(false)).unwrap();
    let field = VectorField::from_payload(&payload).unwrap();
    let speed = ScalarField::from_vector_magnitudes(&field);

    let center = speed.value_at(21.0, 43.0).unwrap();
    let corner = speed.cell(0, 0).unwrap();
    assert!(center < 1.0);
    assert!((corner - 20.0).abs() < 1e-3);
    assert_eq!(speed.valid_count(), field.valid_count());
}

#[test]
fn test_cancelled_decode_stops() {
    let grid = fixtures::grid::BALKANS_QUARTER_DEG;
    let bytes = vortex_wind_raster(&grid, 20.0);
    let result = raster::decode_vector(&bytes, &AtomicBool::new(true));
    assert!(matches!(result, Err(FieldError::Cancelled)));
}

#[test]
fn test_truncated_raster_is_decode_error() {
    let grid = fixtures::grid::SIMPLE_20X10;
    let bytes = vortex_wind_raster(&grid, 5.0);
    let truncated = &bytes[..bytes.len() - 4];
    assert!(matches!(
        raster::decode_vector(truncated, &AtomicBool::new(false)),
        Err(FieldError::Decode(_))
    ));
}
