//! Combined raster wire format.
//!
//! One canonical layout for every forecast raster, little-endian:
//!
//! | bytes | field |
//! |---|---|
//! | 4 | magic `FGRD` |
//! | 2 | version (1) |
//! | 2 | band count |
//! | 4 + 4 | n_cols, n_rows |
//! | 8 × 4 | x_ll, y_ll, dx, dy |
//! | 4 | no-data value (f32) |
//! | … | band-major f32 samples, row 0 = north |
//!
//! Scalar rasters carry one band, wind rasters two (U then V).

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use forecast_common::GridSpec;

use crate::{FieldError, FieldResult};

pub const MAGIC: &[u8; 4] = b"FGRD";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 4 + 8 * 4 + 4;

/// Decoded raster header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    pub bands: u16,
    pub grid: GridSpec,
    pub no_data: f32,
}

/// Single-band grid as delivered by the raster decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarGridPayload {
    pub grid: GridSpec,
    pub no_data: f32,
    pub values: Vec<f32>,
}

/// Parallel U/V component arrays plus grid metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorGridPayload {
    pub grid: GridSpec,
    pub no_data: f32,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
}

/// Parse and validate the fixed-size header.
pub fn read_header(bytes: &[u8]) -> FieldResult<RasterHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(FieldError::decode(format!(
            "raster too short: {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let mut buf = bytes;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(FieldError::decode(format!("bad magic {:?}", magic)));
    }

    let version = buf.get_u16_le();
    if version != VERSION {
        return Err(FieldError::decode(format!("unsupported version {}", version)));
    }

    let bands = buf.get_u16_le();
    let n_cols = buf.get_u32_le() as usize;
    let n_rows = buf.get_u32_le() as usize;
    let x_ll = buf.get_f64_le();
    let y_ll = buf.get_f64_le();
    let dx = buf.get_f64_le();
    let dy = buf.get_f64_le();
    let no_data = buf.get_f32_le();

    let grid = GridSpec::new(n_cols, n_rows, x_ll, y_ll, dx, dy);
    grid.validate().map_err(FieldError::decode)?;

    if bands == 0 {
        return Err(FieldError::decode("raster has no bands"));
    }

    let expected = grid
        .len()
        .checked_mul(bands as usize)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| {
            FieldError::decode(format!(
                "raster size overflows: {} bands of {}x{}",
                bands, grid.n_cols, grid.n_rows
            ))
        })?;
    if bytes.len() < expected {
        return Err(FieldError::decode(format!(
            "truncated raster: {} bytes, expected {}",
            bytes.len(),
            expected
        )));
    }

    Ok(RasterHeader {
        bands,
        grid,
        no_data,
    })
}

/// Read one band row by row, polling `cancel` between rows.
fn read_band(bytes: &[u8], header: &RasterHeader, band: usize, cancel: &AtomicBool) -> FieldResult<Vec<f32>> {
    let n_cols = header.grid.n_cols;
    let band_len = header.grid.len();
    let mut buf = &bytes[HEADER_LEN + band * band_len * 4..];
    let mut values = Vec::with_capacity(band_len);

    for _ in 0..header.grid.n_rows {
        if cancel.load(Ordering::Relaxed) {
            return Err(FieldError::Cancelled);
        }
        for _ in 0..n_cols {
            values.push(buf.get_f32_le());
        }
    }

    Ok(values)
}

/// Decode a scalar raster (first band).
pub fn decode_scalar(bytes: &[u8]) -> FieldResult<ScalarGridPayload> {
    let header = read_header(bytes)?;
    let never = AtomicBool::new(false);
    let values = read_band(bytes, &header, 0, &never)?;

    Ok(ScalarGridPayload {
        grid: header.grid,
        no_data: header.no_data,
        values,
    })
}

/// Decode a two-band wind raster into U/V arrays.
///
/// Returns [`FieldError::Cancelled`] as soon as `cancel` is observed set.
pub fn decode_vector(bytes: &[u8], cancel: &AtomicBool) -> FieldResult<VectorGridPayload> {
    let header = read_header(bytes)?;
    if header.bands != 2 {
        return Err(FieldError::decode(format!(
            "wind raster needs 2 bands (U, V), found {}",
            header.bands
        )));
    }

    let u = read_band(bytes, &header, 0, cancel)?;
    let v = read_band(bytes, &header, 1, cancel)?;
    debug!(
        cols = header.grid.n_cols,
        rows = header.grid.n_rows,
        "decoded wind raster"
    );

    Ok(VectorGridPayload {
        grid: header.grid,
        no_data: header.no_data,
        u,
        v,
    })
}

/// Encode bands into the wire format.
pub fn encode(grid: &GridSpec, no_data: f32, bands: &[&[f32]]) -> FieldResult<Bytes> {
    grid.validate().map_err(FieldError::invalid_grid)?;
    if bands.is_empty() || bands.len() > u16::MAX as usize {
        return Err(FieldError::invalid_grid(format!("bad band count {}", bands.len())));
    }
    if let Some(bad) = bands.iter().find(|b| b.len() != grid.len()) {
        return Err(FieldError::invalid_grid(format!(
            "band has {} values, grid needs {}",
            bad.len(),
            grid.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + bands.len() * grid.len() * 4);
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u16_le(bands.len() as u16);
    buf.put_u32_le(grid.n_cols as u32);
    buf.put_u32_le(grid.n_rows as u32);
    buf.put_f64_le(grid.x_ll);
    buf.put_f64_le(grid.y_ll);
    buf.put_f64_le(grid.dx);
    buf.put_f64_le(grid.dy);
    buf.put_f32_le(no_data);
    for band in bands {
        for &value in band.iter() {
            buf.put_f32_le(value);
        }
    }

    Ok(buf.freeze())
}
