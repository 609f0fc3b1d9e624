//! Grid specifications for forecast rasters.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Specification of a regular lon/lat raster grid.
///
/// Samples are stored row-major, x ascending along a row and y descending
/// from row to row: row 0 is the northern edge. `x_ll`/`y_ll` locate the
/// lower-left corner of the lower-left cell (cell edges, not centers).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns (x / longitude direction)
    pub n_cols: usize,
    /// Number of rows (y / latitude direction)
    pub n_rows: usize,
    /// Lower-left corner x
    pub x_ll: f64,
    /// Lower-left corner y
    pub y_ll: f64,
    /// Cell size in x
    pub dx: f64,
    /// Cell size in y
    pub dy: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(n_cols: usize, n_rows: usize, x_ll: f64, y_ll: f64, dx: f64, dy: f64) -> Self {
        Self {
            n_cols,
            n_rows,
            x_ll,
            y_ll,
            dx,
            dy,
        }
    }

    /// Upper-right corner x.
    pub fn x_ur(&self) -> f64 {
        self.x_ll + self.n_cols as f64 * self.dx
    }

    /// Upper-right corner y.
    pub fn y_ur(&self) -> f64 {
        self.y_ll + self.n_rows as f64 * self.dy
    }

    /// Calculate the bounding box of this grid (outer cell edges).
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x_ll, self.y_ll, self.x_ur(), self.y_ur())
    }

    /// True when the grid is published on the 0–360° longitude convention.
    pub fn uses_0_360(&self) -> bool {
        self.x_ll >= 0.0 && self.x_ur() > 180.0
    }

    /// Bring a longitude onto this grid's convention.
    pub fn normalize_x(&self, x: f64) -> f64 {
        if self.uses_0_360() && x < 0.0 {
            x + 360.0
        } else {
            x
        }
    }

    /// Fractional (column, row) position of a coordinate, row measured from the top.
    pub fn decimal_index(&self, x: f64, y: f64) -> (f64, f64) {
        let x = self.normalize_x(x);
        let col = (x - self.x_ll) / self.dx;
        let row = (self.y_ur() - y) / self.dy;
        (col, row)
    }

    /// Convert coordinates to the cell that contains them.
    ///
    /// Points on the far east/south edge belong to the last column/row.
    pub fn cell_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let (col_f, row_f) = self.decimal_index(x, y);
        if !col_f.is_finite() || !row_f.is_finite() {
            return None;
        }
        if col_f < 0.0 || row_f < 0.0 || col_f > self.n_cols as f64 || row_f > self.n_rows as f64 {
            return None;
        }

        let col = (col_f.floor() as usize).min(self.n_cols - 1);
        let row = (row_f.floor() as usize).min(self.n_rows - 1);
        Some((col, row))
    }

    /// Center coordinates of a cell.
    pub fn cell_center(&self, col: usize, row: usize) -> Option<(f64, f64)> {
        if col >= self.n_cols || row >= self.n_rows {
            return None;
        }
        Some((
            self.x_ll + (col as f64 + 0.5) * self.dx,
            self.y_ur() - (row as f64 + 0.5) * self.dy,
        ))
    }

    /// Bounding box of a single cell.
    pub fn cell_bbox(&self, col: usize, row: usize) -> BoundingBox {
        let min_x = self.x_ll + col as f64 * self.dx;
        let max_y = self.y_ur() - row as f64 * self.dy;
        BoundingBox::new(min_x, max_y - self.dy, min_x + self.dx, max_y)
    }

    /// Get the 1D array index for a 2D grid position.
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.n_cols + col
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.n_cols * self.n_rows
    }

    /// Number of grid points, `None` when it does not fit in `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.n_cols.checked_mul(self.n_rows)
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.n_cols == 0 || self.n_rows == 0
    }

    /// Check dimensions and resolution are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err(format!("empty grid {}x{}", self.n_cols, self.n_rows));
        }
        if self.checked_len().is_none() {
            return Err(format!("grid {}x{} is too large", self.n_cols, self.n_rows));
        }
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(format!("non-positive cell size {}x{}", self.dx, self.dy));
        }
        if !self.x_ll.is_finite() || !self.y_ll.is_finite() {
            return Err("non-finite grid origin".to_string());
        }
        Ok(())
    }
}
