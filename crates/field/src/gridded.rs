//! Regular gridded fields of optional values.

use rand::Rng;

use forecast_common::{BoundingBox, GridSpec};

use crate::raster::{ScalarGridPayload, VectorGridPayload};
use crate::{FieldError, FieldResult, Vector};

/// A value that can live in a [`GriddedField`].
pub trait FieldValue: Copy + Send + Sync + 'static {
    /// Scalar used for range computation and stroke styling.
    fn magnitude(&self) -> f64;

    /// Bilinear blend of four neighbours, weights sum to 1.
    fn blend(samples: [(Self, f64); 4]) -> Self;
}

impl FieldValue for Vector {
    fn magnitude(&self) -> f64 {
        Vector::magnitude(self)
    }

    fn blend(samples: [(Self, f64); 4]) -> Self {
        let (u, v) = samples
            .iter()
            .fold((0.0, 0.0), |(u, v), (s, w)| (u + s.u * w, v + s.v * w));
        Vector::new(u, v)
    }
}

impl FieldValue for f32 {
    fn magnitude(&self) -> f64 {
        *self as f64
    }

    fn blend(samples: [(Self, f64); 4]) -> Self {
        samples.iter().map(|(s, w)| *s as f64 * w).sum::<f64>() as f32
    }
}

/// Wind field built from parallel U/V arrays.
pub type VectorField = GriddedField<Vector>;

/// Georeferenced scalar grid (temperature, humidity, rainfall, ...).
pub type ScalarField = GriddedField<f32>;

/// A spatial function sampled on a regular grid.
///
/// Each cell either holds a complete value or nothing. The field is
/// immutable once built; the valid extent and value range are computed
/// up front.
#[derive(Debug, Clone)]
pub struct GriddedField<T> {
    grid: GridSpec,
    values: Vec<Option<T>>,
    valid_cells: Vec<usize>,
    valid_extent: Option<BoundingBox>,
    range: Option<(f64, f64)>,
}

impl<T: FieldValue> GriddedField<T> {
    /// Build a field from one optional value per cell (row-major, north first).
    pub fn new(grid: GridSpec, values: Vec<Option<T>>) -> FieldResult<Self> {
        grid.validate().map_err(FieldError::invalid_grid)?;
        if values.len() != grid.len() {
            return Err(FieldError::invalid_grid(format!(
                "expected {} values for a {}x{} grid, got {}",
                grid.len(),
                grid.n_cols,
                grid.n_rows,
                values.len()
            )));
        }

        Ok(Self::build(grid, values))
    }

    /// Index valid cells and compute extent and range. Dimensions must already match.
    fn build(grid: GridSpec, values: Vec<Option<T>>) -> Self {
        let mut valid_cells = Vec::new();
        let mut valid_extent: Option<BoundingBox> = None;
        let mut range: Option<(f64, f64)> = None;

        for (idx, value) in values.iter().enumerate() {
            let Some(value) = value else { continue };
            valid_cells.push(idx);

            let cell = grid.cell_bbox(idx % grid.n_cols, idx / grid.n_cols);
            valid_extent = Some(match valid_extent {
                Some(extent) => extent.union(&cell),
                None => cell,
            });

            let m = value.magnitude();
            if m.is_nan() {
                continue;
            }
            range = Some(match range {
                Some((min, max)) => (min.min(m), max.max(m)),
                None => (m, m),
            });
        }

        Self {
            grid,
            values,
            valid_cells,
            valid_extent,
            range,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn n_cols(&self) -> usize {
        self.grid.n_cols
    }

    pub fn n_rows(&self) -> usize {
        self.grid.n_rows
    }

    /// Geographic extent of the whole grid.
    pub fn extent(&self) -> BoundingBox {
        self.grid.bbox()
    }

    /// Extent covered by cells holding a value, `None` for an all-empty field.
    pub fn valid_extent(&self) -> Option<BoundingBox> {
        self.valid_extent
    }

    /// `[min, max]` of the magnitude over valid cells, `None` when there are none.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// Number of cells holding a value.
    pub fn valid_count(&self) -> usize {
        self.valid_cells.len()
    }

    /// Whether the point lies inside the grid extent, valid or not.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.grid.cell_index(x, y).is_some()
    }

    /// Value stored in a cell.
    pub fn cell(&self, col: usize, row: usize) -> Option<T> {
        if col >= self.grid.n_cols || row >= self.grid.n_rows {
            return None;
        }
        self.values[self.grid.flat_index(col, row)]
    }

    /// Value of the cell containing the point, `None` when absent or outside.
    pub fn value_at(&self, x: f64, y: f64) -> Option<T> {
        let (col, row) = self.grid.cell_index(x, y)?;
        self.values[self.grid.flat_index(col, row)]
    }

    pub fn has_value_at(&self, x: f64, y: f64) -> bool {
        self.value_at(x, y).is_some()
    }

    /// Bilinear interpolation between the four surrounding cell centers.
    ///
    /// Falls back to the containing cell when a neighbour is missing.
    pub fn interpolated_value_at(&self, x: f64, y: f64) -> Option<T> {
        let nearest = self.value_at(x, y)?;

        let (col_f, row_f) = self.grid.decimal_index(x, y);
        let fi = (col_f - 0.5).max(0.0);
        let fj = (row_f - 0.5).max(0.0);
        let i0 = (fi.floor() as usize).min(self.grid.n_cols - 1);
        let j0 = (fj.floor() as usize).min(self.grid.n_rows - 1);
        let i1 = (i0 + 1).min(self.grid.n_cols - 1);
        let j1 = (j0 + 1).min(self.grid.n_rows - 1);
        let tx = (fi - i0 as f64).clamp(0.0, 1.0);
        let ty = (fj - j0 as f64).clamp(0.0, 1.0);

        let corners = (
            self.cell(i0, j0),
            self.cell(i1, j0),
            self.cell(i0, j1),
            self.cell(i1, j1),
        );
        match corners {
            (Some(g00), Some(g10), Some(g01), Some(g11)) => Some(T::blend([
                (g00, (1.0 - tx) * (1.0 - ty)),
                (g10, tx * (1.0 - ty)),
                (g01, (1.0 - tx) * ty),
                (g11, tx * ty),
            ])),
            _ => Some(nearest),
        }
    }

    /// Uniformly random position inside a random valid cell.
    pub fn random_position<R: Rng>(&self, rng: &mut R) -> Option<(f64, f64)> {
        if self.valid_cells.is_empty() {
            return None;
        }
        let idx = self.valid_cells[rng.gen_range(0..self.valid_cells.len())];
        let cell = self
            .grid
            .cell_bbox(idx % self.grid.n_cols, idx / self.grid.n_cols);

        // Stay strictly inside the cell so edge ownership never flips the lookup
        let x = cell.min_x + cell.width() * rng.gen_range(0.01..0.99);
        let y = cell.min_y + cell.height() * rng.gen_range(0.01..0.99);
        Some((x, y))
    }

    /// Iterate over (col, row, value) of valid cells.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let n_cols = self.grid.n_cols;
        self.valid_cells
            .iter()
            .filter_map(move |&idx| self.values[idx].map(|v| (idx % n_cols, idx / n_cols, v)))
    }
}

fn is_missing(value: f32, no_data: f32) -> bool {
    value.is_nan() || value == no_data
}

impl GriddedField<Vector> {
    /// Combine U and V component arrays; a cell missing either component is absent.
    pub fn from_components(grid: GridSpec, u: &[f32], v: &[f32], no_data: f32) -> FieldResult<Self> {
        if u.len() != v.len() {
            return Err(FieldError::invalid_grid(format!(
                "component length mismatch: u={} v={}",
                u.len(),
                v.len()
            )));
        }

        let values = u
            .iter()
            .zip(v)
            .map(|(&u, &v)| {
                if is_missing(u, no_data) || is_missing(v, no_data) {
                    None
                } else {
                    Some(Vector::new(u as f64, v as f64))
                }
            })
            .collect();

        Self::new(grid, values)
    }

    pub fn from_payload(payload: &VectorGridPayload) -> FieldResult<Self> {
        Self::from_components(payload.grid, &payload.u, &payload.v, payload.no_data)
    }
}

impl GriddedField<f32> {
    pub fn from_values(grid: GridSpec, values: &[f32], no_data: f32) -> FieldResult<Self> {
        let values = values
            .iter()
            .map(|&v| if is_missing(v, no_data) { None } else { Some(v) })
            .collect();
        Self::new(grid, values)
    }

    pub fn from_payload(payload: &ScalarGridPayload) -> FieldResult<Self> {
        Self::from_values(payload.grid, &payload.values, payload.no_data)
    }

    /// Speed field derived from a wind field.
    pub fn from_vector_magnitudes(field: &VectorField) -> Self {
        let values = field
            .values
            .iter()
            .map(|v| v.map(|v| v.magnitude() as f32))
            .collect();
        Self::build(field.grid, values)
    }
}
