//! Regular lat/lon output grid: geometry and cell location.
//! All coordinate math uses f64.

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, Result};

/// A regular latitude/longitude grid, immutable after construction.
///
/// Cells are addressed row-major: `index = row * cols + col`, with row 0 at
/// `lat_min` and column 0 at `lon_min`. Every valid index lies in
/// `[0, rows * cols)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    d_lat: f64,
    d_lon: f64,
    rows: usize,
    cols: usize,
}

impl GridSpec {
    /// Build a grid covering `lat_range` × `lon_range` with cells of
    /// `cell_size` degrees. Fails if the ranges are unordered, a cell size is
    /// not a positive finite number, or the grid would contain zero cells.
    pub fn new(lat_range: (f64, f64), lon_range: (f64, f64), cell_size: (f64, f64)) -> Result<Self> {
        let (lat_min, lat_max) = lat_range;
        let (lon_min, lon_max) = lon_range;
        let (d_lat, d_lon) = cell_size;

        if !(lat_min < lat_max) || !lat_min.is_finite() || !lat_max.is_finite() {
            return Err(AggregationError::InvalidGrid(format!(
                "latitude range {lat_min}..{lat_max} is not an ordered finite interval"
            )));
        }
        if !(lon_min < lon_max) || !lon_min.is_finite() || !lon_max.is_finite() {
            return Err(AggregationError::InvalidGrid(format!(
                "longitude range {lon_min}..{lon_max} is not an ordered finite interval"
            )));
        }
        if !(d_lat > 0.0) || !d_lat.is_finite() || !(d_lon > 0.0) || !d_lon.is_finite() {
            return Err(AggregationError::InvalidGrid(format!(
                "cell size {d_lat}°×{d_lon}° must be positive and finite"
            )));
        }

        let rows = ((lat_max - lat_min) / d_lat).ceil() as usize;
        let cols = ((lon_max - lon_min) / d_lon).ceil() as usize;
        if rows == 0 || cols == 0 {
            return Err(AggregationError::InvalidGrid(format!(
                "grid of {rows}×{cols} cells is empty"
            )));
        }

        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            d_lat,
            d_lon,
            rows,
            cols,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn lat_range(&self) -> (f64, f64) {
        (self.lat_min, self.lat_max)
    }

    #[inline]
    pub fn lon_range(&self) -> (f64, f64) {
        (self.lon_min, self.lon_max)
    }

    #[inline]
    pub fn cell_size(&self) -> (f64, f64) {
        (self.d_lat, self.d_lon)
    }

    /// Linear cell index of `(row, col)`.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Invert [`index`](Self::index): linear cell index back to `(row, col)`.
    #[inline]
    pub fn cell_of(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    /// Locate a single coordinate pair on the grid.
    ///
    /// `row = round((lat − lat_min) / d_lat)` and likewise for columns, with
    /// ties rounding half-to-even. Points that round outside
    /// `[0, rows) × [0, cols)` (including NaN coordinates) return `None` and
    /// never touch a statistic.
    pub fn locate(&self, lat: f64, lon: f64) -> Option<usize> {
        let row = ((lat - self.lat_min) / self.d_lat).round_ties_even();
        let col = ((lon - self.lon_min) / self.d_lon).round_ties_even();
        if row >= 0.0 && row < self.rows as f64 && col >= 0.0 && col < self.cols as f64 {
            Some(self.index(row as usize, col as usize))
        } else {
            None
        }
    }

    /// Locate a whole pixel batch at once.
    ///
    /// Returns the per-pixel cell assignment plus the distinct set of cells
    /// touched (ascending), so callers iterate once per occupied cell rather
    /// than once per pixel.
    pub fn locate_batch(&self, lat: &[f64], lon: &[f64]) -> CellMap {
        debug_assert_eq!(lat.len(), lon.len());
        let cells: Vec<Option<usize>> = lat
            .iter()
            .zip(lon.iter())
            .map(|(&la, &lo)| self.locate(la, lo))
            .collect();

        let mut touched: Vec<usize> = cells.iter().flatten().copied().collect();
        touched.sort_unstable();
        touched.dedup();

        CellMap { cells, touched }
    }
}

/// Result of locating a batch of pixels.
#[derive(Debug, Clone)]
pub struct CellMap {
    /// Per-pixel cell index; `None` for out-of-grid pixels.
    pub cells: Vec<Option<usize>>,
    /// Distinct cells touched by the batch, ascending.
    pub touched: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x2() -> GridSpec {
        GridSpec::new((0.0, 2.0), (0.0, 2.0), (1.0, 1.0)).unwrap()
    }

    #[test]
    fn index_cell_of_is_a_bijection() {
        let g = GridSpec::new((-90.0, 90.0), (-180.0, 180.0), (1.0, 1.0)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for row in 0..g.rows() {
            for col in 0..g.cols() {
                let idx = g.index(row, col);
                assert!(idx < g.n_cells(), "index {idx} out of range");
                assert!(seen.insert(idx), "index {idx} assigned twice");
                assert_eq!(g.cell_of(idx), (row, col));
            }
        }
        assert_eq!(seen.len(), g.n_cells());
    }

    #[test]
    fn one_degree_global_grid_has_180x360_cells() {
        let g = GridSpec::new((-90.0, 90.0), (-180.0, 180.0), (1.0, 1.0)).unwrap();
        assert_eq!(g.rows(), 180);
        assert_eq!(g.cols(), 360);
    }

    #[test]
    fn locate_rounds_to_nearest_cell() {
        let g = grid_2x2();
        assert_eq!(g.locate(0.2, 0.2), Some(0));
        assert_eq!(g.locate(0.2, 1.2), Some(1));
        assert_eq!(g.locate(1.2, 0.2), Some(2));
        assert_eq!(g.locate(1.2, 1.2), Some(3));
    }

    #[test]
    fn locate_ties_round_half_to_even() {
        let g = grid_2x2();
        // 0.5 rounds down to row 0, 1.5 rounds up to row 2 (out of bounds).
        assert_eq!(g.locate(0.5, 0.0), Some(0));
        assert_eq!(g.locate(1.5, 0.0), None);
    }

    #[test]
    fn locate_out_of_bounds_returns_none() {
        let g = grid_2x2();
        assert_eq!(g.locate(-1.0, 0.2), None);
        assert_eq!(g.locate(0.2, 5.0), None);
        assert_eq!(g.locate(1.6, 0.2), None, "rounds to row 2, past the grid");
        assert_eq!(g.locate(f64::NAN, 0.2), None);
        assert_eq!(g.locate(0.2, f64::NAN), None);
    }

    #[test]
    fn locate_batch_touched_is_sorted_and_unique() {
        let g = grid_2x2();
        let lat = [1.2, 0.2, 1.2, f64::NAN];
        let lon = [0.2, 0.2, 0.2, 0.2];
        let map = g.locate_batch(&lat, &lon);
        assert_eq!(map.cells, vec![Some(2), Some(0), Some(2), None]);
        assert_eq!(map.touched, vec![0, 2]);
    }

    #[test]
    fn new_rejects_degenerate_geometry() {
        assert!(GridSpec::new((2.0, 0.0), (0.0, 2.0), (1.0, 1.0)).is_err());
        assert!(GridSpec::new((0.0, 2.0), (0.0, 2.0), (0.0, 1.0)).is_err());
        assert!(GridSpec::new((0.0, 2.0), (0.0, 2.0), (-1.0, 1.0)).is_err());
        assert!(GridSpec::new((0.0, 2.0), (0.0, 2.0), (f64::NAN, 1.0)).is_err());
        assert!(GridSpec::new((0.0, f64::NAN), (0.0, 2.0), (1.0, 1.0)).is_err());
    }
}
