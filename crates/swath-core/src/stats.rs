//! Per-cell running aggregates: the update rule applied once per
//! (cell, variable, file), and the associative merge used by the reduction.

use crate::config::{ResolvedConfig, ResolvedVariable};
use crate::histogram::{histogram_1d, histogram_2d};

/// Running aggregates for one (cell, variable) pair.
///
/// `min`/`max` start at ±infinity so the element-wise merge treats a
/// never-visited cell as the identity; the finalizer maps a still-infinite
/// extremum to "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct CellAccumulator {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
    pub sum_sq: f64,
    pub hist_1d: Vec<u64>,
    pub hist_2d: Vec<u64>,
}

/// One file's contribution to a single (cell, variable).
///
/// For a physical variable: `tot_val` is the NaN-ignoring sum of the cell's
/// pixel values, `min_val`/`max_val` the NaN-ignoring extrema (NaN when the
/// cell has no valid sample), `count` the cell's cloud-pixel count, and
/// `samples`/`samples_2d` the raw pixel values (NaN entries are dropped by
/// the histogramming). The cloud-fraction pseudo-variable passes the fraction
/// as all three of `min_val`/`max_val`/sample, the cloud-pixel count as
/// `tot_val`, and the total pixel count as `count`.
#[derive(Debug, Clone, Copy)]
pub struct CellUpdate<'a> {
    pub min_val: f64,
    pub max_val: f64,
    pub tot_val: f64,
    pub count: u64,
    pub samples: &'a [f64],
    pub samples_2d: &'a [f64],
}

impl CellAccumulator {
    fn new(hist_1d_len: usize, hist_2d_len: usize) -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
            sum_sq: 0.0,
            hist_1d: vec![0; hist_1d_len],
            hist_2d: vec![0; hist_2d_len],
        }
    }

    /// Apply one file's cell-level contribution.
    ///
    /// Every branch is gated on the variable's statistic switches. The count
    /// increment is the cell's cloud-pixel count, so every variable's mean
    /// carries the same cloud-pixel denominator as the cloud fraction. The
    /// squared term accumulates the squared per-file cell total.
    pub fn update(&mut self, var: &ResolvedVariable, u: &CellUpdate) {
        let sw = &var.stats;

        // NaN extrema (a cell with no valid sample) fail both comparisons
        // and leave the state untouched.
        if sw.min && u.min_val < self.min {
            self.min = u.min_val;
        }
        if sw.max && u.max_val > self.max {
            self.max = u.max_val;
        }

        if sw.needs_sum() {
            self.sum += u.tot_val;
            self.count += u.count;
        }

        if sw.std {
            self.sum_sq += u.tot_val * u.tot_val;
        }

        if sw.hist_1d {
            if let Some(edges) = &var.edges_1d {
                // A single-element sample set still participates.
                for (slot, add) in self.hist_1d.iter_mut().zip(histogram_1d(u.samples, edges)) {
                    *slot += add;
                }
            }
        }

        if sw.hist_2d {
            if let (Some(edges_1d), Some(joint)) = (&var.edges_1d, &var.joint) {
                let counts = histogram_2d(u.samples, u.samples_2d, edges_1d, &joint.edges);
                for (slot, add) in self.hist_2d.iter_mut().zip(counts) {
                    *slot += add;
                }
            }
        }
    }

    /// Fold another accumulator into this one: min-of-min, max-of-max,
    /// everything else element-wise sums.
    pub fn merge_from(&mut self, other: &CellAccumulator) {
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
        self.sum += other.sum;
        self.count += other.count;
        self.sum_sq += other.sum_sq;
        for (slot, &add) in self.hist_1d.iter_mut().zip(other.hist_1d.iter()) {
            *slot += add;
        }
        for (slot, &add) in self.hist_2d.iter_mut().zip(other.hist_2d.iter()) {
            *slot += add;
        }
    }
}

/// All per-cell accumulators for one worker: dense over cells × variables.
///
/// Owned exclusively by one worker during aggregation; consumed read-only by
/// the merge step.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAccumulator {
    n_cells: usize,
    /// `vars[v][cell]`, aligned with the resolved variable order.
    vars: Vec<Vec<CellAccumulator>>,
}

impl GridAccumulator {
    /// Create an empty accumulator shaped for the given configuration.
    pub fn new(cfg: &ResolvedConfig) -> Self {
        let n_cells = cfg.grid.n_cells();
        let vars = cfg
            .variables
            .iter()
            .map(|v| vec![CellAccumulator::new(v.hist_1d_len(), v.hist_2d_len()); n_cells])
            .collect();
        Self { n_cells, vars }
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    #[inline]
    pub fn cell(&self, var_idx: usize, cell: usize) -> &CellAccumulator {
        &self.vars[var_idx][cell]
    }

    #[inline]
    pub fn cell_mut(&mut self, var_idx: usize, cell: usize) -> &mut CellAccumulator {
        &mut self.vars[var_idx][cell]
    }

    /// Merge another worker's accumulator into this one. Associative and
    /// commutative, so the reduction result is independent of worker count
    /// and file assignment.
    pub fn merge(mut self, other: GridAccumulator) -> GridAccumulator {
        debug_assert_eq!(self.n_cells, other.n_cells);
        debug_assert_eq!(self.vars.len(), other.vars.len());
        for (mine, theirs) in self.vars.iter_mut().zip(other.vars.iter()) {
            for (cell, other_cell) in mine.iter_mut().zip(theirs.iter()) {
                cell.merge_from(other_cell);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregationConfig, StatSwitches, VariableSpec, CLOUD_FRACTION};

    fn test_config() -> ResolvedConfig {
        AggregationConfig {
            lat_range: (0.0, 2.0),
            lon_range: (0.0, 2.0),
            cell_size: (1.0, 1.0),
            sampling_stride: 1,
            workers: 1,
            variables: vec![
                VariableSpec {
                    name: CLOUD_FRACTION.to_string(),
                    long_name: String::new(),
                    units: String::new(),
                    fill_value: -9999.0,
                    scale_factor: 1.0,
                    add_offset: 0.0,
                    stats: StatSwitches::all(),
                    bins_1d: Some("0.0,0.5,1.0".to_string()),
                    joint_with: Some("ctp".to_string()),
                    bins_2d: Some("0.0,500.0,1000.0".to_string()),
                    hist_density: false,
                },
                VariableSpec {
                    name: "ctp".to_string(),
                    long_name: String::new(),
                    units: "hPa".to_string(),
                    fill_value: -9999.0,
                    scale_factor: 1.0,
                    add_offset: 0.0,
                    stats: StatSwitches {
                        hist_2d: false,
                        ..StatSwitches::all()
                    },
                    bins_1d: Some("0.0,500.0,1000.0".to_string()),
                    joint_with: None,
                    bins_2d: None,
                    hist_density: false,
                },
            ],
        }
        .resolve()
        .unwrap()
    }

    fn update_for(samples: &'static [f64], count: u64) -> CellUpdate<'static> {
        let valid: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
        let min = valid.iter().copied().fold(f64::NAN, f64::min);
        let max = valid.iter().copied().fold(f64::NAN, f64::max);
        CellUpdate {
            min_val: min,
            max_val: max,
            tot_val: valid.iter().sum(),
            count,
            samples,
            samples_2d: &[],
        }
    }

    #[test]
    fn update_accumulates_all_moments() {
        let cfg = test_config();
        let var = &cfg.variables[1];
        let mut cell = CellAccumulator::new(var.hist_1d_len(), var.hist_2d_len());

        cell.update(var, &update_for(&[200.0, 400.0], 3));
        cell.update(var, &update_for(&[600.0], 2));

        assert_eq!(cell.min, 200.0);
        assert_eq!(cell.max, 600.0);
        assert_eq!(cell.sum, 1200.0);
        assert_eq!(cell.count, 5, "count is the cloud-pixel count, not |S|");
        assert_eq!(cell.sum_sq, 600.0 * 600.0 + 600.0 * 600.0);
        assert_eq!(cell.hist_1d, vec![2, 1], "single-element set still binned");
    }

    #[test]
    fn update_with_no_valid_samples_keeps_extrema() {
        let cfg = test_config();
        let var = &cfg.variables[1];
        let mut cell = CellAccumulator::new(var.hist_1d_len(), var.hist_2d_len());

        cell.update(var, &update_for(&[f64::NAN, f64::NAN], 2));

        assert!(cell.min.is_infinite(), "NaN extrema must not overwrite ±inf");
        assert!(cell.max.is_infinite());
        assert_eq!(cell.sum, 0.0);
        assert_eq!(cell.count, 2);
        assert_eq!(cell.hist_1d, vec![0, 0]);
    }

    #[test]
    fn switches_gate_each_statistic() {
        let mut config = AggregationConfig {
            lat_range: (0.0, 2.0),
            lon_range: (0.0, 2.0),
            cell_size: (1.0, 1.0),
            sampling_stride: 1,
            workers: 1,
            variables: vec![VariableSpec {
                name: "ctp".to_string(),
                long_name: String::new(),
                units: String::new(),
                fill_value: -9999.0,
                scale_factor: 1.0,
                add_offset: 0.0,
                stats: StatSwitches::default(),
                bins_1d: None,
                joint_with: None,
                bins_2d: None,
                hist_density: false,
            }],
        };
        config.variables[0].stats.max = true;
        let cfg = config.resolve().unwrap();
        let var = &cfg.variables[0];

        let mut cell = CellAccumulator::new(var.hist_1d_len(), var.hist_2d_len());
        cell.update(var, &update_for(&[200.0, 400.0], 2));

        assert!(cell.min.is_infinite(), "min switch off");
        assert_eq!(cell.max, 400.0);
        assert_eq!(cell.sum, 0.0, "mean/count/std switches off");
        assert_eq!(cell.count, 0);
    }

    #[test]
    fn joint_histogram_pairs_samples_with_partner() {
        let cfg = test_config();
        let var = &cfg.variables[0]; // cloud_fraction, 2×2 joint bins
        let mut cell = CellAccumulator::new(var.hist_1d_len(), var.hist_2d_len());

        let u = CellUpdate {
            min_val: 0.75,
            max_val: 0.75,
            tot_val: 3.0,
            count: 4,
            samples: &[0.75],
            samples_2d: &[250.0],
        };
        cell.update(var, &u);

        // fraction 0.75 → bin 1 of the 1D axis; 250 hPa → bin 0 of the 2D axis.
        assert_eq!(cell.hist_2d, vec![0, 0, 1, 0]);
    }

    #[test]
    fn merge_is_commutative_and_identity_preserving() {
        let cfg = test_config();
        let var = &cfg.variables[1];

        let mut a = GridAccumulator::new(&cfg);
        a.cell_mut(1, 0).update(var, &update_for(&[200.0], 1));
        a.cell_mut(1, 3).update(var, &update_for(&[800.0, 900.0], 2));
        let mut b = GridAccumulator::new(&cfg);
        b.cell_mut(1, 0).update(var, &update_for(&[600.0], 1));

        let ab = a.clone().merge(b.clone());
        let ba = b.merge(a);
        assert_eq!(ab, ba);

        assert_eq!(ab.cell(1, 0).min, 200.0);
        assert_eq!(ab.cell(1, 0).max, 600.0);
        assert_eq!(ab.cell(1, 0).count, 2);
        // Cell 3 only visited by worker a; the empty side is the identity.
        assert_eq!(ab.cell(1, 3).min, 800.0);
        assert_eq!(ab.cell(1, 3).max, 900.0);
        // Cell 2 never visited at all.
        assert!(ab.cell(1, 2).min.is_infinite());
        assert_eq!(ab.cell(1, 2).count, 0);
    }

    #[test]
    fn merge_with_empty_equals_original() {
        let cfg = test_config();
        let var = &cfg.variables[1];

        let mut populated = GridAccumulator::new(&cfg);
        populated.cell_mut(1, 1).update(var, &update_for(&[512.0], 1));

        let merged = GridAccumulator::new(&cfg).merge(populated.clone());
        assert_eq!(merged, populated);
    }
}
