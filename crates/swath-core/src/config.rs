//! Run configuration: bounding box, grid cell size, sampling stride, worker
//! count, and the per-variable statistics setup.
//!
//! Everything is validated up front by [`AggregationConfig::resolve`];
//! configuration errors are fatal and name the offending variable or
//! parameter. Bin-edge strings are parsed exactly once here, never per batch.

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, Result};
use crate::grid::GridSpec;
use crate::histogram::BinEdges;

/// Name of the pseudo-variable aggregated from the cloud-mask-derived
/// fraction instead of a file variable.
pub const CLOUD_FRACTION: &str = "cloud_fraction";

/// Which statistics are accumulated for a variable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatSwitches {
    pub min: bool,
    pub max: bool,
    pub mean: bool,
    pub count: bool,
    pub std: bool,
    pub hist_1d: bool,
    pub hist_2d: bool,
}

impl StatSwitches {
    pub fn all() -> Self {
        Self {
            min: true,
            max: true,
            mean: true,
            count: true,
            std: true,
            hist_1d: true,
            hist_2d: true,
        }
    }

    /// Whether the sum/count pair must be accumulated. Mean and count share
    /// storage, and the standard deviation needs both at finalization.
    #[inline]
    pub fn needs_sum(&self) -> bool {
        self.mean || self.count || self.std
    }
}

/// One aggregated variable: identity, writer metadata, enabled statistics,
/// and histogram bin-edge strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub units: String,
    #[serde(default = "default_fill")]
    pub fill_value: f64,
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    #[serde(default)]
    pub add_offset: f64,
    #[serde(default)]
    pub stats: StatSwitches,
    /// Comma-separated ascending 1D bin edges, e.g. `"0.0,0.1,0.5,1.0"`.
    #[serde(default)]
    pub bins_1d: Option<String>,
    /// Partner variable supplying the second axis of the joint histogram.
    #[serde(default)]
    pub joint_with: Option<String>,
    /// Comma-separated ascending bin edges for the partner axis.
    #[serde(default)]
    pub bins_2d: Option<String>,
    /// Report the 1D histogram as per-cell densities instead of raw counts.
    #[serde(default)]
    pub hist_density: bool,
}

fn default_fill() -> f64 {
    -9999.0
}

fn default_scale() -> f64 {
    1.0
}

/// Full aggregation run configuration; loaded from JSON by the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Geographic bounding box, also the grid extent: `(min, max)` degrees.
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
    /// Grid cell size `(d_lat, d_lon)` in degrees.
    pub cell_size: (f64, f64),
    /// Pixel sub-sampling stride applied by the swath reader.
    #[serde(default = "default_stride")]
    pub sampling_stride: usize,
    /// Fixed parallel worker count; the file list is split into this many
    /// contiguous slices.
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub variables: Vec<VariableSpec>,
}

fn default_stride() -> usize {
    1
}

fn default_workers() -> usize {
    1
}

impl AggregationConfig {
    /// Validate the whole configuration and produce the resolved form used by
    /// the aggregation engine.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let grid = GridSpec::new(self.lat_range, self.lon_range, self.cell_size)?;

        if self.sampling_stride == 0 {
            return Err(AggregationError::InvalidConfig(
                "sampling_stride must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(AggregationError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.variables.is_empty() {
            return Err(AggregationError::InvalidConfig(
                "no variables configured".to_string(),
            ));
        }
        for (i, spec) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|s| s.name == spec.name) {
                return Err(AggregationError::InvalidConfig(format!(
                    "variable '{}' is configured twice",
                    spec.name
                )));
            }
        }

        let mut variables = Vec::with_capacity(self.variables.len());
        for spec in &self.variables {
            variables.push(self.resolve_variable(spec)?);
        }

        // Value-array slot per variable: physical variables take consecutive
        // positions in the reader's request order; the cloud-fraction
        // pseudo-variable has none.
        let mut slots = Vec::with_capacity(variables.len());
        let mut next = 0usize;
        for var in &variables {
            if var.is_cloud_fraction() {
                slots.push(None);
            } else {
                slots.push(Some(next));
                next += 1;
            }
        }

        Ok(ResolvedConfig {
            grid,
            variables,
            slots,
            sampling_stride: self.sampling_stride,
            workers: self.workers,
        })
    }

    fn resolve_variable(&self, spec: &VariableSpec) -> Result<ResolvedVariable> {
        let invalid = |reason: &str| AggregationError::InvalidVariable {
            variable: spec.name.clone(),
            reason: reason.to_string(),
        };

        let edges_1d = spec
            .bins_1d
            .as_deref()
            .map(BinEdges::parse)
            .transpose()
            .map_err(|reason| AggregationError::InvalidBinEdges {
                variable: spec.name.clone(),
                reason,
            })?;

        if spec.stats.hist_1d && edges_1d.is_none() {
            return Err(invalid("hist_1d is enabled but no 1D bin edges are given"));
        }

        let joint = if spec.stats.hist_2d {
            if edges_1d.is_none() {
                return Err(invalid("hist_2d is enabled but no 1D bin edges are given"));
            }
            let partner_name = spec
                .joint_with
                .as_deref()
                .ok_or_else(|| invalid("hist_2d is enabled but no joint partner is named"))?;
            let partner = self
                .variables
                .iter()
                .position(|s| s.name == partner_name)
                .ok_or_else(|| AggregationError::UnknownPartner {
                    variable: spec.name.clone(),
                    partner: partner_name.to_string(),
                })?;
            if partner_name == CLOUD_FRACTION {
                return Err(invalid("joint partner must be a physical variable"));
            }
            let bins_2d = spec
                .bins_2d
                .as_deref()
                .ok_or_else(|| invalid("hist_2d is enabled but no 2D bin edges are given"))?;
            let edges = BinEdges::parse(bins_2d).map_err(|reason| {
                AggregationError::InvalidBinEdges {
                    variable: spec.name.clone(),
                    reason,
                }
            })?;
            Some(JointSpec { partner, edges })
        } else {
            None
        };

        Ok(ResolvedVariable {
            name: spec.name.clone(),
            long_name: if spec.long_name.is_empty() {
                spec.name.clone()
            } else {
                spec.long_name.clone()
            },
            units: spec.units.clone(),
            fill_value: spec.fill_value,
            scale_factor: spec.scale_factor,
            add_offset: spec.add_offset,
            stats: spec.stats,
            edges_1d,
            joint,
            hist_density: spec.hist_density,
        })
    }
}

/// The second axis of a joint histogram: partner variable index (into the
/// resolved variable list) and its bin edges.
#[derive(Debug, Clone)]
pub struct JointSpec {
    pub partner: usize,
    pub edges: BinEdges,
}

/// A variable after validation: parsed edges, resolved joint partner.
#[derive(Debug, Clone)]
pub struct ResolvedVariable {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub fill_value: f64,
    pub scale_factor: f64,
    pub add_offset: f64,
    pub stats: StatSwitches,
    pub edges_1d: Option<BinEdges>,
    pub joint: Option<JointSpec>,
    pub hist_density: bool,
}

impl ResolvedVariable {
    #[inline]
    pub fn is_cloud_fraction(&self) -> bool {
        self.name == CLOUD_FRACTION
    }

    /// Allocated 1D histogram length (0 when the statistic is off).
    pub fn hist_1d_len(&self) -> usize {
        if self.stats.hist_1d {
            self.edges_1d.as_ref().map_or(0, BinEdges::n_bins)
        } else {
            0
        }
    }

    /// Allocated flat 2D histogram length (0 when the statistic is off).
    pub fn hist_2d_len(&self) -> usize {
        if self.stats.hist_2d {
            match (&self.edges_1d, &self.joint) {
                (Some(e1), Some(j)) => e1.n_bins() * j.edges.n_bins(),
                _ => 0,
            }
        } else {
            0
        }
    }
}

/// Validated configuration consumed by every engine component.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub grid: GridSpec,
    /// Variables in configured order; aggregation iterates this order.
    pub variables: Vec<ResolvedVariable>,
    slots: Vec<Option<usize>>,
    pub sampling_stride: usize,
    pub workers: usize,
}

impl ResolvedConfig {
    /// Names of the physical (file-read) variables, in request order.
    pub fn physical_names(&self) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| !v.is_cloud_fraction())
            .map(|v| v.name.clone())
            .collect()
    }

    /// Position of a variable's value array within a [`PixelBatch`];
    /// `None` for the cloud-fraction pseudo-variable.
    ///
    /// [`PixelBatch`]: crate::swath::PixelBatch
    #[inline]
    pub fn value_slot(&self, var_idx: usize) -> Option<usize> {
        self.slots[var_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AggregationConfig {
        AggregationConfig {
            lat_range: (-90.0, 90.0),
            lon_range: (-180.0, 180.0),
            cell_size: (1.0, 1.0),
            sampling_stride: 3,
            workers: 4,
            variables: vec![
                VariableSpec {
                    name: CLOUD_FRACTION.to_string(),
                    long_name: "Cloud_Fraction".to_string(),
                    units: "none".to_string(),
                    fill_value: default_fill(),
                    scale_factor: 0.0001,
                    add_offset: 0.0,
                    stats: StatSwitches::all(),
                    bins_1d: Some("0.0,0.2,0.4,0.6,0.8,1.0".to_string()),
                    joint_with: Some("cloud_top_pressure".to_string()),
                    bins_2d: Some("100.0,300.0,500.0,700.0,900.0,1100.0".to_string()),
                    hist_density: false,
                },
                VariableSpec {
                    name: "cloud_top_pressure".to_string(),
                    long_name: "Cloud_Top_Pressure".to_string(),
                    units: "hPa".to_string(),
                    fill_value: default_fill(),
                    scale_factor: 0.1,
                    add_offset: 0.0,
                    stats: StatSwitches {
                        hist_1d: true,
                        hist_2d: false,
                        ..StatSwitches::all()
                    },
                    bins_1d: Some("100.0,300.0,500.0,700.0,900.0,1100.0".to_string()),
                    joint_with: None,
                    bins_2d: None,
                    hist_density: false,
                },
            ],
        }
    }

    #[test]
    fn resolve_happy_path() {
        let cfg = base_config().resolve().unwrap();
        assert_eq!(cfg.grid.rows(), 180);
        assert_eq!(cfg.grid.cols(), 360);
        assert_eq!(cfg.variables.len(), 2);
        assert_eq!(cfg.physical_names(), vec!["cloud_top_pressure".to_string()]);
        assert_eq!(cfg.value_slot(0), None, "cloud_fraction reads no file array");
        assert_eq!(cfg.value_slot(1), Some(0));
        assert!(cfg.variables[0].is_cloud_fraction());
        assert_eq!(cfg.variables[0].hist_1d_len(), 5);
        assert_eq!(cfg.variables[0].hist_2d_len(), 25);
        assert_eq!(cfg.variables[1].hist_2d_len(), 0);
    }

    #[test]
    fn resolve_rejects_unknown_joint_partner() {
        let mut config = base_config();
        config.variables[0].joint_with = Some("no_such_variable".to_string());
        match config.resolve().unwrap_err() {
            AggregationError::UnknownPartner { variable, partner } => {
                assert_eq!(variable, CLOUD_FRACTION);
                assert_eq!(partner, "no_such_variable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_rejects_hist_without_edges() {
        let mut config = base_config();
        config.variables[1].bins_1d = None;
        assert!(matches!(
            config.resolve().unwrap_err(),
            AggregationError::InvalidVariable { .. }
        ));
    }

    #[test]
    fn resolve_rejects_bad_edge_string() {
        let mut config = base_config();
        config.variables[1].bins_1d = Some("900,100".to_string());
        assert!(matches!(
            config.resolve().unwrap_err(),
            AggregationError::InvalidBinEdges { .. }
        ));
    }

    #[test]
    fn resolve_rejects_degenerate_run_parameters() {
        let mut config = base_config();
        config.sampling_stride = 0;
        assert!(config.resolve().is_err());

        let mut config = base_config();
        config.workers = 0;
        assert!(config.resolve().is_err());

        let mut config = base_config();
        config.variables.clear();
        assert!(config.resolve().is_err());

        let mut config = base_config();
        let dup = config.variables[1].clone();
        config.variables.push(dup);
        assert!(config.resolve().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = base_config();
        let text = serde_json::to_string(&config).unwrap();
        let back: AggregationConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.variables.len(), config.variables.len());
        assert_eq!(back.sampling_stride, 3);
        back.resolve().unwrap();
    }
}
