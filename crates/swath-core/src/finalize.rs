//! Converts merged raw aggregates into the externally reported statistic
//! grids, one per enabled statistic per variable, with the metadata the
//! output writer needs for its lossy integer quantization.

use serde::Serialize;

use crate::config::{ResolvedConfig, ResolvedVariable};
use crate::stats::GridAccumulator;

/// One finalized output grid.
///
/// `data` is row-major over cells; histogram grids append a bin axis so
/// `data.len() == rows * cols * bins` (`bins == 1` for scalar statistics).
/// "No data" is reported as NaN, distinguishable from a true zero; the writer
/// substitutes `fill_value` when quantizing.
#[derive(Debug, Clone, Serialize)]
pub struct FinalGrid {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub fill_value: f64,
    pub scale_factor: f64,
    pub add_offset: f64,
    pub rows: usize,
    pub cols: usize,
    pub bins: usize,
    pub data: Vec<f64>,
}

/// Produce every enabled statistic grid for every configured variable.
pub fn finalize(cfg: &ResolvedConfig, acc: &GridAccumulator) -> Vec<FinalGrid> {
    let mut out = Vec::new();
    for (v_idx, var) in cfg.variables.iter().enumerate() {
        let sw = &var.stats;
        if sw.min {
            out.push(scalar_grid(cfg, var, "Minimum", |z| {
                let c = acc.cell(v_idx, z);
                if c.min.is_finite() {
                    c.min
                } else {
                    f64::NAN
                }
            }));
        }
        if sw.max {
            out.push(scalar_grid(cfg, var, "Maximum", |z| {
                let c = acc.cell(v_idx, z);
                if c.max.is_finite() {
                    c.max
                } else {
                    f64::NAN
                }
            }));
        }
        if sw.mean {
            out.push(scalar_grid(cfg, var, "Mean", |z| {
                let c = acc.cell(v_idx, z);
                if c.count > 0 {
                    c.sum / c.count as f64
                } else {
                    f64::NAN
                }
            }));
        }
        if sw.count {
            out.push(scalar_grid(cfg, var, "Pixel_Counts", |z| {
                acc.cell(v_idx, z).count as f64
            }));
        }
        if sw.std {
            out.push(scalar_grid(cfg, var, "Standard_Deviation", |z| {
                let c = acc.cell(v_idx, z);
                if c.count > 0 {
                    let mean = c.sum / c.count as f64;
                    (c.sum_sq / c.count as f64 - mean * mean).max(0.0).sqrt()
                } else {
                    f64::NAN
                }
            }));
        }
        if sw.hist_1d {
            out.push(hist_grid(cfg, var, acc, v_idx));
        }
        if sw.hist_2d {
            if let Some(joint) = &var.joint {
                let partner = &cfg.variables[joint.partner].name;
                out.push(hist_2d_grid(cfg, var, acc, v_idx, partner));
            }
        }
    }
    out
}

fn grid_header(cfg: &ResolvedConfig, var: &ResolvedVariable, suffix: &str, bins: usize) -> FinalGrid {
    FinalGrid {
        name: format!("{}_{}", var.name, suffix),
        long_name: format!("{}_{}", var.long_name, suffix),
        units: var.units.clone(),
        fill_value: var.fill_value,
        scale_factor: var.scale_factor,
        add_offset: var.add_offset,
        rows: cfg.grid.rows(),
        cols: cfg.grid.cols(),
        bins,
        data: Vec::new(),
    }
}

fn scalar_grid<F>(cfg: &ResolvedConfig, var: &ResolvedVariable, suffix: &str, mut value: F) -> FinalGrid
where
    F: FnMut(usize) -> f64,
{
    let mut grid = grid_header(cfg, var, suffix, 1);
    grid.data = (0..cfg.grid.n_cells()).map(|z| value(z)).collect();
    grid
}

fn hist_grid(cfg: &ResolvedConfig, var: &ResolvedVariable, acc: &GridAccumulator, v_idx: usize) -> FinalGrid {
    let bins = var.hist_1d_len();
    let mut grid = grid_header(cfg, var, "Histogram_Counts", bins);
    let mut data = Vec::with_capacity(cfg.grid.n_cells() * bins);
    for z in 0..cfg.grid.n_cells() {
        let hist = &acc.cell(v_idx, z).hist_1d;
        if var.hist_density {
            // Density mode on request: per-cell bins normalized to sum to 1;
            // a cell with no counts stays all-zero.
            let total: u64 = hist.iter().sum();
            if total > 0 {
                data.extend(hist.iter().map(|&c| c as f64 / total as f64));
            } else {
                data.extend(std::iter::repeat(0.0).take(bins));
            }
        } else {
            data.extend(hist.iter().map(|&c| c as f64));
        }
    }
    grid.data = data;
    grid
}

fn hist_2d_grid(
    cfg: &ResolvedConfig,
    var: &ResolvedVariable,
    acc: &GridAccumulator,
    v_idx: usize,
    partner: &str,
) -> FinalGrid {
    let bins = var.hist_2d_len();
    let mut grid = grid_header(cfg, var, &format!("Jhisto_vs_{partner}"), bins);
    let mut data = Vec::with_capacity(cfg.grid.n_cells() * bins);
    for z in 0..cfg.grid.n_cells() {
        data.extend(acc.cell(v_idx, z).hist_2d.iter().map(|&c| c as f64));
    }
    grid.data = data;
    grid
}
