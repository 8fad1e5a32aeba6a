//! The file-batch aggregation driver: folds granule pairs into per-worker
//! grid accumulators and reduces them into one global accumulator.
//!
//! Workers own disjoint contiguous slices of the file list and share no
//! mutable state; the reduction after the join barrier uses the associative
//! merge of [`GridAccumulator`], so the result is identical for any worker
//! count. A read failure in any worker aborts the whole run.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ResolvedConfig;
use crate::error::{AggregationError, Result};
use crate::stats::{CellUpdate, GridAccumulator};
use crate::swath::{FilePair, PixelBatch, SwathReader};

/// Aggregate a list of granule pairs across the configured worker count.
pub fn aggregate_files<R>(
    cfg: &ResolvedConfig,
    reader: &R,
    pairs: &[FilePair],
) -> Result<GridAccumulator>
where
    R: SwathReader + Sync,
{
    if pairs.is_empty() {
        return Ok(GridAccumulator::new(cfg));
    }

    let workers = cfg.workers;
    let chunk = pairs.len().div_ceil(workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| AggregationError::InvalidConfig(format!("worker pool: {e}")))?;

    info!(files = pairs.len(), workers, "starting aggregation");
    let merged = pool.install(|| {
        pairs
            .par_chunks(chunk)
            .map(|slice| {
                let mut acc = GridAccumulator::new(cfg);
                for pair in slice {
                    aggregate_pair(cfg, reader, pair, &mut acc)?;
                }
                Ok(acc)
            })
            .try_reduce(|| GridAccumulator::new(cfg), |a, b| Ok(a.merge(b)))
    })?;
    info!("aggregation finished");
    Ok(merged)
}

/// Read one granule pair and fold its pixels into the accumulator.
pub fn aggregate_pair<R>(
    cfg: &ResolvedConfig,
    reader: &R,
    pair: &FilePair,
    acc: &mut GridAccumulator,
) -> Result<()>
where
    R: SwathReader,
{
    debug!(granule = %pair.data_path.display(), "aggregating granule pair");
    let names = cfg.physical_names();
    let batch = reader.read(pair, &names)?;
    batch.check_shapes(&names)?;
    accumulate_batch(cfg, &batch, acc);
    Ok(())
}

/// Fold one pixel batch into the accumulator.
///
/// Restricts pixels to the bounding box (strict inequalities, checked
/// independently of the grid bounds), locates cells, then updates every
/// configured variable for each touched cell in ascending cell order.
pub fn accumulate_batch(cfg: &ResolvedConfig, batch: &PixelBatch, acc: &mut GridAccumulator) {
    let (lat_min, lat_max) = cfg.grid.lat_range();
    let (lon_min, lon_max) = cfg.grid.lon_range();

    // Bounding-box restriction. NaN coordinates fail the comparisons and are
    // dropped here with everything else outside the region.
    let keep: Vec<usize> = (0..batch.len())
        .filter(|&i| {
            batch.lat[i] > lat_min
                && batch.lat[i] < lat_max
                && batch.lon[i] > lon_min
                && batch.lon[i] < lon_max
        })
        .collect();

    let lat: Vec<f64> = keep.iter().map(|&i| batch.lat[i]).collect();
    let lon: Vec<f64> = keep.iter().map(|&i| batch.lon[i]).collect();
    let located = cfg.grid.locate_batch(&lat, &lon);

    // Group original pixel positions by cell.
    let mut by_cell: HashMap<usize, Vec<usize>> = HashMap::new();
    for (k, cell) in located.cells.iter().enumerate() {
        if let Some(z) = cell {
            by_cell.entry(*z).or_default().push(keep[k]);
        }
    }

    for &z in &located.touched {
        let Some(pixels) = by_cell.get(&z) else {
            continue;
        };

        // Cloud-mask pixel counting for this cell. NaN codes fail both
        // comparisons and count toward neither tally.
        let mut tot_pix = 0u64;
        let mut cld_pix = 0u64;
        for &i in pixels {
            let c = batch.cloud_mask[i];
            if c >= 0.0 {
                tot_pix += 1;
            }
            if c <= 1.0 {
                cld_pix += 1;
            }
        }
        if tot_pix == 0 {
            // Degenerate cell for this file: skip, never divide by zero.
            continue;
        }
        let fraction = cld_pix as f64 / tot_pix as f64;

        for (v_idx, var) in cfg.variables.iter().enumerate() {
            if var.is_cloud_fraction() {
                // The pseudo-variable: fraction as the sample, cloud pixels
                // over total pixels as the mean's numerator and denominator.
                let ave_2d = var
                    .joint
                    .as_ref()
                    .and_then(|j| cfg.value_slot(j.partner))
                    .map(|slot| {
                        let sum: f64 = pixels
                            .iter()
                            .map(|&i| batch.values[slot][i])
                            .filter(|v| !v.is_nan())
                            .sum();
                        sum / tot_pix as f64
                    })
                    .unwrap_or(0.0);
                let samples = [fraction];
                let samples_2d = [ave_2d];
                let u = CellUpdate {
                    min_val: fraction,
                    max_val: fraction,
                    tot_val: cld_pix as f64,
                    count: tot_pix,
                    samples: &samples,
                    samples_2d: &samples_2d,
                };
                acc.cell_mut(v_idx, z).update(var, &u);
                continue;
            }

            let Some(slot) = cfg.value_slot(v_idx) else {
                continue;
            };
            let vals: Vec<f64> = pixels.iter().map(|&i| batch.values[slot][i]).collect();
            let (tot_val, min_val, max_val) = nan_fold(&vals);

            let vals_2d: Vec<f64> = match var.joint.as_ref().and_then(|j| cfg.value_slot(j.partner))
            {
                Some(pslot) => pixels.iter().map(|&i| batch.values[pslot][i]).collect(),
                None => Vec::new(),
            };

            let u = CellUpdate {
                min_val,
                max_val,
                tot_val,
                count: cld_pix,
                samples: &vals,
                samples_2d: &vals_2d,
            };
            acc.cell_mut(v_idx, z).update(var, &u);
        }
    }
}

/// NaN-ignoring (sum, min, max) of a value slice. Min and max are NaN when no
/// valid value is present; the sum is then 0.
fn nan_fold(vals: &[f64]) -> (f64, f64, f64) {
    let mut sum = 0.0;
    let mut min = f64::NAN;
    let mut max = f64::NAN;
    for &v in vals {
        if v.is_nan() {
            continue;
        }
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    (sum, min, max)
}
