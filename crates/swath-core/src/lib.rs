//! Swath-to-grid aggregation engine.
//!
//! Bins irregularly-sampled satellite swath pixels into a regular lat/lon
//! grid and accumulates per-cell statistics (min, max, mean, count, standard
//! deviation, 1D and 2D histograms) across many granule file-pairs and
//! parallel workers.
//!
//! Pipeline: a [`SwathReader`] hands each worker [`PixelBatch`]es for its
//! slice of the file list; [`aggregate_files`] folds them into per-worker
//! [`GridAccumulator`]s and reduces those with the associative merge;
//! [`finalize`] turns the merged raw aggregates into the reported statistic
//! grids for the output writer.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod finalize;
pub mod granule;
pub mod grid;
pub mod histogram;
pub mod stats;
pub mod swath;

pub use aggregate::{accumulate_batch, aggregate_files, aggregate_pair};
pub use config::{
    AggregationConfig, ResolvedConfig, ResolvedVariable, StatSwitches, VariableSpec, CLOUD_FRACTION,
};
pub use error::{AggregationError, Result};
pub use finalize::{finalize, FinalGrid};
pub use granule::JsonGranuleReader;
pub use grid::{CellMap, GridSpec};
pub use histogram::{histogram_1d, histogram_2d, BinEdges};
pub use stats::{CellAccumulator, CellUpdate, GridAccumulator};
pub use swath::{decode_cloud_mask, subsample, FilePair, PixelBatch, SwathReader};
