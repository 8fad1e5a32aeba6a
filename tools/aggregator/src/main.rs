//! Aggregation driver: pairs granule files from a data directory and a
//! geolocation directory, folds them into one global statistic grid across a
//! fixed pool of workers, and writes the finalized grids as JSON for the
//! downstream output writer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use swath_core::{aggregate_files, finalize, AggregationConfig, FilePair, JsonGranuleReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "aggregator", about = "Swath-to-grid statistics aggregation driver")]
struct Args {
    /// Aggregation configuration (JSON).
    #[arg(short, long)]
    config: String,

    /// Directory of measurement granules (*.json).
    #[arg(short, long)]
    data_dir: String,

    /// Directory of matching geolocation granules (*.json).
    #[arg(short, long)]
    geo_dir: String,

    /// Output file for the finalized grids.
    #[arg(short, long, default_value = "grids.json")]
    output: String,

    /// Override the configured worker count.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Granule discovery ─────────────────────────────────────────────────────────

/// Sorted *.json listing of a directory.
fn list_granules(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading granule directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Zip the two sorted listings into file pairs (MYD06/MYD03-style pairing by
/// sorted order).
fn pair_granules(data_dir: &Path, geo_dir: &Path) -> Result<Vec<FilePair>> {
    let data = list_granules(data_dir)?;
    let geo = list_granules(geo_dir)?;
    if data.len() != geo.len() {
        bail!(
            "{} has {} granules but {} has {}; the listings must pair one-to-one",
            data_dir.display(),
            data.len(),
            geo_dir.display(),
            geo.len()
        );
    }
    Ok(data
        .into_iter()
        .zip(geo)
        .map(|(d, g)| FilePair::new(d, g))
        .collect())
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading configuration {}", args.config))?;
    let mut config: AggregationConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", args.config))?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let cfg = config.resolve().context("invalid configuration")?;

    let pairs = pair_granules(Path::new(&args.data_dir), Path::new(&args.geo_dir))?;
    if pairs.is_empty() {
        bail!("no granules found in {}", args.data_dir);
    }
    info!(
        files = pairs.len(),
        rows = cfg.grid.rows(),
        cols = cfg.grid.cols(),
        variables = cfg.variables.len(),
        "configured run"
    );

    let reader = JsonGranuleReader::new(cfg.sampling_stride);
    let merged = aggregate_files(&cfg, &reader, &pairs)?;
    let grids = finalize(&cfg, &merged);

    // Summary table: one line per output grid.
    eprintln!("\n{:<45} {:>10} {:>12}", "Grid", "Bins", "Cells w/data");
    eprintln!("{}", "-".repeat(70));
    for grid in &grids {
        let cells = grid.rows * grid.cols;
        let with_data = (0..cells)
            .filter(|&z| {
                grid.data[z * grid.bins..(z + 1) * grid.bins]
                    .iter()
                    .any(|v| !v.is_nan() && *v != 0.0)
            })
            .count();
        eprintln!("{:<45} {:>10} {:>12}", grid.name, grid.bins, with_data);
    }

    let out = serde_json::to_string(&grids)?;
    fs::write(&args.output, out)
        .with_context(|| format!("writing {}", args.output))?;
    info!(output = %args.output, grids = grids.len(), "wrote finalized grids");

    Ok(())
}
