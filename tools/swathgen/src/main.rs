//! Synthetic granule generator: writes JSON granule file-pairs (geolocation +
//! measurement) shaped like the aggregator's reference reader expects, for
//! exercising the driver end to end without real satellite data.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "swathgen", about = "Generate synthetic JSON granule pairs")]
struct Args {
    /// Output directory; granules land in <output>/data and <output>/geo.
    #[arg(short, long, default_value = "granules")]
    output: String,

    /// Number of granule pairs to generate.
    #[arg(short, long, default_value_t = 8)]
    granules: usize,

    /// Pixels per swath row.
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Swath rows per granule.
    #[arg(long, default_value_t = 40)]
    height: usize,

    /// Base RNG seed; granule i uses seed + i.
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Latitude extent the swath centres are drawn from.
    #[arg(long, default_value_t = -60.0)]
    lat_min: f64,
    #[arg(long, default_value_t = 60.0)]
    lat_max: f64,

    /// Longitude extent the swath centres are drawn from.
    #[arg(long, default_value_t = -150.0)]
    lon_min: f64,
    #[arg(long, default_value_t = 150.0)]
    lon_max: f64,

    /// Fraction of pixels marked as geolocation fill.
    #[arg(long, default_value_t = 0.01)]
    fill_fraction: f64,
}

// ── JSON granule shapes (mirrors the reference reader's format) ───────────────

#[derive(Serialize)]
struct GeoGranule {
    width: usize,
    latitude: Vec<Option<f64>>,
    longitude: Vec<Option<f64>>,
}

#[derive(Serialize)]
struct VarField {
    width: usize,
    data: Vec<Option<f64>>,
}

#[derive(Serialize)]
struct DataGranule {
    width: usize,
    cloud_mask: Vec<u8>,
    variables: std::collections::BTreeMap<String, VarField>,
}

// ── Generation ────────────────────────────────────────────────────────────────

fn generate_pair(args: &Args, index: usize) -> (GeoGranule, DataGranule) {
    let mut rng = StdRng::seed_from_u64(args.seed + index as u64);
    let n = args.width * args.height;

    // Swath centre and footprint: a tilted strip a few degrees across.
    let lat0 = rng.gen_range(args.lat_min..args.lat_max);
    let lon0 = rng.gen_range(args.lon_min..args.lon_max);
    let tilt: f64 = rng.gen_range(-0.3..0.3);

    let mut latitude = Vec::with_capacity(n);
    let mut longitude = Vec::with_capacity(n);
    let mut cloud_mask = Vec::with_capacity(n);
    let mut ctp = Vec::with_capacity(n);
    let mut ctt = Vec::with_capacity(n);

    // Per-granule cloudiness regime so cloud fraction varies between files.
    let cloudiness = rng.gen_range(0.1..0.9);

    for row in 0..args.height {
        for col in 0..args.width {
            let along = row as f64 * 0.02;
            let across = (col as f64 - args.width as f64 / 2.0) * 0.03;
            let lat = lat0 + along + across * tilt;
            let lon = lon0 + across + along * tilt;

            if rng.gen_bool(args.fill_fraction) {
                latitude.push(None);
                longitude.push(None);
            } else {
                latitude.push(Some(lat));
                longitude.push(Some(lon));
            }

            // 2-bit code in bits 1–2, cloudy codes drawn per the regime.
            let code: u8 = if rng.gen_bool(cloudiness) {
                if rng.gen_bool(0.8) {
                    0
                } else {
                    1
                }
            } else if rng.gen_bool(0.5) {
                2
            } else {
                3
            };
            cloud_mask.push(code << 1);

            // Cloud-top pressure/temperature only where there is a cloud.
            if code <= 1 && !rng.gen_bool(0.02) {
                ctp.push(Some(rng.gen_range(150.0..1050.0)));
                ctt.push(Some(rng.gen_range(180.0..300.0)));
            } else {
                ctp.push(None);
                ctt.push(None);
            }
        }
    }

    let geo = GeoGranule {
        width: args.width,
        latitude,
        longitude,
    };
    let mut variables = std::collections::BTreeMap::new();
    variables.insert(
        "cloud_top_pressure".to_string(),
        VarField {
            width: args.width,
            data: ctp,
        },
    );
    variables.insert(
        "cloud_top_temperature".to_string(),
        VarField {
            width: args.width,
            data: ctt,
        },
    );
    let data = DataGranule {
        width: args.width,
        cloud_mask,
        variables,
    };
    (geo, data)
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let base = Path::new(&args.output);
    let data_dir = base.join("data");
    let geo_dir = base.join("geo");
    fs::create_dir_all(&data_dir).context("creating data directory")?;
    fs::create_dir_all(&geo_dir).context("creating geo directory")?;

    for i in 0..args.granules {
        let (geo, data) = generate_pair(&args, i);
        let name = format!("granule_{i:04}.json");
        fs::write(data_dir.join(&name), serde_json::to_string(&data)?)
            .with_context(|| format!("writing data granule {name}"))?;
        fs::write(geo_dir.join(&name), serde_json::to_string(&geo)?)
            .with_context(|| format!("writing geo granule {name}"))?;
    }

    eprintln!(
        "Wrote {} granule pairs ({}×{} pixels) under {}.",
        args.granules,
        args.width,
        args.height,
        base.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args() -> Args {
        Args {
            output: String::new(),
            granules: 1,
            width: 16,
            height: 10,
            seed: 7,
            lat_min: -60.0,
            lat_max: 60.0,
            lon_min: -150.0,
            lon_max: 150.0,
            fill_fraction: 0.05,
        }
    }

    #[test]
    fn generated_arrays_are_consistent() {
        let args = test_args();
        let (geo, data) = generate_pair(&args, 0);
        let n = args.width * args.height;
        assert_eq!(geo.latitude.len(), n);
        assert_eq!(geo.longitude.len(), n);
        assert_eq!(data.cloud_mask.len(), n);
        for field in data.variables.values() {
            assert_eq!(field.data.len(), n);
        }
        // Only bits 1–2 are ever set in the packed mask.
        assert!(data.cloud_mask.iter().all(|&b| b & !0b0000_0110 == 0));
    }

    #[test]
    fn same_seed_reproduces_the_granule() {
        let args = test_args();
        let (geo_a, _) = generate_pair(&args, 0);
        let (geo_b, _) = generate_pair(&args, 0);
        assert_eq!(geo_a.latitude, geo_b.latitude);
        assert_eq!(geo_a.longitude, geo_b.longitude);
    }
}
