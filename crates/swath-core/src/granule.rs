//! Reference [`SwathReader`] over JSON granule file-pairs.
//!
//! This stands in for real satellite format decoding: the geolocation file
//! carries latitude/longitude with `null` for
//! fill pixels, the data file carries the packed cloud-mask byte plane and
//! per-variable value arrays, all row-major with an explicit width. The
//! reader applies the fixed-offset sub-sampling, decodes the 2-bit cloud-mask
//! code, masks fill pixels, and validates shapes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{AggregationError, Result};
use crate::swath::{decode_cloud_mask, subsample, FilePair, PixelBatch, SwathReader};

fn null_as_nan_vec<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<f64>, D::Error> {
    let v: Vec<Option<f64>> = Vec::deserialize(d)?;
    Ok(v.into_iter().map(|x| x.unwrap_or(f64::NAN)).collect())
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeoGranule {
    pub width: usize,
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub latitude: Vec<f64>,
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub longitude: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VarField {
    pub width: usize,
    #[serde(deserialize_with = "null_as_nan_vec")]
    pub data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataGranule {
    pub width: usize,
    /// Packed cloud-mask bytes; the 2-bit code sits in bits 1–2.
    pub cloud_mask: Vec<u8>,
    #[serde(default)]
    pub variables: HashMap<String, VarField>,
}

/// Reads JSON granule pairs with a configured sub-sampling stride.
#[derive(Debug, Clone)]
pub struct JsonGranuleReader {
    stride: usize,
}

impl JsonGranuleReader {
    pub fn new(stride: usize) -> Self {
        Self { stride: stride.max(1) }
    }

    fn load<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let text = fs::read_to_string(path).map_err(|source| AggregationError::GranuleRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| AggregationError::GranuleParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Assemble a [`PixelBatch`] from parsed granules. Split out of [`SwathReader::read`]
/// so tests can exercise it without touching disk.
pub(crate) fn assemble(
    geo: &GeoGranule,
    data: &DataGranule,
    variables: &[String],
    stride: usize,
    pair: &FilePair,
) -> Result<PixelBatch> {
    let mut lat = subsample(&geo.latitude, geo.width, stride);
    let mut lon = subsample(&geo.longitude, geo.width, stride);
    let raw_mask = subsample(&data.cloud_mask, data.width, stride);
    let mut cloud_mask: Vec<f64> = raw_mask
        .iter()
        .map(|&b| decode_cloud_mask(b) as f64)
        .collect();

    // Geolocation fill propagates: a pixel with no position has no cloud-mask
    // code either.
    let n = lat.len().min(lon.len()).min(cloud_mask.len());
    for i in 0..n {
        if lat[i].is_nan() || lon[i].is_nan() {
            lat[i] = f64::NAN;
            lon[i] = f64::NAN;
            cloud_mask[i] = f64::NAN;
        }
    }

    let mut values = Vec::with_capacity(variables.len());
    for name in variables {
        let field = data
            .variables
            .get(name)
            .ok_or_else(|| AggregationError::MissingVariable {
                variable: name.clone(),
                path: pair.data_path.clone(),
            })?;
        values.push(subsample(&field.data, field.width, stride));
    }

    let batch = PixelBatch {
        lat,
        lon,
        cloud_mask,
        values,
    };
    batch.check_shapes(variables)?;
    Ok(batch)
}

impl SwathReader for JsonGranuleReader {
    fn read(&self, pair: &FilePair, variables: &[String]) -> Result<PixelBatch> {
        let geo: GeoGranule = self.load(&pair.geo_path)?;
        let data: DataGranule = self.load(&pair.data_path)?;
        assemble(&geo, &data, variables, self.stride, pair)
    }
}
