//! User-defined histogram bin edges and binning.
//!
//! Bins are left-closed/right-open except the last bin, which also includes
//! its right edge. Values outside the outer edges, and non-finite values,
//! are excluded.

/// A validated, strictly increasing sequence of bin boundaries.
///
/// Parsed once at configuration time from the comma-separated edge strings of
/// the configuration surface; never re-parsed per pixel batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges(Vec<f64>);

impl BinEdges {
    /// Validate an explicit edge sequence: length ≥ 2, finite, strictly
    /// increasing. The error message is a bare reason; callers attach the
    /// variable name.
    pub fn from_vec(edges: Vec<f64>) -> std::result::Result<Self, String> {
        if edges.len() < 2 {
            return Err(format!("need at least 2 edges, got {}", edges.len()));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(format!("edge {bad} is not finite"));
        }
        for pair in edges.windows(2) {
            if !(pair[0] < pair[1]) {
                return Err(format!(
                    "edges must be strictly increasing, got {} then {}",
                    pair[0], pair[1]
                ));
            }
        }
        Ok(Self(edges))
    }

    /// Parse a comma-separated edge string such as `"0.0,0.1,0.25,1.0"`.
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let edges = spec
            .split(',')
            .map(|tok| {
                let tok = tok.trim();
                tok.parse::<f64>()
                    .map_err(|_| format!("'{tok}' is not a number"))
            })
            .collect::<std::result::Result<Vec<f64>, String>>()?;
        Self::from_vec(edges)
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.0.len() - 1
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Bin index for a value, or `None` if it falls outside the edges.
    pub fn bin_of(&self, v: f64) -> Option<usize> {
        let e = &self.0;
        let last = e[e.len() - 1];
        if !v.is_finite() || v < e[0] || v > last {
            return None;
        }
        if v == last {
            // The last bin is closed on the right.
            return Some(self.n_bins() - 1);
        }
        Some(e.partition_point(|&b| b <= v) - 1)
    }
}

/// Bin counts of `values` against `edges`; out-of-range values are excluded.
pub fn histogram_1d(values: &[f64], edges: &BinEdges) -> Vec<u64> {
    let mut counts = vec![0u64; edges.n_bins()];
    for &v in values {
        if let Some(b) = edges.bin_of(v) {
            counts[b] += 1;
        }
    }
    counts
}

/// Joint bin counts of `(xs[i], ys[i])` pairs, flattened x-major
/// (`counts[i * y_bins + j]`). A pair is excluded if either member falls
/// outside its edges.
pub fn histogram_2d(xs: &[f64], ys: &[f64], x_edges: &BinEdges, y_edges: &BinEdges) -> Vec<u64> {
    debug_assert_eq!(xs.len(), ys.len());
    let ny = y_edges.n_bins();
    let mut counts = vec![0u64; x_edges.n_bins() * ny];
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if let (Some(i), Some(j)) = (x_edges.bin_of(x), y_edges.bin_of(y)) {
            counts[i * ny + j] += 1;
        }
    }
    counts
}
