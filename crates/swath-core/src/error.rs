use std::path::PathBuf;
use thiserror::Error;

/// Error type for configuration and aggregation failures.
///
/// Configuration variants are raised before any aggregation work begins and
/// name the offending variable or parameter. Granule variants abort the whole
/// run; there is no partial-result salvage.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid bin edges for variable '{variable}': {reason}")]
    InvalidBinEdges { variable: String, reason: String },

    #[error("variable '{variable}': {reason}")]
    InvalidVariable { variable: String, reason: String },

    #[error("joint-histogram partner '{partner}' of variable '{variable}' is not in the variable list")]
    UnknownPartner { variable: String, partner: String },

    #[error(
        "variable '{variable}' has {got} pixels but the geolocation arrays have {expected}; \
         input variables must match the geolocation resolution"
    )]
    ResolutionMismatch {
        variable: String,
        expected: usize,
        got: usize,
    },

    #[error("variable '{variable}' is not present in granule {}", .path.display())]
    MissingVariable { variable: String, path: PathBuf },

    #[error("failed to read granule {}: {source}", .path.display())]
    GranuleRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse granule {}: {source}", .path.display())]
    GranuleParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AggregationError>;
