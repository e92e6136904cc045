//! Unified error type for the satfeat workspace
//!
//! Component crates define their own narrow error enums and convert into
//! [`SatfeatError`] at API boundaries, so callers can match on the failure
//! class (configuration, catalog, raster, compute) without knowing which
//! component raised it.
//!
//! # Example
//!
//! ```ignore
//! use satfeat_core::{SatfeatError, SatfeatResult};
//!
//! fn check_features(count: usize) -> SatfeatResult<()> {
//!     if count % 2 != 0 {
//!         return Err(SatfeatError::Config(format!("feature count {count} is odd")));
//!     }
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all satfeat operations.
#[derive(Error, Debug)]
pub enum SatfeatError {
    /// I/O errors (file access, downloads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Run configuration rejected before any work started
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog query failures (network, HTTP status, malformed response)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Raster access failures (decode, georeferencing, window bounds)
    #[error("Raster error: {0}")]
    Raster(String),

    /// Feature computation failures
    #[error("Compute error: {0}")]
    Compute(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using SatfeatError.
pub type SatfeatResult<T> = Result<T, SatfeatError>;

impl SatfeatError {
    /// Configuration errors are the only class surfaced before a run starts.
    pub fn is_config(&self) -> bool {
        matches!(self, SatfeatError::Config(_))
    }
}

/// What to do when a partition query or a whole period fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the failure, degrade to "no data" and keep going.
    #[default]
    Skip,
    /// Stop the run with the error.
    Abort,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = SatfeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ErrorPolicy::Skip),
            "abort" => Ok(ErrorPolicy::Abort),
            other => Err(SatfeatError::Config(format!(
                "unknown error policy '{other}'; use 'skip' or 'abort'"
            ))),
        }
    }
}

impl From<anyhow::Error> for SatfeatError {
    fn from(err: anyhow::Error) -> Self {
        SatfeatError::Other(format!("{err:#}"))
    }
}

impl From<String> for SatfeatError {
    fn from(s: String) -> Self {
        SatfeatError::Other(s)
    }
}

impl From<&str> for SatfeatError {
    fn from(s: &str) -> Self {
        SatfeatError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for SatfeatError {
    fn from(err: serde_json::Error) -> Self {
        SatfeatError::Parse(err.to_string())
    }
}
