//! Error types for wloc-cf

use thiserror::Error;

/// Errors raised when constructing waveform values
///
/// Transforms themselves do not fail on short input; see the crate docs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CfError {
    /// Sample interval must be finite and > 0
    #[error("Invalid sample interval: {0}")]
    InvalidSampleInterval(f64),

    /// A waveform needs at least one sample
    #[error("Empty waveform")]
    EmptySeries,

    /// Out-of-range transform parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Convenience Result type using CfError
pub type Result<T> = std::result::Result<T, CfError>;
