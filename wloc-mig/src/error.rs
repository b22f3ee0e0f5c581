//! Error types for wloc-mig
//!
//! Only precondition failures are errors. Coverage gaps and degenerate
//! signals are logged and degrade the stack instead of aborting the run.

use thiserror::Error;

/// Precondition failures of a migration call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// Nothing to migrate
    #[error("Empty station set")]
    EmptyStationSet,

    /// A station's sample interval differs from the rest of the set
    #[error("Sample interval mismatch for station {station}: expected {expected} s, found {found} s")]
    SampleIntervalMismatch {
        station: String,
        expected: f64,
        found: f64,
    },

    /// Two series share one station id
    #[error("Duplicate station: {0}")]
    DuplicateStation(String),

    /// Non-positive spacing, zero node count or non-finite origin
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Output window is empty or reversed
    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    /// Out-of-range engine or extractor parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Convenience Result type using MigrationError
pub type Result<T> = std::result::Result<T, MigrationError>;
