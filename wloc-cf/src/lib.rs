//! # WLOC Characteristic Functions (wloc-cf)
//!
//! Deterministic transforms that turn raw seismic samples into characteristic
//! functions that peak sharply at signal onsets, plus the `WaveformSample` value
//! type they operate on.
//!
//! Array-level functions (`kurtosis`, `filters`, `gaussian`) are pure
//! slice-in/vec-out. Short or degenerate input never fails: it yields a
//! well-defined zero output of predictable length so a single bad station
//! cannot abort a migration run.

pub mod characteristic;
pub mod error;
pub mod filters;
pub mod gaussian;
pub mod kurtosis;
pub mod waveform;

pub use characteristic::{CfPipeline, CharacteristicFunction};
pub use error::{CfError, Result};
pub use waveform::{ProcessingTag, WaveformSample};
