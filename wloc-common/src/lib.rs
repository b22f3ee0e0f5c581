//! # WLOC Common Library
//!
//! Shared code for the waveform-migration location crates:
//! - Error type (`Error`, `Result`)
//! - TOML configuration and config-file resolution
//! - Tracing subscriber initialisation
//! - Epoch-time helpers for sample alignment
//! - Parameter enums shared between the characteristic-function and migration crates

pub mod config;
pub mod error;
pub mod logging;
pub mod params;
pub mod time;

pub use config::WlocConfig;
pub use error::{Error, Result};
pub use params::{CfKind, CombineRule, MeanNormalization};
