//! Configuration loading and config-file resolution
//!
//! One TOML file with four sections:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [characteristic]
//! kind = "kurtosis"
//! window_s = 3.0
//! recursive = false
//!
//! [migration]
//! combine = "sum"
//! workers = 4
//!
//! [extraction]
//! max_events = 5
//! min_amplitude = 2.0
//! ```
//!
//! Every key has a built-in default. A missing file degrades to defaults with a
//! warning; a file that exists but does not parse is an error.

use crate::params::{CfKind, CombineRule, MeanNormalization};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "WLOC_CONFIG";

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WlocConfig {
    pub logging: LoggingConfig,
    pub characteristic: CharacteristicConfig,
    pub migration: MigrationConfig,
    pub extraction: ExtractionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Characteristic-function pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicConfig {
    /// Transform applied to each station's waveform
    pub kind: CfKind,

    /// Kurtosis window length (seconds)
    pub window_s: f64,

    /// Use the recursive (exponentially weighted) kurtosis instead of the sliding window
    pub recursive: bool,

    /// STA window length (seconds)
    pub sta_s: f64,

    /// LTA window length (seconds)
    pub lta_s: f64,

    /// Remove the mean before the transform
    pub pre_rmean: bool,

    /// Taper before the transform
    pub pre_taper: bool,

    /// Taper after the transform
    pub post_taper: bool,

    /// Replace the transform output by its positive time derivative
    pub positive_derivative: bool,

    /// Gaussian re-weighting of triggers (only applied when present)
    pub gaussian: Option<GaussianConfig>,
}

impl Default for CharacteristicConfig {
    fn default() -> Self {
        Self {
            kind: CfKind::Kurtosis,
            window_s: 3.0,
            recursive: false,
            sta_s: 0.5,
            lta_s: 10.0,
            pre_rmean: true,
            pre_taper: true,
            post_taper: true,
            positive_derivative: true,
            gaussian: None,
        }
    }
}

/// Gaussian re-weighting parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianConfig {
    /// Trigger on/off threshold (same units as the characteristic function)
    pub threshold: f64,

    /// Kernel centre offset (seconds)
    #[serde(default)]
    pub mu: f64,

    /// Kernel half-width (seconds)
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_sigma() -> f64 {
    0.1
}

/// Migration engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Combination of aligned station contributions
    pub combine: CombineRule,

    /// Station count used by the mean rule
    pub normalization: MeanNormalization,

    /// Worker threads for the node loop (None = one per core)
    pub workers: Option<usize>,

    /// Nodes per unit of work; cancellation is checked between batches
    pub node_batch: usize,

    /// Keep the per-sample contributing-station count in the stack volume
    pub track_coverage: bool,

    /// Fill value for waveforms padded out to `[start + min tt, end + max tt]`
    pub pad_value: f64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            combine: CombineRule::Sum,
            normalization: MeanNormalization::StationsQueried,
            workers: None,
            node_batch: 64,
            track_coverage: false,
            pad_value: 0.0,
        }
    }
}

/// Location extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Parabolic sub-grid / sub-sample refinement of the maximum
    pub refine: bool,

    /// Maximum number of events extracted from one stack volume
    pub max_events: usize,

    /// Extraction stops once the remaining maximum falls below this value
    pub min_amplitude: f64,

    /// Spatial exclusion radius around an extracted event (grid coordinate units)
    pub exclusion_radius: f64,

    /// Temporal exclusion half-width around an extracted event (seconds)
    pub exclusion_duration_s: f64,

    /// Samples within this many seconds of the peak are left out of the noise floor
    pub noise_exclusion_s: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            refine: false,
            max_events: 1,
            min_amplitude: 0.0,
            exclusion_radius: 5.0,
            exclusion_duration_s: 1.0,
            noise_exclusion_s: 0.5,
        }
    }
}

impl WlocConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: WlocConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, falling back to built-in defaults when no file exists
    ///
    /// A missing file is not an error (warning + defaults); a malformed one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                warn!("Config file {:?} not found, using built-in defaults", p);
                Ok(Self::default())
            }
            None => {
                info!("No config file, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check all sections for out-of-range values
    pub fn validate(&self) -> Result<()> {
        self.characteristic.validate()?;
        self.migration.validate()?;
        self.extraction.validate()
    }
}

impl CharacteristicConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.window_s > 0.0) {
            return Err(Error::Config(format!(
                "characteristic.window_s must be > 0, got {}",
                self.window_s
            )));
        }
        if !(self.sta_s > 0.0) || !(self.lta_s > self.sta_s) {
            return Err(Error::Config(format!(
                "characteristic.sta_s/lta_s must satisfy 0 < sta_s < lta_s, got {}/{}",
                self.sta_s, self.lta_s
            )));
        }
        if let Some(g) = &self.gaussian {
            if !(g.sigma > 0.0) {
                return Err(Error::Config(format!(
                    "characteristic.gaussian.sigma must be > 0, got {}",
                    g.sigma
                )));
            }
        }
        Ok(())
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_batch == 0 {
            return Err(Error::Config("migration.node_batch must be >= 1".to_string()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("migration.workers must be >= 1 when set".to_string()));
        }
        if !self.pad_value.is_finite() {
            return Err(Error::Config("migration.pad_value must be finite".to_string()));
        }
        Ok(())
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(Error::Config("extraction.max_events must be >= 1".to_string()));
        }
        let valid = |v: f64| v >= 0.0 && v.is_finite();
        if !(valid(self.exclusion_radius)
            && valid(self.exclusion_duration_s)
            && valid(self.noise_exclusion_s))
        {
            return Err(Error::Config(
                "extraction exclusion radius/durations must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `WLOC_CONFIG` environment variable
/// 3. `<user config dir>/wloc/config.toml`, if it exists
///
/// Returns None when nothing applies (caller uses built-in defaults).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_file().filter(|p| p.exists())
}

/// Platform config file location (`~/.config/wloc/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wloc").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(WlocConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = WlocConfig::from_toml_str("").unwrap();
        assert_eq!(config, WlocConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = WlocConfig::from_toml_str(
            r#"
            [migration]
            combine = "mean"
            normalization = "covering_stations"
            "#,
        )
        .unwrap();
        assert_eq!(config.migration.combine, CombineRule::Mean);
        assert_eq!(config.migration.normalization, MeanNormalization::CoveringStations);
        assert_eq!(config.migration.node_batch, 64);
        assert_eq!(config.characteristic, CharacteristicConfig::default());
    }

    #[test]
    fn test_gaussian_section_defaults_sigma() {
        let config = WlocConfig::from_toml_str(
            r#"
            [characteristic.gaussian]
            threshold = 7.0
            "#,
        )
        .unwrap();
        let g = config.characteristic.gaussian.unwrap();
        assert_eq!(g.threshold, 7.0);
        assert_eq!(g.mu, 0.0);
        assert_eq!(g.sigma, 0.1);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let result = WlocConfig::from_toml_str(
            r#"
            [characteristic]
            window_s = 0.0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_sta_longer_than_lta_rejected() {
        let mut config = CharacteristicConfig::default();
        config.sta_s = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = MigrationConfig {
            node_batch: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_events_rejected() {
        let config = ExtractionConfig {
            max_events: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_infinite_exclusion_rejected() {
        let result = WlocConfig::from_toml_str("[extraction]\nexclusion_duration_s = inf\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config = ExtractionConfig {
            exclusion_radius: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let result = WlocConfig::from_toml_str(
            r#"
            [migration]
            combine = "median"
            "#,
        );
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_cli_arg_has_priority() {
        let path = resolve_config_path(Some(Path::new("/tmp/wloc-cli.toml")));
        assert_eq!(path, Some(PathBuf::from("/tmp/wloc-cli.toml")));
    }
}
