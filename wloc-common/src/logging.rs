//! Tracing subscriber initialisation
//!
//! `RUST_LOG` takes priority; otherwise the configured level applies to the
//! wloc crates. Output goes to stderr, or to the configured log file.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive for a configured level
pub fn default_directive(level: &str) -> String {
    format!("wloc_common={0},wloc_cf={0},wloc_mig={0}", level)
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns error if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_covers_all_crates() {
        let directive = default_directive("debug");
        assert!(directive.contains("wloc_cf=debug"));
        assert!(directive.contains("wloc_mig=debug"));
        assert!(directive.contains("wloc_common=debug"));
    }
}
