//! Migration driver (wloc-mig) - Main entry point
//!
//! Reads a JSON scenario (stations, grid, travel-time model, output window),
//! computes characteristic functions, migrates them and writes the located
//! events as JSON. Ctrl+C stops the node loop between batches and the partial
//! result is written, marked incomplete.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{info, warn};
use uuid::Uuid;

use wloc_cf::{CfPipeline, WaveformSample};
use wloc_common::config::{resolve_config_path, WlocConfig};
use wloc_common::logging::init_tracing;
use wloc_mig::{
    prepare_stations, Location, LocationExtractor, MigrationEngine, OracleModel, SpatialGrid,
    StationSeries, TravelTimeOracle,
};

/// Command-line arguments for wloc-mig
#[derive(Parser, Debug)]
#[command(name = "wloc-mig")]
#[command(about = "Waveform migration and stacking event locator")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "WLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Scenario file (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for the located events (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worker threads for the node loop (overrides the config file)
    #[arg(short, long)]
    threads: Option<usize>,
}

/// Output window of origin times
#[derive(Debug, Deserialize)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct StationInput {
    id: String,
    waveform: WaveformSample,
    /// Raw data still needs the characteristic-function pipeline
    #[serde(default = "default_raw")]
    raw: bool,
}

fn default_raw() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Scenario {
    window: Window,
    grid: SpatialGrid,
    oracle: OracleModel,
    stations: Vec<StationInput>,
}

#[derive(Debug, Serialize)]
struct Report {
    run_id: Uuid,
    complete: bool,
    completed_nodes: usize,
    nodes: usize,
    locations: Vec<Location>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = WlocConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    if let Some(threads) = args.threads {
        config.migration.workers = Some(threads);
    }

    init_tracing(&config.logging).context("Failed to initialize logging")?;
    info!("Starting wloc-mig");
    match &config_path {
        Some(p) => info!("Configuration: {}", p.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read scenario {}", args.input.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse scenario {}", args.input.display()))?;
    info!(
        stations = scenario.stations.len(),
        nodes = scenario.grid.node_count(),
        "Scenario loaded"
    );

    let pipeline = CfPipeline::from_config(&config.characteristic)
        .context("Invalid characteristic-function settings")?;
    let engine = MigrationEngine::from_config(&config.migration)
        .context("Invalid migration settings")?;
    let extractor = LocationExtractor::from_config(&config.extraction)
        .context("Invalid extraction settings")?;
    let oracle: Arc<dyn TravelTimeOracle> = Arc::from(
        scenario
            .oracle
            .build()
            .context("Invalid travel-time model")?,
    );

    let (raw, ready): (Vec<_>, Vec<_>) = scenario.stations.into_iter().partition(|s| s.raw);
    let mut stations = prepare_stations(
        &pipeline,
        raw.into_iter().map(|s| (s.id, s.waveform)).collect(),
    );
    stations.extend(ready.into_iter().map(|s| StationSeries::new(s.id, s.waveform)));

    let (start, end) = (scenario.window.start, scenario.window.end);
    let grid = scenario.grid;
    let pad_value = config.migration.pad_value;
    let stations: Arc<Vec<StationSeries>> = Arc::new(
        stations
            .into_iter()
            .map(|s| s.padded_for_grid(&grid, oracle.as_ref(), start, end, pad_value))
            .collect(),
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let engine = engine.with_cancel_flag(Arc::clone(&cancel));

    let mut task = {
        let stations = Arc::clone(&stations);
        let oracle = Arc::clone(&oracle);
        tokio::task::spawn_blocking(move || engine.migrate(&stations, &grid, oracle.as_ref(), start, end))
    };

    let volume = tokio::select! {
        result = &mut task => result,
        _ = shutdown_signal() => {
            cancel.store(true, Ordering::Relaxed);
            task.await
        }
    }
    .context("Migration task failed")?
    .context("Migration failed")?;

    if !volume.is_complete() {
        warn!(
            completed = volume.completed_nodes(),
            nodes = volume.node_count(),
            "Writing partial result"
        );
    }

    let locations: Vec<Location> = extractor
        .extract_all(&volume)
        .into_iter()
        .map(|loc| loc.with_travel_times(oracle.as_ref(), &stations))
        .collect();
    for loc in &locations {
        info!(
            origin_time = %loc.origin_time,
            x = loc.x,
            y = loc.y,
            z = loc.z,
            stack_max = loc.stack_max,
            "Event located"
        );
    }

    let report = Report {
        run_id: volume.run_id(),
        complete: volume.is_complete(),
        completed_nodes: volume.completed_nodes(),
        nodes: volume.node_count(),
        locations,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    info!("Done");
    Ok(())
}

/// Resolves on Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling migration");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling migration");
        },
    }
}
