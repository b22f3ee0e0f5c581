//! Per-station input to a migration run

use crate::error::{MigrationError, Result};
use crate::grid::SpatialGrid;
use crate::oracle::TravelTimeOracle;
use rayon::prelude::*;
use std::collections::HashSet;
use chrono::{DateTime, Utc};
use tracing::debug;
use wloc_cf::{CfPipeline, WaveformSample};
use wloc_common::time::add_seconds;

/// Relative tolerance when comparing sample intervals
const DELTA_REL_TOLERANCE: f64 = 1e-9;

/// One station's characteristic function, ready to be migrated
#[derive(Debug, Clone, PartialEq)]
pub struct StationSeries {
    station_id: String,
    cf: WaveformSample,
    travel_times: Option<TravelTimeCache>,
}

/// Travel times to every node of the grid they were computed on
#[derive(Debug, Clone, PartialEq)]
struct TravelTimeCache {
    grid: SpatialGrid,
    times: Vec<Option<f64>>,
}

impl StationSeries {
    pub fn new(station_id: impl Into<String>, cf: WaveformSample) -> Self {
        Self {
            station_id: station_id.into(),
            cf,
            travel_times: None,
        }
    }

    /// Precompute this station's travel time to every node of `grid`
    ///
    /// The engine uses the cache instead of querying the oracle only when it
    /// migrates over this same grid.
    pub fn with_travel_time_cache(mut self, grid: &SpatialGrid, oracle: &dyn TravelTimeOracle) -> Self {
        let times = (0..grid.node_count())
            .map(|node| {
                let [x, y, z] = grid.node_coordinates(node);
                oracle.travel_time(&self.station_id, x, y, z)
            })
            .collect();
        self.travel_times = Some(TravelTimeCache { grid: *grid, times });
        self
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn cf(&self) -> &WaveformSample {
        &self.cf
    }

    pub fn travel_time_cache(&self) -> Option<&[Option<f64>]> {
        self.travel_times.as_ref().map(|c| c.times.as_slice())
    }

    /// Earliest and latest travel time from this station to any node of `grid`
    ///
    /// None when no node has a travel time.
    pub fn travel_time_span<O>(&self, grid: &SpatialGrid, oracle: &O) -> Option<(f64, f64)>
    where
        O: TravelTimeOracle + ?Sized,
    {
        let cache = self.cached_travel_times(grid);
        (0..grid.node_count())
            .filter_map(|node| match cache {
                Some(times) => times[node],
                None => {
                    let [x, y, z] = grid.node_coordinates(node);
                    oracle.travel_time(&self.station_id, x, y, z)
                }
            })
            .filter(|t| t.is_finite())
            .fold(None, |span, t| match span {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }

    /// Pad the characteristic function with `pad_value` over every span the
    /// engine reads when stacking output times `[start, end]` on `grid`
    ///
    /// That span is `[start + min tt, end + max tt]`, so every node sees the same
    /// fill value where data are missing. A station with no travel time
    /// anywhere is returned unchanged.
    pub fn padded_for_grid<O>(
        self,
        grid: &SpatialGrid,
        oracle: &O,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pad_value: f64,
    ) -> Self
    where
        O: TravelTimeOracle + ?Sized,
    {
        let Some((lo, hi)) = self.travel_time_span(grid, oracle) else {
            return self;
        };
        let cf = self
            .cf
            .pad_to_window(add_seconds(start, lo), add_seconds(end, hi), pad_value);
        Self { cf, ..self }
    }

    /// Cached travel times, if the cache was built on `grid`
    pub fn cached_travel_times(&self, grid: &SpatialGrid) -> Option<&[Option<f64>]> {
        self.travel_times
            .as_ref()
            .filter(|c| c.grid == *grid)
            .map(|c| c.times.as_slice())
    }
}

fn same_interval(a: f64, b: f64) -> bool {
    (a - b).abs() <= DELTA_REL_TOLERANCE * a.abs().max(b.abs())
}

/// Check that a station set can be migrated together
///
/// Returns the shared sample interval.
///
/// # Errors
/// - `EmptyStationSet` when there are no stations
/// - `DuplicateStation` when two series share an id
/// - `SampleIntervalMismatch` naming the first station whose interval differs
///   from the first station's
pub fn check_sampling(stations: &[StationSeries]) -> Result<f64> {
    let first = stations.first().ok_or(MigrationError::EmptyStationSet)?;
    let expected = first.cf.delta();

    let mut seen = HashSet::with_capacity(stations.len());
    for station in stations {
        if !seen.insert(station.station_id.as_str()) {
            return Err(MigrationError::DuplicateStation(station.station_id.clone()));
        }
        let found = station.cf.delta();
        if !same_interval(expected, found) {
            return Err(MigrationError::SampleIntervalMismatch {
                station: station.station_id.clone(),
                expected,
                found,
            });
        }
    }
    Ok(expected)
}

/// Run the characteristic-function pipeline over many raw waveforms in parallel
///
/// Output order follows input order.
pub fn prepare_stations(pipeline: &CfPipeline, waveforms: Vec<(String, WaveformSample)>) -> Vec<StationSeries> {
    let stations: Vec<StationSeries> = waveforms
        .into_par_iter()
        .map(|(id, raw)| {
            let cf = pipeline.process(&raw);
            StationSeries::new(id, cf)
        })
        .collect();
    debug!(stations = stations.len(), "Characteristic functions prepared");
    stations
}
