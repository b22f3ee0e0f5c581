//! Migration engine
//!
//! For every grid node, each station's characteristic function is shifted back
//! by its travel time to that node and the shifted series are combined on a
//! shared output time axis `[start, end)`. Output sample `k` of a node reads
//! station sample `k + shift` where
//!
//! ```text
//! shift = round((output_start + tt - station_start) / dt)
//! ```
//!
//! Samples that fall outside a station's data contribute 0. A station without a
//! travel time at a node is left out of that node entirely.
//!
//! Nodes are independent. The volume is split into batches of consecutive
//! nodes, each batch owns a disjoint slice of the output buffer, and batches
//! run on a rayon pool. The cancel flag is checked between batches; a cancelled
//! run returns the volume with unfinished nodes marked.

use crate::error::{MigrationError, Result};
use crate::grid::SpatialGrid;
use crate::oracle::TravelTimeOracle;
use crate::stack::StackVolume;
use crate::station::{check_sampling, StationSeries};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;
use wloc_common::config::MigrationConfig;
use wloc_common::time::seconds_between;
use wloc_common::{CombineRule, MeanNormalization};

/// Stacking engine settings
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    combine: CombineRule,
    normalization: MeanNormalization,
    workers: Option<usize>,
    node_batch: usize,
    track_coverage: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self {
            combine: CombineRule::Sum,
            normalization: MeanNormalization::StationsQueried,
            workers: None,
            node_batch: 64,
            track_coverage: false,
            cancel: None,
        }
    }
}

/// Per-station coverage-gap counters for one run
#[derive(Debug, Clone, Default)]
struct GapCounts {
    /// Nodes where the oracle had no travel time
    excluded: Vec<usize>,
    /// Nodes where the shifted data missed the output window entirely
    no_overlap: Vec<usize>,
}

impl GapCounts {
    fn new(stations: usize) -> Self {
        Self {
            excluded: vec![0; stations],
            no_overlap: vec![0; stations],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.excluded.iter_mut().zip(other.excluded) {
            *a += b;
        }
        for (a, b) in self.no_overlap.iter_mut().zip(other.no_overlap) {
            *a += b;
        }
        self
    }
}

/// Disjoint output slices of one batch of consecutive nodes
struct BatchSlot<'a> {
    first_node: usize,
    values: &'a mut [f64],
    done: &'a mut [bool],
    coverage: Option<&'a mut [u32]>,
}

/// Station data the node loop needs, resolved once per run
struct StationView<'a> {
    id: &'a str,
    samples: &'a [f64],
    /// output_start - station_start (seconds)
    offset_s: f64,
    cache: Option<&'a [Option<f64>]>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine configured from the `[migration]` section
    ///
    /// # Errors
    /// `InvalidParameter` for a zero batch size or worker count.
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        let engine = Self::new()
            .with_combine(config.combine)
            .with_normalization(config.normalization)
            .with_node_batch(config.node_batch)?
            .with_coverage_tracking(config.track_coverage);
        match config.workers {
            Some(n) => engine.with_workers(n),
            None => Ok(engine),
        }
    }

    pub fn with_combine(mut self, combine: CombineRule) -> Self {
        self.combine = combine;
        self
    }

    /// Station count used by the mean rule
    pub fn with_normalization(mut self, normalization: MeanNormalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Run on a dedicated pool of `workers` threads instead of the global pool
    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(MigrationError::InvalidParameter(
                "worker count must be >= 1".to_string(),
            ));
        }
        self.workers = Some(workers);
        Ok(self)
    }

    /// Nodes per unit of work
    pub fn with_node_batch(mut self, node_batch: usize) -> Result<Self> {
        if node_batch == 0 {
            return Err(MigrationError::InvalidParameter(
                "node batch size must be >= 1".to_string(),
            ));
        }
        self.node_batch = node_batch;
        Ok(self)
    }

    /// Record per-sample contributing-station counts in the volume
    pub fn with_coverage_tracking(mut self, enabled: bool) -> Self {
        self.track_coverage = enabled;
        self
    }

    /// Flag checked between node batches; setting it stops the run early
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn needs_coverage(&self) -> bool {
        self.track_coverage
            || (self.combine == CombineRule::Mean
                && self.normalization == MeanNormalization::CoveringStations)
    }

    /// Stack all stations over `grid` for output times `[start, end)`
    ///
    /// # Errors
    /// - `EmptyStationSet`, `DuplicateStation`, `SampleIntervalMismatch` from
    ///   the station set
    /// - `InvalidTimeWindow` if `end` is not after `start`
    /// - `InvalidParameter` if the stack volume size overflows `usize`
    /// - `ThreadPool` if a dedicated worker pool cannot be built
    pub fn migrate<O>(
        &self,
        stations: &[StationSeries],
        grid: &SpatialGrid,
        oracle: &O,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<StackVolume>
    where
        O: TravelTimeOracle + ?Sized,
    {
        let delta = check_sampling(stations)?;
        let span = seconds_between(start, end);
        if !(span > 0.0) {
            return Err(MigrationError::InvalidTimeWindow(format!(
                "output window end {} must be after start {}",
                end, start
            )));
        }
        let n_samples = ((span / delta).round() as usize).max(1);
        let n_nodes = grid.node_count();
        let total_len = n_nodes.checked_mul(n_samples).ok_or_else(|| {
            MigrationError::InvalidParameter(format!(
                "stack volume of {} nodes x {} samples does not fit in memory",
                n_nodes, n_samples
            ))
        })?;
        let batch_len = self.node_batch.checked_mul(n_samples).ok_or_else(|| {
            MigrationError::InvalidParameter(format!(
                "node batch of {} nodes x {} samples is too large",
                self.node_batch, n_samples
            ))
        })?;
        let run_id = Uuid::new_v4();

        let span_guard = info_span!("migrate", run_id = %run_id).entered();
        info!(
            stations = stations.len(),
            nodes = n_nodes,
            samples = n_samples,
            combine = %self.combine,
            "Migration started"
        );
        let started = Instant::now();

        let views: Vec<StationView<'_>> = stations
            .iter()
            .map(|s| {
                let cache = s.cached_travel_times(grid);
                if cache.is_none() && s.travel_time_cache().is_some() {
                    debug!(
                        station = %s.station_id(),
                        "Travel-time cache built on another grid, querying the oracle"
                    );
                }
                StationView {
                    id: s.station_id(),
                    samples: s.cf().samples(),
                    offset_s: seconds_between(s.cf().start_time(), start),
                    cache,
                }
            })
            .collect();

        let mut values = vec![0.0; total_len];
        let mut node_done = vec![false; n_nodes];
        let mut coverage = self.needs_coverage().then(|| vec![0u32; total_len]);

        let gaps = {
            let mut coverage_chunks = coverage.as_mut().map(|c| c.chunks_mut(batch_len));
            let slots: Vec<BatchSlot<'_>> = values
                .chunks_mut(batch_len)
                .zip(node_done.chunks_mut(self.node_batch))
                .enumerate()
                .map(|(i, (values, done))| BatchSlot {
                    first_node: i * self.node_batch,
                    values,
                    done,
                    coverage: coverage_chunks.as_mut().and_then(|it| it.next()),
                })
                .collect();

            let run = || {
                slots
                    .into_par_iter()
                    .map(|slot| self.run_batch(slot, grid, oracle, &views, delta, n_samples))
                    .reduce(|| GapCounts::new(views.len()), GapCounts::merge)
            };

            match self.workers {
                Some(n) => rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| MigrationError::ThreadPool(e.to_string()))?
                    .install(run),
                None => run(),
            }
        };

        for (i, view) in views.iter().enumerate() {
            if gaps.excluded[i] > 0 {
                warn!(
                    station = %view.id,
                    nodes = gaps.excluded[i],
                    "No travel time at some nodes, station left out there"
                );
            }
            if gaps.no_overlap[i] > 0 {
                warn!(
                    station = %view.id,
                    nodes = gaps.no_overlap[i],
                    "Shifted data misses the output window at some nodes, contributing zero"
                );
            }
        }

        if self.combine == CombineRule::Mean
            && self.normalization == MeanNormalization::CoveringStations
            && !self.track_coverage
        {
            coverage = None;
        }

        let volume = StackVolume {
            grid: *grid,
            start_time: start,
            delta,
            n_samples,
            values,
            coverage,
            node_done,
            combine: self.combine,
            run_id,
        };

        if volume.is_complete() {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Migration finished"
            );
        } else {
            warn!(
                completed = volume.completed_nodes(),
                nodes = n_nodes,
                "Migration cancelled, stack volume is incomplete"
            );
        }
        drop(span_guard);
        Ok(volume)
    }

    fn run_batch<O>(
        &self,
        slot: BatchSlot<'_>,
        grid: &SpatialGrid,
        oracle: &O,
        views: &[StationView<'_>],
        delta: f64,
        n_samples: usize,
    ) -> GapCounts
    where
        O: TravelTimeOracle + ?Sized,
    {
        let mut gaps = GapCounts::new(views.len());
        if self.is_cancelled() {
            return gaps;
        }

        let BatchSlot {
            first_node,
            values,
            done,
            mut coverage,
        } = slot;

        for (i, row) in values.chunks_mut(n_samples).enumerate() {
            let node = first_node + i;
            let cov_row = coverage
                .as_deref_mut()
                .map(|c| &mut c[i * n_samples..(i + 1) * n_samples]);
            self.stack_node(node, row, cov_row, grid, oracle, views, delta, &mut gaps);
            done[i] = true;
        }
        debug!(first_node, nodes = done.len(), "Node batch stacked");
        gaps
    }

    #[allow(clippy::too_many_arguments)]
    fn stack_node<O>(
        &self,
        node: usize,
        row: &mut [f64],
        mut coverage: Option<&mut [u32]>,
        grid: &SpatialGrid,
        oracle: &O,
        views: &[StationView<'_>],
        delta: f64,
        gaps: &mut GapCounts,
    ) where
        O: TravelTimeOracle + ?Sized,
    {
        let [x, y, z] = grid.node_coordinates(node);
        let mut queried = 0usize;

        if self.combine == CombineRule::Max {
            row.fill(f64::NEG_INFINITY);
        }

        for (s, view) in views.iter().enumerate() {
            let tt = match view.cache {
                Some(cache) => cache[node],
                None => oracle.travel_time(view.id, x, y, z),
            };
            let Some(tt) = tt.filter(|t| t.is_finite()) else {
                gaps.excluded[s] += 1;
                continue;
            };
            queried += 1;

            let shift = ((view.offset_s + tt) / delta).round() as i64;
            let covered = covered_range(shift, view.samples.len(), row.len());
            if covered.is_empty() {
                gaps.no_overlap[s] += 1;
            }

            match self.combine {
                CombineRule::Sum | CombineRule::Mean => {
                    for k in covered.clone() {
                        row[k] += view.samples[(k as i64 + shift) as usize];
                    }
                }
                CombineRule::Max => {
                    for (k, r) in row.iter_mut().enumerate() {
                        let v = if covered.contains(&k) {
                            view.samples[(k as i64 + shift) as usize]
                        } else {
                            0.0
                        };
                        *r = r.max(v);
                    }
                }
            }

            if let Some(c) = coverage.as_deref_mut() {
                for k in covered {
                    c[k] += 1;
                }
            }
        }

        match self.combine {
            CombineRule::Max if queried == 0 => row.fill(0.0),
            CombineRule::Mean => match (self.normalization, coverage) {
                (MeanNormalization::CoveringStations, Some(c)) => {
                    for (r, &n) in row.iter_mut().zip(c.iter()) {
                        *r = if n > 0 { *r / n as f64 } else { 0.0 };
                    }
                }
                _ if queried > 0 => {
                    let n = queried as f64;
                    row.iter_mut().for_each(|r| *r /= n);
                }
                _ => {}
            },
            _ => {}
        }
    }
}

/// Output samples `k` for which `k + shift` indexes a station sample
fn covered_range(shift: i64, station_len: usize, n_samples: usize) -> Range<usize> {
    let lo = (-shift).clamp(0, n_samples as i64);
    let hi = (station_len as i64 - shift).clamp(0, n_samples as i64);
    if hi <= lo {
        0..0
    } else {
        lo as usize..hi as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wloc_cf::WaveformSample;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn station(id: &str, samples: Vec<f64>, start: DateTime<Utc>) -> StationSeries {
        StationSeries::new(id, WaveformSample::new(samples, 0.1, start).unwrap())
    }

    fn line_grid(n: usize) -> SpatialGrid {
        SpatialGrid::new([0.0; 3], [1.0; 3], [n, 1, 1]).unwrap()
    }

    #[test]
    fn test_covered_range() {
        assert_eq!(covered_range(0, 10, 5), 0..5);
        assert_eq!(covered_range(3, 10, 20), 0..7);
        assert_eq!(covered_range(-4, 10, 20), 4..14);
        assert_eq!(covered_range(50, 10, 20), 0..0);
        assert_eq!(covered_range(-30, 10, 20), 0..0);
    }

    #[test]
    fn test_shift_by_travel_time() {
        // Impulse at 1.0 s, travel time 0.3 s: origin-axis peak at 0.7 s
        let mut x = vec![0.0; 20];
        x[10] = 1.0;
        let stations = vec![station("A", x, t0())];
        let oracle = |_: &str, _: f64, _: f64, _: f64| Some(0.3);
        let end = t0() + chrono::Duration::seconds(2);

        let volume = MigrationEngine::new()
            .migrate(&stations, &line_grid(1), &oracle, t0(), end)
            .unwrap();
        assert_eq!(volume.n_samples(), 20);
        let row = volume.node_series(0);
        assert_eq!(row[7], 1.0);
        assert_eq!(row.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_excluded_station_and_max_rule() {
        let stations = vec![
            station("A", vec![-1.0; 10], t0()),
            station("B", vec![-2.0; 10], t0()),
        ];
        let oracle = |s: &str, x: f64, _: f64, _: f64| (s == "A" || x > 0.5).then_some(0.0);
        let end = t0() + chrono::Duration::seconds(1);

        let volume = MigrationEngine::new()
            .with_combine(CombineRule::Max)
            .migrate(&stations, &line_grid(2), &oracle, t0(), end)
            .unwrap();
        assert!(volume.node_series(0).iter().all(|&v| v == -1.0));
        assert!(volume.node_series(1).iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_mean_normalizations() {
        // A covers the whole window, B only the second half
        let half = t0() + chrono::Duration::milliseconds(500);
        let stations = vec![
            station("A", vec![2.0; 10], t0()),
            station("B", vec![4.0; 5], half),
        ];
        let oracle = |_: &str, _: f64, _: f64, _: f64| Some(0.0);
        let end = t0() + chrono::Duration::seconds(1);

        let queried = MigrationEngine::new()
            .with_combine(CombineRule::Mean)
            .migrate(&stations, &line_grid(1), &oracle, t0(), end)
            .unwrap();
        assert_eq!(queried.node_series(0)[0], 1.0);
        assert_eq!(queried.node_series(0)[9], 3.0);

        let covering = MigrationEngine::new()
            .with_combine(CombineRule::Mean)
            .with_normalization(MeanNormalization::CoveringStations)
            .with_coverage_tracking(true)
            .migrate(&stations, &line_grid(1), &oracle, t0(), end)
            .unwrap();
        assert_eq!(covering.node_series(0)[0], 2.0);
        assert_eq!(covering.node_series(0)[9], 3.0);
        assert_eq!(covering.coverage(0).unwrap()[0], 1);
        assert_eq!(covering.coverage(0).unwrap()[9], 2);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let stations = vec![station("A", vec![0.0; 10], t0())];
        let oracle = |_: &str, _: f64, _: f64, _: f64| Some(0.0);
        let result = MigrationEngine::new().migrate(&stations, &line_grid(1), &oracle, t0(), t0());
        assert!(matches!(result, Err(MigrationError::InvalidTimeWindow(_))));
    }

    #[test]
    fn test_zero_config_values_rejected() {
        assert!(MigrationEngine::new().with_node_batch(0).is_err());
        assert!(MigrationEngine::new().with_workers(0).is_err());
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let stations = vec![station("A", vec![1.0; 10], t0())];
        let oracle = |_: &str, _: f64, _: f64, _: f64| Some(0.0);
        let end = t0() + chrono::Duration::seconds(1);
        let result = MigrationEngine::new()
            .with_node_batch(usize::MAX)
            .unwrap()
            .migrate(&stations, &line_grid(1), &oracle, t0(), end);
        assert!(matches!(result, Err(MigrationError::InvalidParameter(_))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let stations = vec![station("A", vec![1.0; 10], t0())];
        let oracle = |_: &str, _: f64, _: f64, _: f64| Some(0.0);
        let flag = Arc::new(AtomicBool::new(true));
        let end = t0() + chrono::Duration::seconds(1);

        let volume = MigrationEngine::new()
            .with_node_batch(2)
            .unwrap()
            .with_cancel_flag(flag)
            .migrate(&stations, &line_grid(5), &oracle, t0(), end)
            .unwrap();
        assert!(!volume.is_complete());
        assert_eq!(volume.completed_nodes(), 0);
        assert_eq!(volume.global_max(), None);
    }
}
