//! Stack volume: one stacked time series per grid node
//!
//! Rows are stored node-major in one contiguous buffer so every node's series
//! shares the same start time, sample interval and length.

use crate::grid::SpatialGrid;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use wloc_common::time::add_seconds;
use wloc_common::CombineRule;

/// Result of one migration run
#[derive(Debug, Clone, PartialEq)]
pub struct StackVolume {
    pub(crate) grid: SpatialGrid,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) delta: f64,
    pub(crate) n_samples: usize,
    pub(crate) values: Vec<f64>,
    pub(crate) coverage: Option<Vec<u32>>,
    pub(crate) node_done: Vec<bool>,
    pub(crate) combine: CombineRule,
    pub(crate) run_id: Uuid,
}

/// Maximum over all nodes at one output sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpaceMax {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub node: usize,
    pub coordinates: [f64; 3],
}

impl StackVolume {
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Time of output sample 0
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Shared sample interval (seconds)
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Samples per node
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn node_count(&self) -> usize {
        self.node_done.len()
    }

    pub fn combine(&self) -> CombineRule {
        self.combine
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Absolute time of output sample `k`
    pub fn time_of(&self, k: usize) -> DateTime<Utc> {
        add_seconds(self.start_time, k as f64 * self.delta)
    }

    /// Stack series of one node
    ///
    /// # Panics
    /// If `node` is out of range.
    pub fn node_series(&self, node: usize) -> &[f64] {
        &self.values[node * self.n_samples..(node + 1) * self.n_samples]
    }

    /// Number of stations whose data covered each sample of `node`
    ///
    /// Only present when coverage tracking was enabled for the run.
    pub fn coverage(&self, node: usize) -> Option<&[u32]> {
        self.coverage
            .as_ref()
            .map(|c| &c[node * self.n_samples..(node + 1) * self.n_samples])
    }

    /// False when the run was cancelled before every node was computed
    pub fn is_complete(&self) -> bool {
        self.node_done.iter().all(|&d| d)
    }

    /// Whether `node` was computed (rows of unfinished nodes are all zero)
    pub fn is_node_done(&self, node: usize) -> bool {
        self.node_done.get(node).copied().unwrap_or(false)
    }

    pub fn completed_nodes(&self) -> usize {
        self.node_done.iter().filter(|&&d| d).count()
    }

    /// Largest value over all completed nodes and samples
    ///
    /// Ties go to the earliest sample, then the lowest node index. None when no
    /// node was completed.
    pub fn global_max(&self) -> Option<(usize, usize, f64)> {
        argmax_rows(&self.values, self.n_samples, &self.node_done)
    }

    /// Per-sample maximum over all completed nodes (the "max stack" trace)
    ///
    /// Ties go to the lowest node index. Empty when no node was completed.
    pub fn max_over_space(&self) -> Vec<SpaceMax> {
        let done: Vec<usize> = (0..self.node_count()).filter(|&n| self.node_done[n]).collect();
        if done.is_empty() {
            return Vec::new();
        }

        (0..self.n_samples)
            .map(|k| {
                let (node, value) = done.iter().fold((done[0], f64::NEG_INFINITY), |(bn, bv), &n| {
                    let v = self.values[n * self.n_samples + k];
                    if v > bv {
                        (n, v)
                    } else {
                        (bn, bv)
                    }
                });
                SpaceMax {
                    time: self.time_of(k),
                    value,
                    node,
                    coordinates: self.grid.node_coordinates(node),
                }
            })
            .collect()
    }
}

/// `(node, sample, value)` of the largest value in completed rows
///
/// Ties go to the earliest sample, then the lowest node index.
pub(crate) fn argmax_rows(values: &[f64], n_samples: usize, done: &[bool]) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for node in (0..done.len()).filter(|&n| done[n]) {
        let row = &values[node * n_samples..(node + 1) * n_samples];
        for (k, &v) in row.iter().enumerate() {
            let better = match best {
                None => true,
                Some((bn, bk, bv)) => v > bv || (v == bv && (k, node) < (bk, bn)),
            };
            if better {
                best = Some((node, k, v));
            }
        }
    }
    best
}
