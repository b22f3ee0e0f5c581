//! Regular 3-D search grid
//!
//! Nodes are numbered `(ix * ny + iy) * nz + iz`, i.e. z varies fastest. The
//! same order is used for stack volume rows and for extraction tie-breaks.

use crate::error::{MigrationError, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned, regularly spaced grid of candidate source positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridRecord", into = "GridRecord")]
pub struct SpatialGrid {
    origin: [f64; 3],
    spacing: [f64; 3],
    counts: [usize; 3],
}

/// Unvalidated wire form of [`SpatialGrid`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridRecord {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    pub counts: [usize; 3],
}

impl TryFrom<GridRecord> for SpatialGrid {
    type Error = MigrationError;

    fn try_from(record: GridRecord) -> Result<Self> {
        Self::new(record.origin, record.spacing, record.counts)
    }
}

impl From<SpatialGrid> for GridRecord {
    fn from(grid: SpatialGrid) -> Self {
        Self {
            origin: grid.origin,
            spacing: grid.spacing,
            counts: grid.counts,
        }
    }
}

const AXES: [&str; 3] = ["x", "y", "z"];

impl SpatialGrid {
    /// Create a grid
    ///
    /// # Errors
    /// `InvalidGrid` naming the axis when a spacing is not positive and finite,
    /// a count is zero, or an origin coordinate is not finite.
    pub fn new(origin: [f64; 3], spacing: [f64; 3], counts: [usize; 3]) -> Result<Self> {
        for axis in 0..3 {
            if !origin[axis].is_finite() {
                return Err(MigrationError::InvalidGrid(format!(
                    "origin {} must be finite, got {}",
                    AXES[axis], origin[axis]
                )));
            }
            if !(spacing[axis].is_finite() && spacing[axis] > 0.0) {
                return Err(MigrationError::InvalidGrid(format!(
                    "spacing d{} must be > 0, got {}",
                    AXES[axis], spacing[axis]
                )));
            }
            if counts[axis] == 0 {
                return Err(MigrationError::InvalidGrid(format!(
                    "node count n{} must be >= 1",
                    AXES[axis]
                )));
            }
        }
        counts
            .iter()
            .try_fold(1usize, |acc, &c| acc.checked_mul(c))
            .ok_or_else(|| MigrationError::InvalidGrid("node count overflows usize".to_string()))?;

        Ok(Self {
            origin,
            spacing,
            counts,
        })
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        self.counts[0] * self.counts[1] * self.counts[2]
    }

    /// Linear node index of `(ix, iy, iz)`
    pub fn node_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        (ix * self.counts[1] + iy) * self.counts[2] + iz
    }

    /// `(ix, iy, iz)` of a linear node index
    pub fn node_indices(&self, node: usize) -> [usize; 3] {
        let [_, ny, nz] = self.counts;
        [node / (ny * nz), (node / nz) % ny, node % nz]
    }

    /// Coordinates of a linear node index
    pub fn node_coordinates(&self, node: usize) -> [f64; 3] {
        let idx = self.node_indices(node);
        [0, 1, 2].map(|a| self.origin[a] + idx[a] as f64 * self.spacing[a])
    }

    /// Index of the node nearest to a point, or None outside the grid
    ///
    /// Points up to half a cell beyond the outer nodes still map to them.
    pub fn nearest_node(&self, x: f64, y: f64, z: f64) -> Option<usize> {
        let point = [x, y, z];
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let f = ((point[axis] - self.origin[axis]) / self.spacing[axis]).round();
            if !(f >= 0.0 && f < self.counts[axis] as f64) {
                return None;
            }
            idx[axis] = f as usize;
        }
        Some(self.node_index(idx[0], idx[1], idx[2]))
    }

    /// Euclidean distance between two nodes in coordinate units
    pub fn node_distance(&self, a: usize, b: usize) -> f64 {
        let (pa, pb) = (self.node_coordinates(a), self.node_coordinates(b));
        (0..3)
            .map(|i| (pa[i] - pb[i]) * (pa[i] - pb[i]))
            .sum::<f64>()
            .sqrt()
    }
}
