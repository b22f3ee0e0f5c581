//! Travel-time oracles
//!
//! The engine only needs one question answered: how long does a wave take
//! from a grid point to a station? `None` means the point is outside the
//! travel-time model for that station, which excludes the station from that
//! node's stack.
//!
//! Oracles are queried concurrently from the worker pool and must be read-only.

use crate::error::{MigrationError, Result};
use crate::grid::SpatialGrid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Source of station travel times (seconds)
pub trait TravelTimeOracle: Send + Sync {
    /// Travel time from `(x, y, z)` to `station`, or None when not covered
    fn travel_time(&self, station: &str, x: f64, y: f64, z: f64) -> Option<f64>;
}

impl<F> TravelTimeOracle for F
where
    F: Fn(&str, f64, f64, f64) -> Option<f64> + Send + Sync,
{
    fn travel_time(&self, station: &str, x: f64, y: f64, z: f64) -> Option<f64> {
        self(station, x, y, z)
    }
}

/// Straight rays through a constant-velocity medium
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomogeneousOracle {
    velocity: f64,
    stations: BTreeMap<String, [f64; 3]>,
}

impl HomogeneousOracle {
    /// # Errors
    /// `InvalidParameter` if the velocity is not positive and finite.
    pub fn new(velocity: f64) -> Result<Self> {
        if !(velocity.is_finite() && velocity > 0.0) {
            return Err(MigrationError::InvalidParameter(format!(
                "velocity must be > 0, got {}",
                velocity
            )));
        }
        Ok(Self {
            velocity,
            stations: BTreeMap::new(),
        })
    }

    /// Register (or move) a station
    pub fn with_station(mut self, id: impl Into<String>, position: [f64; 3]) -> Self {
        self.stations.insert(id.into(), position);
        self
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }
}

impl TravelTimeOracle for HomogeneousOracle {
    fn travel_time(&self, station: &str, x: f64, y: f64, z: f64) -> Option<f64> {
        let [sx, sy, sz] = *self.stations.get(station)?;
        let distance = ((x - sx).powi(2) + (y - sy).powi(2) + (z - sz).powi(2)).sqrt();
        Some(distance / self.velocity)
    }
}

/// Precomputed travel times on a grid, looked up at the nearest node
///
/// NaN entries and points outside the grid are not covered.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOracle {
    grid: SpatialGrid,
    tables: HashMap<String, Vec<f64>>,
}

impl TableOracle {
    pub fn new(grid: SpatialGrid) -> Self {
        Self {
            grid,
            tables: HashMap::new(),
        }
    }

    /// Add one station's table, in node order
    ///
    /// # Errors
    /// `InvalidParameter` if the table length differs from the grid's node count.
    pub fn with_table(mut self, station: impl Into<String>, times: Vec<f64>) -> Result<Self> {
        let station = station.into();
        if times.len() != self.grid.node_count() {
            return Err(MigrationError::InvalidParameter(format!(
                "travel-time table for {} has {} entries, grid has {} nodes",
                station,
                times.len(),
                self.grid.node_count()
            )));
        }
        self.tables.insert(station, times);
        Ok(self)
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }
}

impl TravelTimeOracle for TableOracle {
    fn travel_time(&self, station: &str, x: f64, y: f64, z: f64) -> Option<f64> {
        let table = self.tables.get(station)?;
        let node = self.grid.nearest_node(x, y, z)?;
        table.get(node).copied().filter(|t| t.is_finite())
    }
}

/// Serializable description of an oracle (used by the driver's scenario files)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleModel {
    Homogeneous {
        velocity: f64,
        stations: BTreeMap<String, [f64; 3]>,
    },
    Table {
        grid: SpatialGrid,
        /// Per-station times in node order; `null` entries are not covered
        times: BTreeMap<String, Vec<Option<f64>>>,
    },
}

impl OracleModel {
    /// Build the described oracle
    pub fn build(self) -> Result<Box<dyn TravelTimeOracle>> {
        match self {
            OracleModel::Homogeneous { velocity, stations } => {
                let oracle = stations
                    .into_iter()
                    .fold(HomogeneousOracle::new(velocity)?, |o, (id, pos)| {
                        o.with_station(id, pos)
                    });
                Ok(Box::new(oracle))
            }
            OracleModel::Table { grid, times } => {
                let mut oracle = TableOracle::new(grid);
                for (station, table) in times {
                    let table = table.into_iter().map(|t| t.unwrap_or(f64::NAN)).collect();
                    oracle = oracle.with_table(station, table)?;
                }
                Ok(Box::new(oracle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homogeneous_travel_time() {
        let oracle = HomogeneousOracle::new(2.0)
            .unwrap()
            .with_station("STA", [3.0, 4.0, 0.0]);
        assert_eq!(oracle.travel_time("STA", 0.0, 0.0, 0.0), Some(2.5));
        assert_eq!(oracle.travel_time("NOPE", 0.0, 0.0, 0.0), None);
        assert!(HomogeneousOracle::new(0.0).is_err());
    }

    #[test]
    fn test_table_lookup_and_coverage() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        let oracle = TableOracle::new(grid)
            .with_table("A", vec![0.5, f64::NAN])
            .unwrap();
        assert_eq!(oracle.travel_time("A", 0.1, 0.0, 0.0), Some(0.5));
        assert_eq!(oracle.travel_time("A", 1.0, 0.0, 0.0), None);
        assert_eq!(oracle.travel_time("A", 5.0, 0.0, 0.0), None);
        assert_eq!(oracle.travel_time("B", 0.0, 0.0, 0.0), None);
    }

    #[test]
    fn test_table_length_checked() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        let result = TableOracle::new(grid).with_table("A", vec![0.0; 7]);
        assert!(matches!(result, Err(MigrationError::InvalidParameter(_))));
    }

    #[test]
    fn test_closure_is_an_oracle() {
        let oracle = |station: &str, x: f64, _y: f64, _z: f64| {
            (station == "A").then_some(x * 0.1)
        };
        let dynamic: &dyn TravelTimeOracle = &oracle;
        assert_eq!(dynamic.travel_time("A", 10.0, 0.0, 0.0), Some(1.0));
        assert_eq!(dynamic.travel_time("B", 10.0, 0.0, 0.0), None);
    }

    #[test]
    fn test_model_from_json() {
        let model: OracleModel = serde_json::from_str(
            r#"{
                "type": "table",
                "grid": {"origin": [0, 0, 0], "spacing": [1, 1, 1], "counts": [1, 1, 2]},
                "times": {"A": [0.25, null]}
            }"#,
        )
        .unwrap();
        let oracle = model.build().unwrap();
        assert_eq!(oracle.travel_time("A", 0.0, 0.0, 0.0), Some(0.25));
        assert_eq!(oracle.travel_time("A", 0.0, 0.0, 1.0), None);
    }
}
