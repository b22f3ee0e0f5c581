//! # WLOC Migration (wloc-mig)
//!
//! Multi-station grid search: every station's characteristic function is
//! shifted back by its travel time to each candidate grid node, the shifted
//! series are stacked on a shared origin-time axis, and the maximum of the
//! resulting space-time volume gives location and origin time.
//!
//! **Pipeline:**
//! 1. [`station::prepare_stations`] turns raw waveforms into characteristic
//!    functions (parallel across stations)
//! 2. [`MigrationEngine::migrate`] stacks them over a [`SpatialGrid`] using a
//!    [`TravelTimeOracle`] (parallel across node batches)
//! 3. [`LocationExtractor`] reduces the [`StackVolume`] to [`Location`] records

pub mod engine;
pub mod error;
pub mod extract;
pub mod grid;
pub mod location;
pub mod oracle;
pub mod stack;
pub mod station;

pub use engine::MigrationEngine;
pub use error::{MigrationError, Result};
pub use extract::LocationExtractor;
pub use grid::SpatialGrid;
pub use location::Location;
pub use oracle::{HomogeneousOracle, OracleModel, TableOracle, TravelTimeOracle};
pub use stack::{SpaceMax, StackVolume};
pub use station::{check_sampling, prepare_stations, StationSeries};
