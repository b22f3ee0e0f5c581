//! Location record

use crate::oracle::TravelTimeOracle;
use crate::station::StationSeries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One located event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Migration run that produced the stack volume
    pub run_id: Uuid,

    pub origin_time: DateTime<Utc>,

    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Grid node holding the stack maximum (before any refinement)
    pub node_index: usize,

    /// Stack value at the maximum
    pub stack_max: f64,

    /// Peak over the noise floor of the peak node's series, when defined
    pub confidence: Option<f64>,

    /// Whether position and origin time were refined between samples
    pub refined: bool,

    /// Travel time from the location to each station (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_times: Option<BTreeMap<String, f64>>,
}

impl Location {
    /// Attach travel times from the located position to each station
    ///
    /// Stations the oracle does not cover at that position are omitted.
    pub fn with_travel_times(mut self, oracle: &dyn TravelTimeOracle, stations: &[StationSeries]) -> Self {
        let times = stations
            .iter()
            .filter_map(|s| {
                oracle
                    .travel_time(s.station_id(), self.x, self.y, self.z)
                    .map(|t| (s.station_id().to_string(), t))
            })
            .collect();
        self.travel_times = Some(times);
        self
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}
