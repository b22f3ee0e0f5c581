//! Location extraction from a stack volume
//!
//! The global maximum over all completed `(node, sample)` pairs gives the
//! location and origin time. Ties go to the earliest sample, then the lowest
//! node index.
//!
//! Optional refinement fits a parabola through the maximum and its two
//! neighbours along each grid axis and along time. The vertex offset is clamped
//! to half a cell; a missing or unfinished neighbour, or a curvature that does
//! not describe a maximum, leaves that axis unrefined.
//!
//! Confidence is the peak value over the median absolute stack value of the
//! peak node's series, ignoring samples within the noise exclusion window of
//! the peak. Sharper, more isolated peaks score higher.
//!
//! Multi-event extraction masks a space-time neighbourhood around each
//! extracted maximum and searches again until the amplitude floor or the event
//! limit is reached.

use crate::error::{MigrationError, Result};
use crate::location::Location;
use crate::stack::{argmax_rows, StackVolume};
use tracing::{debug, info};
use wloc_cf::filters::median;
use wloc_common::config::ExtractionConfig;
use wloc_common::time::add_seconds;

/// Reduces a stack volume to located events
#[derive(Debug, Clone, PartialEq)]
pub struct LocationExtractor {
    refine: bool,
    max_events: usize,
    min_amplitude: f64,
    exclusion_radius: f64,
    exclusion_duration_s: f64,
    noise_exclusion_s: f64,
}

impl Default for LocationExtractor {
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

/// Parabola vertex offset from three equally spaced samples, in samples
fn parabolic_offset(before: f64, peak: f64, after: f64) -> f64 {
    let curvature = before - 2.0 * peak + after;
    if !(curvature < 0.0) || !before.is_finite() || !after.is_finite() {
        return 0.0;
    }
    (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
}

impl LocationExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor configured from the `[extraction]` section
    ///
    /// # Errors
    /// `InvalidParameter` for a zero event count or negative exclusion sizes.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        Self::new()
            .with_refinement(config.refine)
            .with_noise_exclusion(config.noise_exclusion_s)?
            .with_multi_event(
                config.max_events,
                config.min_amplitude,
                config.exclusion_radius,
                config.exclusion_duration_s,
            )
    }

    /// Enable parabolic sub-grid / sub-sample refinement
    pub fn with_refinement(mut self, enabled: bool) -> Self {
        self.refine = enabled;
        self
    }

    /// Half-width (seconds) around the peak left out of the noise floor
    pub fn with_noise_exclusion(mut self, seconds: f64) -> Result<Self> {
        if !(seconds >= 0.0 && seconds.is_finite()) {
            return Err(MigrationError::InvalidParameter(format!(
                "noise exclusion must be a finite value >= 0 s, got {}",
                seconds
            )));
        }
        self.noise_exclusion_s = seconds;
        Ok(self)
    }

    /// Multi-event limits: event count, amplitude floor and exclusion zone
    pub fn with_multi_event(
        mut self,
        max_events: usize,
        min_amplitude: f64,
        exclusion_radius: f64,
        exclusion_duration_s: f64,
    ) -> Result<Self> {
        if max_events == 0 {
            return Err(MigrationError::InvalidParameter(
                "max_events must be >= 1".to_string(),
            ));
        }
        let valid = |v: f64| v >= 0.0 && v.is_finite();
        if !(valid(exclusion_radius) && valid(exclusion_duration_s)) {
            return Err(MigrationError::InvalidParameter(format!(
                "exclusion radius and duration must be finite and >= 0, got {} and {} s",
                exclusion_radius, exclusion_duration_s
            )));
        }
        self.max_events = max_events;
        self.min_amplitude = min_amplitude;
        self.exclusion_radius = exclusion_radius;
        self.exclusion_duration_s = exclusion_duration_s;
        Ok(self)
    }

    /// Location of the global maximum, or None if no node was completed
    pub fn extract(&self, volume: &StackVolume) -> Option<Location> {
        let (node, k, value) = volume.global_max()?;
        Some(self.build_location(volume, node, k, value))
    }

    /// Successive maxima with their neighbourhoods masked out
    ///
    /// Stops at `max_events`, or once the remaining maximum is below the
    /// amplitude floor.
    pub fn extract_all(&self, volume: &StackVolume) -> Vec<Location> {
        let n_samples = volume.n_samples();
        let mut masked = volume.values.clone();
        let half_window = (self.exclusion_duration_s / volume.delta() + 1e-9).floor() as usize;
        let mut events = Vec::new();

        while events.len() < self.max_events {
            let Some((node, k, value)) = argmax_rows(&masked, n_samples, &volume.node_done) else {
                break;
            };
            if !value.is_finite() || value < self.min_amplitude {
                debug!(value, min_amplitude = self.min_amplitude, "Remaining maximum below floor");
                break;
            }
            events.push(self.build_location(volume, node, k, value));

            let grid = volume.grid();
            let lo = k.saturating_sub(half_window);
            let hi = k.saturating_add(half_window).saturating_add(1).min(n_samples);
            for other in 0..volume.node_count() {
                if grid.node_distance(node, other) <= self.exclusion_radius {
                    masked[other * n_samples + lo..other * n_samples + hi].fill(f64::NEG_INFINITY);
                }
            }
        }

        info!(
            run_id = %volume.run_id(),
            events = events.len(),
            "Events extracted"
        );
        events
    }

    fn build_location(&self, volume: &StackVolume, node: usize, k: usize, value: f64) -> Location {
        let grid = volume.grid();
        let mut position = grid.node_coordinates(node);
        let mut origin_time = volume.time_of(k);

        if self.refine {
            let idx = grid.node_indices(node);
            let counts = grid.counts();
            let spacing = grid.spacing();

            for axis in 0..3 {
                if idx[axis] == 0 || idx[axis] + 1 >= counts[axis] {
                    continue;
                }
                let mut before = idx;
                before[axis] -= 1;
                let mut after = idx;
                after[axis] += 1;
                let nb = grid.node_index(before[0], before[1], before[2]);
                let na = grid.node_index(after[0], after[1], after[2]);
                if !(volume.is_node_done(nb) && volume.is_node_done(na)) {
                    continue;
                }
                let offset = parabolic_offset(
                    volume.node_series(nb)[k],
                    value,
                    volume.node_series(na)[k],
                );
                position[axis] += offset * spacing[axis];
            }

            let row = volume.node_series(node);
            if k > 0 && k + 1 < row.len() {
                let offset = parabolic_offset(row[k - 1], value, row[k + 1]);
                origin_time = add_seconds(origin_time, offset * volume.delta());
            }
        }

        let confidence = self.confidence(volume, node, k, value);
        debug!(node, sample = k, value, ?confidence, "Stack maximum");

        Location {
            run_id: volume.run_id(),
            origin_time,
            x: position[0],
            y: position[1],
            z: position[2],
            node_index: node,
            stack_max: value,
            confidence,
            refined: self.refine,
            travel_times: None,
        }
    }

    fn confidence(&self, volume: &StackVolume, node: usize, k: usize, value: f64) -> Option<f64> {
        let half = (self.noise_exclusion_s / volume.delta() + 1e-9).floor() as usize;
        let mut noise: Vec<f64> = volume
            .node_series(node)
            .iter()
            .enumerate()
            .filter(|(i, _)| i.abs_diff(k) > half)
            .map(|(_, v)| v.abs())
            .collect();
        let floor = median(&mut noise)?;
        (floor > 0.0).then(|| value / floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SpatialGrid;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;
    use wloc_common::CombineRule;

    fn volume(grid: SpatialGrid, n_samples: usize, f: impl Fn(usize, usize) -> f64) -> StackVolume {
        let n_nodes = grid.node_count();
        let values = (0..n_nodes)
            .flat_map(|node| (0..n_samples).map(move |k| (node, k)))
            .map(|(node, k)| f(node, k))
            .collect();
        StackVolume {
            grid,
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            delta: 0.1,
            n_samples,
            values,
            coverage: None,
            node_done: vec![true; n_nodes],
            combine: CombineRule::Sum,
            run_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_parabolic_offset() {
        assert_eq!(parabolic_offset(1.0, 2.0, 1.0), 0.0);
        assert!((parabolic_offset(1.0, 2.0, 1.5) - 1.0 / 6.0).abs() < 1e-12);
        // Not a maximum
        assert_eq!(parabolic_offset(3.0, 2.0, 3.0), 0.0);
        assert_eq!(parabolic_offset(f64::NEG_INFINITY, 2.0, 1.0), 0.0);
    }

    #[test]
    fn test_extract_raw_maximum() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [5, 1, 1]).unwrap();
        let v = volume(grid, 50, |node, k| if node == 2 && k == 20 { 10.0 } else { 1.0 });
        let loc = LocationExtractor::new().extract(&v).unwrap();
        assert_eq!(loc.node_index, 2);
        assert_eq!(loc.position(), [2.0, 0.0, 0.0]);
        assert_eq!(loc.origin_time, v.time_of(20));
        assert_eq!(loc.stack_max, 10.0);
        assert_eq!(loc.confidence, Some(10.0));
        assert!(!loc.refined);
    }

    #[test]
    fn test_refinement_moves_towards_larger_neighbour() {
        let grid = SpatialGrid::new([0.0; 3], [2.0; 3], [5, 1, 1]).unwrap();
        // Spatial profile at k = 10: 0, 1, 2, 1.5, 0
        let profile = [0.0, 1.0, 2.0, 1.5, 0.0];
        let v = volume(grid, 21, |node, k| if k == 10 { profile[node] } else { 0.0 });
        let loc = LocationExtractor::new().with_refinement(true).extract(&v).unwrap();
        assert!(loc.refined);
        assert!((loc.x - (4.0 + 2.0 / 6.0)).abs() < 1e-12, "x = {}", loc.x);
        // Edge axes (y, z have one node) stay on the grid
        assert_eq!(loc.y, 0.0);
        assert_eq!(loc.z, 0.0);
    }

    #[test]
    fn test_flat_series_has_no_confidence() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [1, 1, 1]).unwrap();
        let v = volume(grid, 30, |_, k| if k == 15 { 3.0 } else { 0.0 });
        let loc = LocationExtractor::new().extract(&v).unwrap();
        assert_eq!(loc.confidence, None);
    }

    #[test]
    fn test_multi_event_masks_and_stops() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [20, 1, 1]).unwrap();
        let v = volume(grid, 100, |node, k| match (node, k) {
            (3, 20) => 9.0,
            (4, 21) => 8.5,
            (15, 70) => 6.0,
            (16, 80) => 0.5,
            _ => 0.1,
        });
        let extractor = LocationExtractor::new().with_multi_event(5, 1.0, 2.0, 0.5).unwrap();
        let events = extractor.extract_all(&v);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].node_index, 3);
        // (4, 21) is inside the first event's exclusion zone
        assert_eq!(events[1].node_index, 15);
        assert_eq!(events[1].origin_time, v.time_of(70));
    }

    #[test]
    fn test_multi_event_respects_count() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [20, 1, 1]).unwrap();
        let v = volume(grid, 100, |node, k| if k == node * 5 { 10.0 + node as f64 } else { 0.0 });
        let extractor = LocationExtractor::new().with_multi_event(3, 0.0, 0.0, 0.0).unwrap();
        let events = extractor.extract_all(&v);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.node_index).collect::<Vec<_>>(),
            vec![19, 18, 17]
        );
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(LocationExtractor::new().with_multi_event(0, 0.0, 1.0, 1.0).is_err());
        assert!(LocationExtractor::new().with_multi_event(1, 0.0, -1.0, 1.0).is_err());
        assert!(LocationExtractor::new().with_noise_exclusion(-0.1).is_err());
        assert!(LocationExtractor::new().with_noise_exclusion(f64::INFINITY).is_err());
        assert!(LocationExtractor::new().with_multi_event(3, 0.0, 100.0, f64::INFINITY).is_err());
        assert!(LocationExtractor::new().with_multi_event(3, 0.0, f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_exclusion_longer_than_volume_masks_everything() {
        let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [20, 1, 1]).unwrap();
        let v = volume(grid, 100, |node, k| if k == node * 5 { 10.0 + node as f64 } else { 0.0 });
        let extractor = LocationExtractor::new().with_multi_event(3, 0.0, 100.0, 1e30).unwrap();
        let events = extractor.extract_all(&v);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node_index, 19);
    }
}
