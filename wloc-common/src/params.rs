//! Parameter enums shared across WLOC crates
//!
//! These are plain configuration values: the characteristic-function crate and the
//! migration crate interpret them, the config layer only parses them.

use serde::{Deserialize, Serialize};

/// Characteristic function applied to raw waveforms before migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CfKind {
    /// No transform, migrate the samples as given
    None,
    /// Sliding- or recursive-window kurtosis (see `recursive` flag)
    Kurtosis,
    /// Hilbert envelope
    Envelope,
    /// Classic STA/LTA ratio
    StaLta,
}

impl Default for CfKind {
    fn default() -> Self {
        CfKind::Kurtosis
    }
}

/// How aligned station contributions are combined at one grid node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineRule {
    /// Sample-by-sample sum over stations
    Sum,
    /// Sum divided by a station count (see [`MeanNormalization`])
    Mean,
    /// Sample-by-sample maximum over stations
    Max,
}

impl CombineRule {
    /// Canonical config-file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            CombineRule::Sum => "sum",
            CombineRule::Mean => "mean",
            CombineRule::Max => "max",
        }
    }
}

impl Default for CombineRule {
    fn default() -> Self {
        CombineRule::Sum
    }
}

impl std::fmt::Display for CombineRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Divisor used by [`CombineRule::Mean`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanNormalization {
    /// Divide by the number of stations that have a travel time at the node
    StationsQueried,
    /// Divide each sample by the number of stations whose data cover it
    CoveringStations,
}

impl Default for MeanNormalization {
    fn default() -> Self {
        MeanNormalization::StationsQueried
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_rule_display_matches_config_spelling() {
        for rule in [CombineRule::Sum, CombineRule::Mean, CombineRule::Max] {
            let parsed: CombineRule = serde_json::from_str(&format!("\"{}\"", rule)).unwrap();
            assert_eq!(parsed, rule);
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CfKind::default(), CfKind::Kurtosis);
        assert_eq!(CombineRule::default(), CombineRule::Sum);
        assert_eq!(MeanNormalization::default(), MeanNormalization::StationsQueried);
    }

    #[test]
    fn test_serde_spelling() {
        let json = serde_json::to_string(&MeanNormalization::CoveringStations).unwrap();
        assert_eq!(json, "\"covering_stations\"");
        let rule: CombineRule = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(rule, CombineRule::Max);
    }
}
