//! Waveform value type
//!
//! A `WaveformSample` is an immutable, gapless segment: samples, a constant sample
//! interval, an absolute start time and a processing tag. Transforms return a new
//! value rather than mutating history; callers decide whether to keep the old one.

use crate::error::{CfError, Result};
use crate::filters::median;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wloc_common::time::{add_seconds, seconds_between};

/// Which processing stage produced the samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTag {
    /// Raw (or only filtered / tapered) data
    #[default]
    None,
    Envelope,
    StaLta,
    Kurtosis,
    Gaussian,
}

impl ProcessingTag {
    /// Human-readable label (used as plot axis label by downstream tools)
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingTag::None => "Raw data",
            ProcessingTag::Envelope => "Envelope",
            ProcessingTag::StaLta => "STA/LTA",
            ProcessingTag::Kurtosis => "Kurtosis",
            ProcessingTag::Gaussian => "Gaussian",
        }
    }
}

/// A time series with constant sample interval
///
/// Invariants: `delta > 0` and finite, at least one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WaveformRecord")]
pub struct WaveformSample {
    samples: Vec<f64>,
    delta: f64,
    start_time: DateTime<Utc>,
    tag: ProcessingTag,
}

/// Unvalidated wire form of [`WaveformSample`]
#[derive(Debug, Clone, Deserialize)]
pub struct WaveformRecord {
    pub samples: Vec<f64>,
    pub delta: f64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub tag: ProcessingTag,
}

impl TryFrom<WaveformRecord> for WaveformSample {
    type Error = CfError;

    fn try_from(record: WaveformRecord) -> Result<Self> {
        Ok(Self::new(record.samples, record.delta, record.start_time)?.with_tag(record.tag))
    }
}

impl WaveformSample {
    /// Create a raw waveform
    ///
    /// # Errors
    /// `InvalidSampleInterval` if `delta` is not a positive finite number,
    /// `EmptySeries` if there are no samples.
    pub fn new(samples: Vec<f64>, delta: f64, start_time: DateTime<Utc>) -> Result<Self> {
        if !(delta.is_finite() && delta > 0.0) {
            return Err(CfError::InvalidSampleInterval(delta));
        }
        if samples.is_empty() {
            return Err(CfError::EmptySeries);
        }
        Ok(Self {
            samples,
            delta,
            start_time,
            tag: ProcessingTag::None,
        })
    }

    /// Same samples, different tag
    pub fn with_tag(mut self, tag: ProcessingTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    /// Sample interval (seconds)
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn tag(&self) -> ProcessingTag {
        self.tag
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed value; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Absolute time of sample `i`
    pub fn time_of(&self, i: usize) -> DateTime<Utc> {
        add_seconds(self.start_time, i as f64 * self.delta)
    }

    /// Absolute time of the last sample
    pub fn end_time(&self) -> DateTime<Utc> {
        self.time_of(self.samples.len() - 1)
    }

    /// Sample index nearest to `t` (may be negative or past the end)
    pub fn index_at(&self, t: DateTime<Utc>) -> i64 {
        (seconds_between(self.start_time, t) / self.delta).round() as i64
    }

    /// Replace the samples with a transform output
    ///
    /// `dropped_leading` is the number of input samples the transform consumed
    /// before its first output sample; the start time moves forward by that many
    /// sample intervals so that output sample `i` keeps its absolute time.
    /// An empty output keeps the previous samples (transforms never produce one
    /// from a non-empty input).
    pub fn replaced(&self, samples: Vec<f64>, dropped_leading: usize, tag: ProcessingTag) -> Self {
        if samples.is_empty() {
            return self.clone().with_tag(tag);
        }
        Self {
            samples,
            delta: self.delta,
            start_time: self.time_of(dropped_leading),
            tag,
        }
    }

    /// Apply a length-preserving array transform
    pub fn map(&self, tag: ProcessingTag, f: impl FnOnce(&[f64]) -> Vec<f64>) -> Self {
        self.replaced(f(&self.samples), 0, tag)
    }

    /// Samples whose times fall within `[start, end]`, or None if there are none
    pub fn slice(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let first = (seconds_between(self.start_time, start) / self.delta - 1e-9).ceil();
        let last = (seconds_between(self.start_time, end) / self.delta + 1e-9).floor();
        let first = first.max(0.0) as i64;
        let last = last.min(self.samples.len() as f64 - 1.0) as i64;
        if last < first {
            return None;
        }
        let (first, last) = (first as usize, last as usize);
        Some(self.replaced(self.samples[first..=last].to_vec(), first, self.tag))
    }

    /// Extend with `pad_value` so the series covers `[start, end]`
    ///
    /// Padding stays on this series' sample grid; existing samples are never
    /// trimmed. Sides already covered are left untouched.
    pub fn pad_to_window(&self, start: DateTime<Utc>, end: DateTime<Utc>, pad_value: f64) -> Self {
        let before = (seconds_between(start, self.start_time) / self.delta).round().max(0.0) as usize;
        let after = (seconds_between(self.end_time(), end) / self.delta).round().max(0.0) as usize;
        if before == 0 && after == 0 {
            return self.clone();
        }

        let mut samples = Vec::with_capacity(before + self.samples.len() + after);
        samples.resize(before, pad_value);
        samples.extend_from_slice(&self.samples);
        samples.resize(samples.len() + after, pad_value);

        Self {
            samples,
            delta: self.delta,
            start_time: add_seconds(self.start_time, -(before as f64) * self.delta),
            tag: self.tag,
        }
    }

    /// Signal-to-noise ratio around an origin time
    ///
    /// Signal is max |x| within `[left, right]`, noise is median |x| within
    /// `[left, o_time]`. Returns 0 when the noise is zero or either window is empty.
    pub fn snr(&self, o_time: DateTime<Utc>, left: DateTime<Utc>, right: DateTime<Utc>) -> f64 {
        let signal = match self.slice(left, right) {
            Some(s) => s.samples.iter().fold(0.0_f64, |m, v| m.max(v.abs())),
            None => return 0.0,
        };
        let noise = match self.slice(left, o_time) {
            Some(s) => {
                let mut abs: Vec<f64> = s.samples.iter().map(|v| v.abs()).collect();
                median(&mut abs).unwrap_or(0.0)
            }
            None => return 0.0,
        };
        if noise == 0.0 {
            0.0
        } else {
            signal / noise
        }
    }

    /// (maximum, sum) of the samples
    pub fn signature(&self) -> (f64, f64) {
        let maximum = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum = self.samples.iter().sum();
        (maximum, sum)
    }
}
