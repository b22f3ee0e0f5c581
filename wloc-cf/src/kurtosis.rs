//! Kurtosis characteristic functions
//!
//! Two estimators of excess kurtosis (fourth standardised moment minus 3):
//!
//! - **Sliding window**: exact population kurtosis over the trailing window of
//!   `w` samples. Output sample `i` covers input samples `i..i + w`, so it is
//!   aligned with input sample `i + w - 1` and the output is `w - 1` samples
//!   shorter than the input. The result is smoothed.
//! - **Recursive**: exponentially weighted running mean, variance and excess
//!   fourth-moment accumulators with a single decay constant
//!   `C = 1 - dt / window`. One pass, O(1) state, same length as the input.
//!
//! A window (or running state) with zero variance contributes 0, so constant
//! input yields 0 everywhere.

use crate::filters::smooth;
use tracing::warn;

/// Variance at or below this fraction of mean² is treated as zero
const VARIANCE_REL_FLOOR: f64 = 1e-12;

fn variance_is_degenerate(variance: f64, mean: f64) -> bool {
    variance <= f64::MIN_POSITIVE || variance <= VARIANCE_REL_FLOOR * mean * mean
}

/// Output length of the sliding kurtosis for `n` input samples
///
/// `n - w + 1`, never below 1 for non-empty input.
pub fn sliding_output_len(n: usize, window: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n + 1).saturating_sub(window.max(1)).max(1)
    }
}

/// Window length in samples for a window given in seconds (truncating)
pub fn window_samples(window_s: f64, dt: f64) -> usize {
    if dt > 0.0 && window_s > 0.0 {
        // Nudge so 3.0 / 0.01 does not truncate to 299
        (window_s / dt + 1e-9) as usize
    } else {
        0
    }
}

/// Decay constant of the recursive estimator, clamped to `[0, 1)`
pub fn recursive_constant(dt: f64, window_s: f64) -> f64 {
    if !(window_s > 0.0) {
        return 0.0;
    }
    (1.0 - dt / window_s).clamp(0.0, 1.0 - f64::EPSILON)
}

/// Population excess kurtosis of one window
fn window_kurtosis(window: &[f64]) -> f64 {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let (m2, m4) = window.iter().fold((0.0, 0.0), |(m2, m4), &v| {
        let d2 = (v - mean) * (v - mean);
        (m2 + d2, m4 + d2 * d2)
    });
    let (m2, m4) = (m2 / n, m4 / n);
    if variance_is_degenerate(m2, mean) {
        0.0
    } else {
        m4 / (m2 * m2) - 3.0
    }
}

/// Sliding-window kurtosis without smoothing
///
/// Degenerate input (`window < 2` or `len(x) <= 3 * window`) returns zeros of the
/// normal output length.
pub fn sliding_kurtosis_raw(x: &[f64], window: usize) -> Vec<f64> {
    let n_out = sliding_output_len(x.len(), window);
    if window < 2 || x.len() <= 3 * window {
        if !x.is_empty() {
            warn!(
                samples = x.len(),
                window, "Segment too short for sliding kurtosis, returning zeros"
            );
        }
        return vec![0.0; n_out];
    }
    x.windows(window).map(window_kurtosis).collect()
}

/// Sliding-window kurtosis, smoothed with the fixed moving-average filter
pub fn sliding_kurtosis(x: &[f64], window: usize) -> Vec<f64> {
    smooth(&sliding_kurtosis_raw(x, window))
}

/// Recursive (exponentially weighted) kurtosis
///
/// For each sample `x_i`, with `a = 1 - C`:
///
/// ```text
/// mean_i = C * mean_{i-1} + a * x_i
/// var_i  = C * var_{i-1}  + a * (x_i - mean_i)²
/// kurt_i = C * kurt_{i-1} + a * ((x_i - mean_i)⁴ / var_i² - 3)
/// ```
///
/// The mean starts at `x_0`, the other accumulators at 0. A sample whose running
/// variance is zero adds 0 to the kurtosis accumulator instead of the ratio.
pub fn recursive_kurtosis(x: &[f64], decay: f64) -> Vec<f64> {
    let Some(&first) = x.first() else {
        return Vec::new();
    };
    let a = 1.0 - decay;
    let mut mean = first;
    let mut var = 0.0;
    let mut kurt = 0.0;

    x.iter()
        .map(|&v| {
            mean = decay * mean + a * v;
            let d2 = (v - mean) * (v - mean);
            var = decay * var + a * d2;
            let excess = if variance_is_degenerate(var, mean) {
                0.0
            } else {
                d2 * d2 / (var * var) - 3.0
            };
            kurt = decay * kurt + a * excess;
            kurt
        })
        .collect()
}
