//! Elementary array transforms
//!
//! Smoothing, demeaning, tapering, positive derivative, envelope and STA/LTA.
//! All functions preserve sample count.

use rustfft::{num_complex::Complex64, FftPlanner};
use tracing::warn;

/// Width of the moving-average smoother (samples)
pub const SMOOTH_WINDOW: usize = 5;

/// Fraction of the segment covered by the cosine taper (both ends together)
pub const TAPER_FRACTION: f64 = 0.1;

/// Shortest segment the taper can be applied to; shorter ones become zeros
pub const TAPER_MIN_SUPPORT: usize = 10;

/// Centred moving average of width [`SMOOTH_WINDOW`]
///
/// Windows are truncated (and renormalised) at both ends, so the output has
/// the same length as the input.
pub fn smooth(x: &[f64]) -> Vec<f64> {
    let half = SMOOTH_WINDOW / 2;
    let n = x.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            x[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Subtract the mean
pub fn remove_mean(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    x.iter().map(|v| v - mean).collect()
}

/// Cosine taper weights for a segment of `n` samples
///
/// Returns None when `n` is below [`TAPER_MIN_SUPPORT`].
pub fn cosine_taper_weights(n: usize) -> Option<Vec<f64>> {
    if n < TAPER_MIN_SUPPORT {
        return None;
    }
    let ramp = ((n as f64 * TAPER_FRACTION / 2.0) + 0.5).floor() as usize;
    let mut weights = vec![1.0; n];
    for i in 0..ramp {
        let w = 0.5 * (1.0 - (std::f64::consts::PI * i as f64 / ramp as f64).cos());
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    Some(weights)
}

/// Apply a cosine taper to one segment
///
/// A segment shorter than the taper's minimum support is replaced by zeros.
pub fn taper(x: &[f64]) -> Vec<f64> {
    match cosine_taper_weights(x.len()) {
        Some(weights) => x.iter().zip(weights).map(|(v, w)| v * w).collect(),
        None => {
            if !x.is_empty() {
                warn!(samples = x.len(), "Segment too short for tapering, multiplying by 0");
            }
            vec![0.0; x.len()]
        }
    }
}

/// First time derivative with negative values clamped to zero
///
/// Central differences in the interior, one-sided differences at both ends.
/// Fewer than two samples (or an unusable `dt`) yield zeros of the same length.
pub fn positive_derivative(x: &[f64], dt: f64) -> Vec<f64> {
    let n = x.len();
    if n < 2 || !(dt.is_finite() && dt > 0.0) {
        if n > 0 {
            warn!(samples = n, dt, "Segment too short for derivative, returning zeros");
        }
        return vec![0.0; n];
    }

    let mut out = Vec::with_capacity(n);
    out.push((x[1] - x[0]) / dt);
    for i in 1..n - 1 {
        out.push((x[i + 1] - x[i - 1]) / (2.0 * dt));
    }
    out.push((x[n - 1] - x[n - 2]) / dt);

    // f64::max also maps NaN to 0
    out.into_iter().map(|v| v.max(0.0)).collect()
}

/// Envelope: magnitude of the analytic signal (FFT Hilbert transform)
pub fn envelope(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    forward.process(&mut spectrum);

    // Keep DC (and Nyquist for even n), double positive frequencies, drop negative ones
    let positive_end = (n + 1) / 2;
    for (k, c) in spectrum.iter_mut().enumerate() {
        let h = if k == 0 || (n % 2 == 0 && k == n / 2) {
            1.0
        } else if k < positive_end {
            2.0
        } else {
            0.0
        };
        *c *= h;
    }

    inverse.process(&mut spectrum);
    let scale = 1.0 / n as f64;
    spectrum.iter().map(|c| c.norm() * scale).collect()
}

/// Classic STA/LTA on signal energy
///
/// Both averages are trailing windows of `x²`. The first `lta_samples - 1`
/// outputs are zero (LTA not yet filled), as are outputs where the LTA vanishes.
/// Unusable window lengths or a signal shorter than the LTA window give zeros.
pub fn sta_lta(x: &[f64], sta_samples: usize, lta_samples: usize) -> Vec<f64> {
    let n = x.len();
    if sta_samples == 0 || lta_samples <= sta_samples || n < lta_samples {
        if n > 0 {
            warn!(
                samples = n,
                sta_samples, lta_samples, "Segment too short for STA/LTA, returning zeros"
            );
        }
        return vec![0.0; n];
    }

    let mut energy = Vec::with_capacity(n + 1);
    energy.push(0.0);
    let mut acc = 0.0;
    for v in x {
        acc += v * v;
        energy.push(acc);
    }

    (0..n)
        .map(|i| {
            if i + 1 < lta_samples {
                return 0.0;
            }
            let sta = (energy[i + 1] - energy[i + 1 - sta_samples]) / sta_samples as f64;
            let lta = (energy[i + 1] - energy[i + 1 - lta_samples]) / lta_samples as f64;
            if lta > f64::MIN_POSITIVE {
                sta / lta
            } else {
                0.0
            }
        })
        .collect()
}

/// Median of the values (reorders the slice); None when empty
///
/// NaNs sort last under `total_cmp`.
pub fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 1 {
        Some(upper)
    } else {
        let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((lower_max + upper) / 2.0)
    }
}
