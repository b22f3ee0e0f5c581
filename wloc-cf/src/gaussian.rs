//! Gaussian re-weighting
//!
//! Collapses each detected trigger into a single unit impulse at its maximum,
//! then spreads the impulses with a peak-normalised Gaussian kernel. The result
//! has one bump of height ~1 per merged trigger, regardless of how large or how
//! long the original excursion was.

use tracing::{debug, warn};

/// Triggers separated by fewer samples than this are merged
pub const MIN_TRIGGER_GAP: usize = 50;

/// Kernel half-width in standard deviations
pub const KERNEL_SIGMAS: f64 = 4.0;

/// Inclusive sample interval during which a trigger was on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub start: usize,
    pub end: usize,
}

/// Trigger intervals with independent on/off thresholds
///
/// A trigger turns on at the first sample above `on` and off at the first
/// following sample at or below `off`; the interval ends on the sample before.
/// A trigger still on at the end of the series closes on the last sample.
pub fn trigger_onset(x: &[f64], on: f64, off: f64) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    let mut current: Option<usize> = None;

    for (i, &v) in x.iter().enumerate() {
        match current {
            None if v > on => current = Some(i),
            Some(start) if v <= off => {
                triggers.push(Trigger { start, end: i - 1 });
                current = None;
                // Same sample may re-trigger when off > on
                if v > on {
                    current = Some(i);
                }
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        triggers.push(Trigger {
            start,
            end: x.len() - 1,
        });
    }
    triggers
}

/// Merge triggers whose gap (next start minus previous end) is below `min_gap`
pub fn merge_triggers(triggers: &[Trigger], min_gap: usize) -> Vec<Trigger> {
    let mut merged: Vec<Trigger> = Vec::with_capacity(triggers.len());
    for &t in triggers {
        match merged.last_mut() {
            Some(prev) if t.start.saturating_sub(prev.end) < min_gap => {
                prev.end = prev.end.max(t.end);
            }
            _ => merged.push(t),
        }
    }
    merged
}

/// Discretised Gaussian kernel, peak-normalised, support ±4σ
///
/// The kernel has odd length `2 * ceil(4σ / dt) + 1` and is centred on `mu`
/// (seconds). A non-positive `sigma` or `dt` gives the identity kernel `[1.0]`.
pub fn gaussian_kernel(dt: f64, mu: f64, sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0 && dt > 0.0) {
        return vec![1.0];
    }
    let half = (KERNEL_SIGMAS * sigma / dt - 1e-9).ceil().max(0.0) as i64;
    let raw: Vec<f64> = (-half..=half)
        .map(|k| {
            let t = k as f64 * dt - mu;
            (-t * t / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let peak = raw.iter().copied().fold(0.0, f64::max);
    if peak > 0.0 {
        raw.into_iter().map(|v| v / peak).collect()
    } else {
        // mu far outside the support
        vec![1.0]
    }
}

/// Convolution truncated to the length of `x` ("same" mode, kernel centred)
///
/// Zero samples of `x` are skipped, so a sparse impulse train costs one kernel
/// pass per impulse.
pub fn convolve_same(x: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut out = vec![0.0; n];
    if kernel.is_empty() {
        return out;
    }
    let half = (kernel.len() - 1) / 2;

    for (k, &v) in x.iter().enumerate() {
        if v == 0.0 {
            continue;
        }
        for (j, &g) in kernel.iter().enumerate() {
            let Some(idx) = (k + j).checked_sub(half) else {
                continue;
            };
            if idx >= n {
                break;
            }
            out[idx] += v * g;
        }
    }
    out
}

/// Replace triggers above `threshold` by Gaussian bumps of unit height
///
/// An empty input is logged and yields an empty output. A signal that never
/// crosses the threshold yields all zeros.
pub fn gaussian_reweight(x: &[f64], dt: f64, threshold: f64, mu: f64, sigma: f64) -> Vec<f64> {
    if x.is_empty() {
        warn!("Gaussian re-weighting of an empty signal, returning empty output");
        return Vec::new();
    }

    let triggers = merge_triggers(&trigger_onset(x, threshold, threshold), MIN_TRIGGER_GAP);

    let mut impulses = vec![0.0; x.len()];
    for t in &triggers {
        // First maximum within the interval
        let (peak, _) = x[t.start..=t.end].iter().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) },
        );
        impulses[t.start + peak] = 1.0;
    }
    debug!(
        triggers = triggers.len(),
        threshold, sigma, "Gaussian re-weighting"
    );

    convolve_same(&impulses, &gaussian_kernel(dt, mu, sigma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_onset_intervals() {
        let x = [0.0, 2.0, 3.0, 0.5, 0.0, 4.0, 4.0];
        let t = trigger_onset(&x, 1.0, 1.0);
        assert_eq!(
            t,
            vec![Trigger { start: 1, end: 2 }, Trigger { start: 5, end: 6 }]
        );
    }

    #[test]
    fn test_trigger_onset_hysteresis() {
        let x = [0.0, 2.0, 0.8, 2.0, 0.2, 0.0];
        // Off threshold below the dip at 0.8 keeps the trigger on
        let t = trigger_onset(&x, 1.0, 0.5);
        assert_eq!(t, vec![Trigger { start: 1, end: 3 }]);
    }

    #[test]
    fn test_merge_triggers_by_gap() {
        let t = [
            Trigger { start: 10, end: 20 },
            Trigger { start: 60, end: 65 },
            Trigger { start: 200, end: 210 },
        ];
        let merged = merge_triggers(&t, MIN_TRIGGER_GAP);
        assert_eq!(
            merged,
            vec![Trigger { start: 10, end: 65 }, Trigger { start: 200, end: 210 }]
        );
        // Gap of exactly 50 stays separate
        let t = [Trigger { start: 0, end: 10 }, Trigger { start: 60, end: 61 }];
        assert_eq!(merge_triggers(&t, MIN_TRIGGER_GAP).len(), 2);
    }

    #[test]
    fn test_kernel_shape() {
        let k = gaussian_kernel(0.01, 0.0, 0.1);
        assert_eq!(k.len(), 81);
        assert_eq!(k[40], 1.0);
        assert!((k[30] - (-0.5f64).exp()).abs() < 1e-12);
        assert!((k[0] - k[80]).abs() < 1e-15);
        assert_eq!(gaussian_kernel(0.01, 0.0, 0.0), vec![1.0]);
    }

    #[test]
    fn test_convolve_same_centres_kernel() {
        let mut x = vec![0.0; 9];
        x[4] = 2.0;
        let y = convolve_same(&x, &[0.5, 1.0, 0.25]);
        assert_eq!(y, vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.5, 0.0, 0.0, 0.0]);

        // Truncated at the edges
        let y = convolve_same(&[1.0, 0.0, 0.0], &[0.5, 1.0, 0.25]);
        assert_eq!(y, vec![1.0, 0.25, 0.0]);
    }

    #[test]
    fn test_reweight_sum_proportional_to_trigger_count() {
        let dt = 0.01;
        let sigma = 0.05;
        let kernel_sum: f64 = gaussian_kernel(dt, 0.0, sigma).iter().sum();

        let mut x = vec![0.0; 1000];
        // Two bursts close together (merge) and one far away
        for i in 200..210 {
            x[i] = 5.0 + (i - 200) as f64;
        }
        for i in 230..235 {
            x[i] = 3.0;
        }
        for i in 700..720 {
            x[i] = 8.0;
        }

        let y = gaussian_reweight(&x, dt, 1.0, 0.0, sigma);
        assert_eq!(y.len(), x.len());
        let total: f64 = y.iter().sum();
        assert!(
            (total - 2.0 * kernel_sum).abs() < 1e-9,
            "total {} kernel sum {}",
            total,
            kernel_sum
        );
        // Peak of the first burst is its last sample, the second burst's is its first
        assert!((y[209] - 1.0).abs() < 1e-12);
        assert!((y[700] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reweight_without_triggers_is_zero() {
        let y = gaussian_reweight(&[0.1; 100], 0.01, 1.0, 0.0, 0.1);
        assert_eq!(y, vec![0.0; 100]);
    }

    #[test]
    fn test_reweight_empty_signal() {
        assert!(gaussian_reweight(&[], 0.01, 1.0, 0.0, 0.1).is_empty());
    }
}
