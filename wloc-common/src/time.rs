//! Epoch-time helpers for sample alignment
//!
//! Station start times and output windows are absolute UTC instants; alignment
//! arithmetic is done in f64 seconds relative to a reference instant.

use chrono::{DateTime, Duration, Utc};

/// Seconds from `reference` to `t` (negative when `t` is earlier)
pub fn seconds_between(reference: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    let delta = t - reference;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 * 1e-9,
        // Beyond ~292 years nanoseconds overflow; microseconds are plenty there
        None => delta.num_microseconds().unwrap_or(i64::MAX) as f64 * 1e-6,
    }
}

/// `t` shifted by a (possibly negative, fractional) number of seconds
///
/// Rounded to the nearest nanosecond.
pub fn add_seconds(t: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    t + Duration::nanoseconds((seconds * 1e9).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 10, 14, 0, 15, 0).unwrap()
    }

    #[test]
    fn test_seconds_between_sign() {
        let later = add_seconds(t0(), 2.5);
        assert!((seconds_between(t0(), later) - 2.5).abs() < 1e-9);
        assert!((seconds_between(later, t0()) + 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_add_seconds_sub_millisecond() {
        let t = add_seconds(t0(), 0.0125);
        assert_eq!((t - t0()).num_microseconds(), Some(12_500));
    }

    #[test]
    fn test_add_negative_seconds() {
        let t = add_seconds(t0(), -0.15);
        assert!((seconds_between(t0(), t) + 0.15).abs() < 1e-9);
    }
}
