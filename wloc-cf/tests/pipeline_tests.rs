//! Integration tests for configuration-driven characteristic functions

use chrono::{TimeZone, Utc};
use wloc_cf::{CfPipeline, CharacteristicFunction, ProcessingTag, WaveformSample};
use wloc_common::WlocConfig;

fn burst(n: usize, onset: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let background = 0.05 * ((i as f64) * 1.7).sin();
            if i >= onset {
                let u = (i - onset) as f64 * 0.01;
                background + 4.0 * (-u / 0.2).exp() * (2.0 * std::f64::consts::PI * 6.0 * u).cos()
            } else {
                background
            }
        })
        .collect()
}

#[test]
fn test_every_kind_keeps_time_axis_consistent() {
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let raw = WaveformSample::new(burst(800, 500), 0.01, start).unwrap();

    for kind in ["none", "kurtosis", "envelope", "sta_lta"] {
        let config = WlocConfig::from_toml_str(&format!(
            "[characteristic]\nkind = \"{}\"\nwindow_s = 0.5\nsta_s = 0.1\nlta_s = 1.0\n",
            kind
        ))
        .unwrap();
        let pipeline = CfPipeline::from_config(&config.characteristic).unwrap();
        let cf = pipeline.process(&raw);

        // The last sample always keeps its absolute time
        assert_eq!(cf.end_time(), raw.end_time(), "kind {}", kind);
        assert_eq!(cf.delta(), raw.delta());
        assert!(cf.samples().iter().all(|&v| v >= 0.0), "kind {}", kind);
    }
}

#[test]
fn test_recursive_and_sliding_peak_near_onset() {
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let raw = WaveformSample::new(burst(800, 500), 0.01, start).unwrap();
    let onset = raw.time_of(500);

    for recursive in [false, true] {
        let config = WlocConfig::from_toml_str(&format!(
            "[characteristic]\nkind = \"kurtosis\"\nwindow_s = 0.5\nrecursive = {}\n",
            recursive
        ))
        .unwrap();
        let pipeline = CfPipeline::from_config(&config.characteristic).unwrap();
        let cf = pipeline.process(&raw);
        assert_eq!(cf.tag(), ProcessingTag::Kurtosis);

        let (peak, _) = cf
            .samples()
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
        let lag = (cf.time_of(peak) - onset).num_milliseconds();
        assert!((-50..=100).contains(&lag), "recursive={} lag {} ms", recursive, lag);
    }
}

#[test]
fn test_waveform_json_feeds_pipeline() {
    let json = r#"{
        "samples": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        "delta": 0.05,
        "start_time": "2021-06-01T00:00:00Z"
    }"#;
    let w: WaveformSample = serde_json::from_str(json).unwrap();
    assert_eq!(w.tag(), ProcessingTag::None);

    let out = CfPipeline::new(CharacteristicFunction::Envelope).process(&w);
    assert_eq!(out.len(), 20);
    assert_eq!(out.tag(), ProcessingTag::Envelope);
    assert!((out.samples()[10] - 3.0).abs() < 1e-9);

    let bad = r#"{"samples": [1.0], "delta": 0.0, "start_time": "2021-06-01T00:00:00Z"}"#;
    assert!(serde_json::from_str::<WaveformSample>(bad).is_err());
}
