//! Migration Node-Loop Benchmark
//!
//! Measures stacking throughput (node-samples per second) for the dominant
//! O(nodes x stations x samples) loop, with and without a travel-time cache.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wloc_cf::WaveformSample;
use wloc_mig::{HomogeneousOracle, MigrationEngine, SpatialGrid, StationSeries};

const DT: f64 = 0.01;

fn setup(n_stations: usize) -> (SpatialGrid, HomogeneousOracle, Vec<StationSeries>) {
    let grid = SpatialGrid::new([0.0; 3], [1.0; 3], [20, 20, 10]).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let mut oracle = HomogeneousOracle::new(5.0).unwrap();
    let mut stations = Vec::with_capacity(n_stations);
    for i in 0..n_stations {
        let id = format!("S{:02}", i);
        oracle = oracle.with_station(id.clone(), [rng.gen_range(0.0..19.0), rng.gen_range(0.0..19.0), 0.0]);
        let samples: Vec<f64> = (0..3000).map(|_| rng.gen::<f64>()).collect();
        stations.push(StationSeries::new(id, WaveformSample::new(samples, DT, start).unwrap()));
    }
    (grid, oracle, stations)
}

fn bench_migrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("migrate");
    group.sample_size(10);

    for n_stations in [4usize, 16] {
        let (grid, oracle, stations) = setup(n_stations);
        let start = stations[0].cf().start_time() + Duration::seconds(2);
        let end = start + Duration::seconds(10);
        let node_samples = (grid.node_count() * 1000) as u64;
        group.throughput(Throughput::Elements(node_samples));

        let engine = MigrationEngine::new();
        group.bench_with_input(BenchmarkId::new("oracle", n_stations), &stations, |b, stations| {
            b.iter(|| black_box(engine.migrate(stations, &grid, &oracle, start, end).unwrap()));
        });

        let cached: Vec<StationSeries> = stations
            .iter()
            .cloned()
            .map(|s| s.with_travel_time_cache(&grid, &oracle))
            .collect();
        group.bench_with_input(BenchmarkId::new("cached", n_stations), &cached, |b, stations| {
            b.iter(|| black_box(engine.migrate(stations, &grid, &oracle, start, end).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_migrate);
criterion_main!(benches);
