//! Benchmarks for the fitness path that runs once per particle per generation.
//!
//! Run with: cargo bench --bench alignment

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use swarm_calib_core::prelude::*;

/// One observation per minute from 06:00, simulated output every 30 s.
fn fixtures(minutes: u32) -> (ObservedSeries, OracleSeries) {
    let observed = (0..minutes)
        .map(|m| {
            let at = ClockTime::from_hms(6 + m / 60, m % 60, 0);
            (at, 80.0 + (m % 7) as f64)
        })
        .collect();
    let oracle = (0..minutes * 2 + 1)
        .map(|i| (i as f64 * 30.0, 78.0 + (i % 5) as f64))
        .collect();
    (observed, oracle)
}

fn observed_text(minutes: u32) -> String {
    (0..minutes)
        .map(|m| format!("1/15/2024 {:02}:{:02} 65.0 3 1\n", 6 + m / 60, m % 60))
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    let start = ClockTime::from_hms(6, 0, 0);

    for minutes in [60u32, 240, 1440] {
        let (observed, oracle) = fixtures(minutes);
        group.throughput(Throughput::Elements(minutes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(minutes), &minutes, |b, _| {
            b.iter(|| black_box(score(&observed, &oracle, start)));
        });
    }

    group.finish();
}

fn bench_parse_observed(c: &mut Criterion) {
    let raw = observed_text(1440);
    c.bench_function("parse_observed_day", |b| {
        b.iter(|| black_box(parse_observed(black_box(&raw), DataTransform::default())));
    });
}

fn bench_generation_update(c: &mut Criterion) {
    let space = ParameterSpace::new(&idm_mobil_parameters(), DEFAULT_VMAX_FACTOR).unwrap();
    let config = ParticleSwarmConfig::default();
    let mut rng = StdRng::seed_from_u64(17);
    let mut particles: Vec<Particle> = (0..50)
        .map(|_| Particle::initialize(&space, InitMode::Random, &mut rng))
        .collect();
    let global_best = space.defaults();

    c.bench_function("move_50_particles", |b| {
        b.iter(|| {
            for p in particles.iter_mut() {
                p.update(&global_best, &space, &config, &mut rng);
            }
        });
    });
}

criterion_group!(benches, bench_score, bench_parse_observed, bench_generation_update);
criterion_main!(benches);
