//! Statistics reducer benchmarks
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pqbench::campaign::SampleSet;
use pqbench::driver::{HandshakeTrial, TrialOutcome};
use pqbench::stats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Build a closed sample set with right-skewed synthetic latencies.
fn synthetic_set(id: &str, group: &str, n: usize, base_ms: f64, seed: u64) -> SampleSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = SampleSet::new(id, group);
    for _ in 0..n {
        // Lognormal-ish skew out of two uniforms, cheap and deterministic.
        let jitter: f64 = rng.gen_range(0.0..1.0);
        let tail: f64 = rng.gen_range(0.0..1.0);
        let ms = base_ms + jitter * 5.0 + if tail > 0.95 { tail * 40.0 } else { 0.0 };
        set.push(HandshakeTrial {
            configuration_id: id.to_string(),
            group_name: group.to_string(),
            start_timestamp: Utc::now(),
            elapsed: Duration::from_secs_f64(ms / 1000.0),
            outcome: TrialOutcome::Success,
        })
        .unwrap();
    }
    set.mark_complete();
    set
}

fn bench_summarize(c: &mut Criterion) {
    let mut group = c.benchmark_group("summarize");
    for &n in &[100usize, 1_000, 10_000] {
        let set = synthetic_set("classic", "X25519", n, 70.0, 7);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("n{}", n), |b| {
            b.iter(|| black_box(stats::summarize(&set).unwrap()))
        });
    }
    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("mann_whitney");
    for &n in &[100usize, 1_000] {
        let baseline = synthetic_set("classic", "X25519", n, 70.0, 11);
        let candidate = synthetic_set("hybrid", "X25519MLKEM768", n, 72.0, 13);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("n{}", n), |b| {
            b.iter(|| black_box(stats::compare(&baseline, &candidate, 0.05).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_summarize, bench_compare);
criterion_main!(benches);
