use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use trustdrift::{BehavioralSignals, FrameworkConfig, SubjectRegistry, TrustDriftFramework};

fn make_inputs(n: usize) -> Vec<(f64, f64, BehavioralSignals)> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            let r: f64 = rng.gen_range(0.4..0.95);
            let t: f64 = (r + rng.gen_range(-0.3..0.3)).clamp(0.0, 1.0);
            let signals = BehavioralSignals::new()
                .with("dwell_time", rng.gen_range(5.0..90.0))
                .with("reliance_ratio", rng.gen_range(0.0..1.0))
                .with("query_complexity", rng.gen_range(0.0..1.0))
                .with("interaction_frequency", rng.gen_range(0.0..15.0))
                .with("override_rate", rng.gen_range(0.0..0.6));
            (t, r, signals)
        })
        .collect()
}

fn bench_update(c: &mut Criterion) {
    let inputs = make_inputs(1024);

    let mut group = c.benchmark_group("update_cycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("every_interaction_forecast", |b| {
        b.iter_custom(|iters| {
            // Fresh framework per sample so posterior state does not leak between samples.
            let cfg = FrameworkConfig {
                forecast_interval: 1,
                ..FrameworkConfig::default()
            };
            let mut fw = TrustDriftFramework::new(cfg).unwrap();
            let start = Instant::now();
            for i in 0..iters {
                let (t, r, s) = &inputs[i as usize % inputs.len()];
                black_box(fw.update(*t, *r, Some(s), None));
            }
            start.elapsed()
        });
    });

    group.bench_function("default_config", |b| {
        let mut fw = TrustDriftFramework::with_defaults();
        let mut i = 0usize;
        b.iter(|| {
            let (t, r, s) = &inputs[i % inputs.len()];
            i += 1;
            black_box(fw.update(*t, *r, Some(s), None))
        });
    });

    group.bench_function("registry_64_subjects", |b| {
        let registry = SubjectRegistry::with_defaults();
        let subjects: Vec<String> = (0..64).map(|i| format!("subject-{i}")).collect();
        let mut i = 0usize;
        b.iter(|| {
            let (t, r, s) = &inputs[i % inputs.len()];
            let subject = &subjects[i % subjects.len()];
            i += 1;
            black_box(registry.update(subject, *t, *r, Some(s), None).unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_update);
criterion_main!(benches);
