//! Seeded randomized checks of invariants that must hold for any input stream.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use trustdrift::{
    BehavioralSignals, DriftDetector, ForecastResult, FrameworkConfig, InterventionGate,
    KalmanEstimator, LatentConfig, LatentInference, MultiStepForecaster, TrustDriftFramework,
};

const SEEDS: [u64; 4] = [1, 7, 42, 1234];

fn hostile_value(rng: &mut ChaCha8Rng) -> f64 {
    match rng.gen_range(0..6) {
        0 => f64::NAN,
        1 => f64::INFINITY,
        2 => f64::NEG_INFINITY,
        3 => rng.gen_range(-1e6..1e6),
        _ => rng.gen_range(-0.5..1.5),
    }
}

fn random_signals(rng: &mut ChaCha8Rng) -> BehavioralSignals {
    let names = [
        "dwell_time",
        "reliance_ratio",
        "query_complexity",
        "interaction_frequency",
        "override_rate",
        "unknown_signal",
    ];
    let mut s = BehavioralSignals::new();
    for name in names {
        if rng.gen_bool(0.7) {
            s.insert(name, hostile_value(rng));
        }
    }
    s
}

#[test]
fn delta_is_bounded_for_any_input() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut fw = TrustDriftFramework::with_defaults();
        for _ in 0..200 {
            let t = hostile_value(&mut rng);
            let r = hostile_value(&mut rng);
            let snap = fw.update(t, r, None, None);
            let d = snap.state.delta_trust;
            assert!((0.0..=1.0).contains(&d), "delta {d} for ({t}, {r})");
            assert!((0.0..=1.0).contains(&snap.state.user_trust));
            assert!((0.0..=1.0).contains(&snap.state.actual_reliability));
        }
    }
}

#[test]
fn covariance_stays_symmetric_psd() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut est = KalmanEstimator::new(1.0, 0.05, 0.10);
        for i in 0..500 {
            est.predict(rng.gen_range(-1.0..1.0));
            let t: f64 = rng.gen_range(0.0..1.0);
            let r: f64 = rng.gen_range(0.0..1.0);
            est.update([t, r, (t - r).abs()]);
            if i % 97 == 0 {
                est.inflate_covariance(2.0);
            }

            let p = est.belief().covariance;
            assert!((p - p.transpose()).abs().max() < 1e-12, "asymmetric at step {i}");
            let eig = p.symmetric_eigen();
            assert!(
                eig.eigenvalues.iter().all(|v| *v >= -1e-12),
                "not PSD at step {i}: {:?}",
                eig.eigenvalues
            );
            assert!(est.belief().mean.iter().all(|v| v.is_finite()));
        }
    }
}

#[test]
fn latent_outputs_stay_in_bounds() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut li = LatentInference::new(LatentConfig::default(), 0.15);
        for _ in 0..300 {
            let signals = random_signals(&mut rng);
            let latent = li.infer(&signals);
            for v in [latent.task_complexity, latent.cognitive_load, latent.user_expertise] {
                assert!((0.0..=1.0).contains(&v), "{latent:?}");
            }
            assert!(latent.context_shift == 0.0 || latent.context_shift == 1.0);

            li.update_posterior(&latent, rng.gen_range(0.0..1.0));
            let (mean, std) = li.get_predictive_distribution(&latent);
            assert!((0.0..=1.0).contains(&mean));
            assert!(std.is_finite() && std > 0.0);
            assert!((0.0..=1.0).contains(&li.context_probability()));
        }
        let empty = li.infer(&BehavioralSignals::new());
        assert!((0.0..=1.0).contains(&empty.cognitive_load));
    }
}

#[test]
fn cusum_never_decreases_below_baseline() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut d = DriftDetector::new(0.8, 0.1, 0.5, 5.0);
        let ceiling = 0.8 - d.epsilon();
        let mut previous = 0.0;
        for _ in 0..100 {
            let s = d.update(rng.gen_range(0.0..ceiling)).statistic;
            assert!(s >= previous, "{s} < {previous}");
            previous = s;
        }
        assert!(d.statistic() > d.threshold());
        d.reset();
        assert_eq!(d.statistic(), 0.0);
    }
}

#[test]
fn gate_respects_cooldown_for_any_length() {
    let trigger = ForecastResult {
        horizon: 1,
        means: vec![[0.9, 0.2, 0.7]],
        stds: vec![[0.05; 3]],
        delta_means: vec![0.7],
        delta_stds: vec![0.05],
        miscalibration_probs: vec![0.99],
        intervention_trigger: Some(1),
        confidence: 0.8,
    };
    for cooldown in 1..12 {
        let mut gate = InterventionGate::new(cooldown);
        assert!(gate.should_intervene(&trigger).intervene);
        for _ in 1..cooldown {
            assert!(!gate.should_intervene(&trigger).intervene);
        }
        assert!(gate.should_intervene(&trigger).intervene, "cooldown {cooldown}");
    }
}

#[test]
fn forecasting_is_pure_with_respect_to_the_belief() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut est = KalmanEstimator::new(1.0, 0.05, 0.10);
    let li = LatentInference::new(LatentConfig::default(), 0.15);
    let forecaster = MultiStepForecaster::new(0.15, 0.85, 0.6, 0.4);
    for _ in 0..50 {
        est.predict(0.0);
        est.update([rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)]);
        let before = *est.belief();
        let latent = li.infer(&random_signals(&mut rng));
        let horizon = rng.gen_range(0..=5);
        let f = forecaster.forecast(est.model(), est.belief(), &li, &latent, horizon, &[0.5]);
        assert_eq!(*est.belief(), before);
        assert!(f.steps() <= horizon);
        assert!(f.miscalibration_probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!((0.0..=1.0).contains(&f.confidence));
    }
}

#[test]
fn random_streams_keep_metrics_finite() {
    for seed in SEEDS {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let cfg = FrameworkConfig {
            forecast_interval: 1,
            cooldown_steps: 3,
            ..FrameworkConfig::default()
        };
        let mut fw = TrustDriftFramework::new(cfg).unwrap();
        for _ in 0..150 {
            let signals = random_signals(&mut rng);
            let u = if rng.gen_bool(0.1) { Some(1.0) } else { None };
            fw.update(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), Some(&signals), u);
        }
        let m = fw.get_metrics();
        for v in [
            m.mean_delta,
            m.delta_variance,
            m.forecast_accuracy,
            m.false_positive_rate,
            m.intervention_effectiveness,
            m.avg_miscalibration_duration,
            m.mean_latency_ms,
        ] {
            assert!(v.is_finite(), "{m:?}");
        }
        assert!((0.0..=1.0).contains(&m.forecast_accuracy));
        assert!((0.0..=1.0).contains(&m.intervention_effectiveness));
        assert!(m.forecast.evaluations > 0);
    }
}
