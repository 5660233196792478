use trustdrift::{
    BehavioralSignals, Convergence, EventType, FrameworkConfig, TrustDriftFramework,
};

fn decaying_reliability(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.9 - 0.6 * i as f64 / (n - 1) as f64)
        .collect()
}

fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[test]
fn alternating_miscalibration_fires_reactive_and_fails_requirements() {
    let mut fw = TrustDriftFramework::with_defaults();
    let mut first_reactive = None;
    for i in 1..=20u64 {
        let (t, r) = if i % 2 == 1 { (0.9, 0.5) } else { (0.5, 0.9) };
        let snap = fw.update(t, r, None, None);
        assert!((snap.state.delta_trust - 0.4).abs() < 1e-12);
        if snap.intervention.reactive_required && first_reactive.is_none() {
            first_reactive = Some(i);
        }
    }

    assert!(first_reactive.is_some_and(|i| i <= 5), "{first_reactive:?}");
    assert!(fw.count_events(EventType::Reactive) > 0);

    let metrics = fw.get_metrics();
    assert!((metrics.mean_delta - 0.4).abs() < 1e-9);
    assert!(!metrics.meets_requirements());
    assert!(!fw.meets_requirements());
    assert_eq!(metrics.interactions, 20);
    assert!(matches!(metrics.convergence, Convergence::Estimate { .. }));
}

#[test]
fn decaying_reliability_is_detected_as_drift() {
    let reliability = decaying_reliability(30);
    let (mu, sigma) = mean_and_sample_std(&reliability[..10]);
    let cfg = FrameworkConfig {
        mu_baseline: mu,
        sigma_baseline: sigma,
        ..FrameworkConfig::default()
    };
    // Same model without drift detection, to isolate what recalibration changed.
    let twin_cfg = FrameworkConfig {
        drift_warmup: 1000,
        ..cfg.clone()
    };
    let mut fw = TrustDriftFramework::new(cfg).unwrap();
    let mut twin = TrustDriftFramework::new(twin_cfg).unwrap();

    let mut first = None;
    for (i, r) in reliability.iter().enumerate() {
        let context_before = fw.latent().context_probability();
        let snap = fw.update(0.8, *r, None, None);
        let twin_snap = twin.update(0.8, *r, None, None);
        assert!(!twin_snap.drift.detected);
        if snap.drift.detected {
            first = Some((i + 1, snap.drift, context_before));
            break;
        }
        assert_eq!(fw.belief(), twin.belief());
    }

    let (at, signal, context_before) = first.expect("drift should be detected");
    assert!(at < 30, "detected at {at}");
    let cp = signal.change_point.expect("change point");
    assert!(cp > 10 && cp < 30, "change point {cp}");
    assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);

    // Covariance doubled relative to the undisturbed estimator, mean untouched.
    assert_eq!(fw.belief().mean, twin.belief().mean);
    assert_eq!(fw.belief().covariance, twin.belief().covariance * 2.0);

    // Statistic reset and baseline re-estimated from the last ten observations.
    assert_eq!(fw.drift_detector().statistic(), 0.0);
    let recent = fw.recent_reliability(10);
    assert_eq!(recent, reliability[at - 10..at].to_vec());
    let (new_mu, new_sigma) = fw.drift_detector().baseline();
    let (want_mu, want_sigma) = mean_and_sample_std(&recent);
    assert!((new_mu - want_mu).abs() < 1e-12, "{new_mu} vs {want_mu}");
    assert!((new_sigma - want_sigma).abs() < 1e-12, "{new_sigma} vs {want_sigma}");

    // Context posterior pulled 30% toward its 0.1 prior, then smoothed
    // toward the signal-free context shift of zero.
    let expected_context = 0.9 * (0.7 * context_before + 0.3 * 0.1);
    assert!((fw.latent().context_probability() - expected_context).abs() < 1e-12);

    assert_eq!(fw.count_events(EventType::DriftDetected), 1);
    assert_eq!(fw.get_metrics().total_drift_events, 1);
}

#[test]
fn drift_with_default_baseline_is_detected_after_warmup() {
    let mut fw = TrustDriftFramework::with_defaults();
    let mut detected_at = None;
    for (i, r) in decaying_reliability(30).into_iter().enumerate() {
        let snap = fw.update(r, r, None, None);
        if snap.drift.detected {
            detected_at = Some((i + 1, snap.drift.change_point));
            break;
        }
    }
    let (at, cp) = detected_at.expect("drift should be detected");
    assert!(at > 10 && at < 30);
    assert!(cp.is_some_and(|cp| cp > 10));
}

#[test]
fn reactive_only_mode_never_goes_proactive() {
    let cfg = FrameworkConfig {
        enable_predictive: false,
        ..FrameworkConfig::default()
    };
    let mut fw = TrustDriftFramework::new(cfg).unwrap();
    let signals = BehavioralSignals::new()
        .with("reliance_ratio", 0.95)
        .with("override_rate", 0.0);
    for _ in 0..40 {
        let snap = fw.update(0.95, 0.2, Some(&signals), None);
        assert!(snap.forecast.is_none());
        assert!(!snap.intervention.proactive_recommended);
        assert!(snap.intervention.reactive_required);
    }
    assert_eq!(fw.count_events(EventType::Proactive), 0);
    assert_eq!(fw.get_metrics().total_proactive, 0);
    assert_eq!(fw.get_metrics().total_reactive, 40);
}

#[test]
fn identical_observations_stay_calibrated() {
    let cfg = FrameworkConfig::default();
    let steps = cfg.window_size + 5;
    let mut fw = TrustDriftFramework::new(cfg).unwrap();
    for _ in 0..steps {
        let snap = fw.update(0.8, 0.8, None, None);
        assert_eq!(snap.state.delta_trust, 0.0);
        assert_eq!(snap.drift.statistic, 0.0);
        assert!(!snap.drift.detected);
    }
    assert_eq!(fw.events().count(), 0);
    assert_eq!(fw.get_metrics().mean_delta, 0.0);
}

#[test]
fn snapshot_survives_json() {
    let mut fw = TrustDriftFramework::with_defaults();
    let mut last = None;
    for _ in 0..5 {
        last = Some(fw.update(0.9, 0.6, None, Some(0.5)));
    }
    let snap = last.unwrap();
    assert!(snap.forecast.is_some());
    let json = serde_json::to_value(&snap).unwrap();
    assert!(json["forecast"]["lower_95"].is_array());
    assert!(json["intervention"]["reason"].is_string());
    assert_eq!(json["interaction"], 5);
}
