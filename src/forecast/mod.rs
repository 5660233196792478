//! Multi-step miscalibration forecasting.
//!
//! The forecaster blends two views of the future calibration delta: the state
//! estimator's own k-step prediction and the latent-factor regression. For
//! each step it reports a Gaussian mean/std and the probability that the
//! delta exceeds the intervention threshold. Forecasting stops at the first
//! step whose exceedance probability clears the confidence gate.

pub mod accuracy;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::estimator::{forecast_from, Belief, StateModel, DELTA, RELIABILITY, TRUST};
use crate::latent::{LatentInference, LatentVariables};

pub use accuracy::{AccuracySummary, AccuracyTracker, ForecastEvaluation};

/// Standard deviations are floored here before any division.
const STD_FLOOR: f64 = 1e-6;

/// Scale of the uncertainty-to-confidence mapping `exp(-k * mean_std)`.
const CONFIDENCE_DECAY: f64 = 5.0;

// Mean 0 and std 1 always pass `Normal::new`'s parameter check.
fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// Standard normal CDF.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    standard_normal().map_or(f64::NAN, |n| n.cdf(x))
}

/// Standard normal quantile for `p` in (0, 1); infinite at the endpoints
/// and NaN for NaN input.
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    standard_normal().map_or(f64::NAN, |n| n.inverse_cdf(p))
}

/// Two-sided interval around one forecast step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl PredictionInterval {
    /// Whether `value` lies inside the closed interval.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// A k-step trajectory. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Requested horizon; fewer steps are present after an early stop.
    pub horizon: usize,
    /// Estimator means per step, ordered trust, reliability, delta.
    pub means: Vec<[f64; 3]>,
    /// Estimator standard deviations per step.
    pub stds: Vec<[f64; 3]>,
    /// Blended delta mean per step.
    pub delta_means: Vec<f64>,
    /// Blended delta standard deviation per step.
    pub delta_stds: Vec<f64>,
    /// `P(delta > threshold)` per step.
    pub miscalibration_probs: Vec<f64>,
    /// 1-based step at which the confidence gate fired.
    pub intervention_trigger: Option<usize>,
    /// In [0, 1]; higher when the trajectory is less uncertain.
    pub confidence: f64,
}

impl ForecastResult {
    /// Number of computed steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.delta_means.len()
    }

    /// Returns true if no step was computed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delta_means.is_empty()
    }

    /// `delta_mean ± z(1 - alpha/2) * delta_std` for every computed step.
    #[must_use]
    pub fn get_prediction_intervals(&self, alpha: f64) -> Vec<PredictionInterval> {
        let z = normal_quantile(1.0 - alpha / 2.0);
        self.delta_means
            .iter()
            .zip(&self.delta_stds)
            .map(|(m, s)| PredictionInterval {
                lower: m - z * s,
                upper: m + z * s,
            })
            .collect()
    }

    /// Exceedance probability at the trigger step, if any.
    #[must_use]
    pub fn trigger_probability(&self) -> Option<f64> {
        let step = self.intervention_trigger?;
        self.miscalibration_probs.get(step.checked_sub(1)?).copied()
    }

    /// Mean and std of the first step.
    #[must_use]
    pub fn one_step(&self) -> Option<(f64, f64)> {
        Some((*self.delta_means.first()?, *self.delta_stds.first()?))
    }

    /// Serializable view with 95% bounds.
    #[must_use]
    pub fn payload(&self) -> ForecastPayload {
        let intervals = self.get_prediction_intervals(0.05);
        ForecastPayload {
            horizon: self.horizon,
            delta_means: self.delta_means.clone(),
            delta_stds: self.delta_stds.clone(),
            lower_95: intervals.iter().map(|i| i.lower).collect(),
            upper_95: intervals.iter().map(|i| i.upper).collect(),
            miscalibration_probs: self.miscalibration_probs.clone(),
            trigger_step: self.intervention_trigger,
            confidence: self.confidence,
        }
    }
}

/// Outbound forecast block of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPayload {
    /// Requested horizon.
    pub horizon: usize,
    /// Blended delta mean per step.
    pub delta_means: Vec<f64>,
    /// Blended delta standard deviation per step.
    pub delta_stds: Vec<f64>,
    /// Lower 95% bound per step.
    pub lower_95: Vec<f64>,
    /// Upper 95% bound per step.
    pub upper_95: Vec<f64>,
    /// `P(delta > threshold)` per step.
    pub miscalibration_probs: Vec<f64>,
    /// 1-based step at which the confidence gate fired.
    pub trigger_step: Option<usize>,
    /// In [0, 1]; higher when the trajectory is less uncertain.
    pub confidence: f64,
}

/// Blends estimator and latent predictions into a gated trajectory.
#[derive(Debug, Clone)]
pub struct MultiStepForecaster {
    threshold: f64,
    confidence_threshold: f64,
    kalman_weight: f64,
    latent_weight: f64,
}

impl MultiStepForecaster {
    /// Creates a forecaster for one threshold, confidence gate and blend.
    #[must_use]
    pub const fn new(
        threshold: f64,
        confidence_threshold: f64,
        kalman_weight: f64,
        latent_weight: f64,
    ) -> Self {
        Self {
            threshold,
            confidence_threshold,
            kalman_weight,
            latent_weight,
        }
    }

    /// Forecasts up to `horizon` steps from `belief`.
    ///
    /// The belief is taken by reference and propagated as a local copy.
    /// Controls past the end of `controls` are zero.
    #[must_use]
    pub fn forecast(
        &self,
        model: &StateModel,
        belief: &Belief,
        inference: &LatentInference,
        latent: &LatentVariables,
        horizon: usize,
        controls: &[f64],
    ) -> ForecastResult {
        let (mu_latent, sigma_latent) = inference.get_predictive_distribution(latent);

        let mut result = ForecastResult {
            horizon,
            means: Vec::with_capacity(horizon),
            stds: Vec::with_capacity(horizon),
            delta_means: Vec::with_capacity(horizon),
            delta_stds: Vec::with_capacity(horizon),
            miscalibration_probs: Vec::with_capacity(horizon),
            intervention_trigger: None,
            confidence: 0.0,
        };

        for (step, current) in (1..).zip(forecast_from(model, *belief, horizon, controls)) {
            let sigma_kalman = current.std(DELTA);
            let mu = self.kalman_weight * current.mean[DELTA] + self.latent_weight * mu_latent;
            let mu = if mu.is_finite() { mu.clamp(0.0, 1.0) } else { 0.0 };
            let var = (self.kalman_weight * sigma_kalman).powi(2)
                + (self.latent_weight * sigma_latent).powi(2);
            let sigma = if var.is_finite() {
                var.sqrt().max(STD_FLOOR)
            } else {
                STD_FLOOR
            };
            let prob = (1.0 - normal_cdf((self.threshold - mu) / sigma)).clamp(0.0, 1.0);

            result.means.push([
                current.mean[TRUST],
                current.mean[RELIABILITY],
                current.mean[DELTA],
            ]);
            result
                .stds
                .push([current.std(TRUST), current.std(RELIABILITY), sigma_kalman]);
            result.delta_means.push(mu);
            result.delta_stds.push(sigma);
            result.miscalibration_probs.push(prob);

            if prob > self.confidence_threshold {
                result.intervention_trigger = Some(step);
                break;
            }
        }

        if !result.delta_stds.is_empty() {
            let mean_std =
                result.delta_stds.iter().sum::<f64>() / result.delta_stds.len() as f64;
            result.confidence = (-CONFIDENCE_DECAY * mean_std).exp().clamp(0.0, 1.0);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LatentConfig;
    use crate::estimator::KalmanEstimator;
    use crate::signals::BehavioralSignals;

    fn setup() -> (KalmanEstimator, LatentInference, LatentVariables) {
        let est = KalmanEstimator::new(1.0, 0.05, 0.10);
        let li = LatentInference::new(LatentConfig::default(), 0.15);
        let latent = li.infer(&BehavioralSignals::new());
        (est, li, latent)
    }

    fn forecaster() -> MultiStepForecaster {
        MultiStepForecaster::new(0.15, 0.85, 0.6, 0.4)
    }

    #[test]
    fn test_normal_helpers_match_reference_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.959_963_984_540_054) - 0.975).abs() < 1e-9);
        assert!((normal_quantile(0.975) - 1.959_963_984_540_054).abs() < 1e-6);
        assert!(normal_quantile(0.0).is_infinite());
        assert!(normal_quantile(0.5).abs() < 1e-9);
        assert!((normal_quantile(0.025) + 1.959_963_984_540_054).abs() < 1e-6);
    }

    #[test]
    fn test_quantile_handles_out_of_domain_input() {
        assert_eq!(normal_quantile(-0.5), f64::NEG_INFINITY);
        assert_eq!(normal_quantile(1.5), f64::INFINITY);
        assert!(normal_quantile(f64::NAN).is_nan());
    }

    #[test]
    fn test_forecast_means_follow_estimator_forecast() {
        let (mut est, li, latent) = setup();
        est.predict(0.0);
        est.update([0.9, 0.6, 0.3]);
        let controls = [1.0, 0.5];
        let expected = est.forecast(4, &controls);
        let r = MultiStepForecaster::new(0.2, 1.1, 0.6, 0.4)
            .forecast(est.model(), est.belief(), &li, &latent, 4, &controls);
        assert_eq!(r.means.len(), 4);
        for (got, want) in r.means.iter().zip(&expected) {
            assert_eq!(got[DELTA], want.mean[DELTA]);
            assert_eq!(got[TRUST], want.mean[TRUST]);
        }
    }

    #[test]
    fn test_zero_horizon_is_empty() {
        let (est, li, latent) = setup();
        let r = forecaster().forecast(est.model(), est.belief(), &li, &latent, 0, &[]);
        assert!(r.is_empty());
        assert_eq!(r.intervention_trigger, None);
        assert_eq!(r.confidence, 0.0);
        assert!(r.get_prediction_intervals(0.05).is_empty());
    }

    #[test]
    fn test_calm_state_runs_full_horizon_without_trigger() {
        let (mut est, li, latent) = setup();
        for _ in 0..30 {
            est.predict(0.0);
            est.update([0.8, 0.8, 0.0]);
        }
        let r = forecaster().forecast(est.model(), est.belief(), &li, &latent, 3, &[]);
        assert_eq!(r.steps(), 3);
        assert_eq!(r.intervention_trigger, None);
        assert!(r.miscalibration_probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(r.confidence > 0.0 && r.confidence <= 1.0);
    }

    #[test]
    fn test_severe_miscalibration_triggers_early() {
        let (mut est, li, latent) = setup();
        for _ in 0..30 {
            est.predict(0.0);
            est.update([0.95, 0.2, 0.75]);
        }
        let r = forecaster().forecast(est.model(), est.belief(), &li, &latent, 5, &[]);
        assert_eq!(r.intervention_trigger, Some(1));
        assert_eq!(r.steps(), 1);
        assert!(r.trigger_probability().unwrap() > 0.85);
    }

    #[test]
    fn test_forecasting_leaves_the_belief_untouched() {
        let (mut est, li, latent) = setup();
        est.predict(0.0);
        est.update([0.9, 0.4, 0.5]);
        let before = *est.belief();
        let _ = forecaster().forecast(est.model(), est.belief(), &li, &latent, 5, &[1.0, 1.0]);
        assert_eq!(*est.belief(), before);
    }

    #[test]
    fn test_intervals_use_normal_quantile() {
        let r = ForecastResult {
            horizon: 1,
            means: vec![[0.0; 3]],
            stds: vec![[0.0; 3]],
            delta_means: vec![0.2],
            delta_stds: vec![0.1],
            miscalibration_probs: vec![0.7],
            intervention_trigger: None,
            confidence: 0.6,
        };
        let iv = r.get_prediction_intervals(0.05)[0];
        assert!((iv.lower - (0.2 - 0.195_996)).abs() < 1e-5);
        assert!((iv.upper - (0.2 + 0.195_996)).abs() < 1e-5);
        assert!(iv.contains(0.3));
        let payload = r.payload();
        assert_eq!(payload.lower_95.len(), 1);
        assert_eq!(payload.trigger_step, None);
    }
}
