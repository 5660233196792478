//! Configuration for the trust-drift framework.
//!
//! Configuration is supplied once at construction as a flat option set. Every
//! field has a default, so a partial JSON document is a valid configuration:
//!
//! ```
//! use trustdrift::FrameworkConfig;
//!
//! let cfg = FrameworkConfig::from_json_str(r#"{ "window_size": 30, "cooldown_steps": 4 }"#).unwrap();
//! assert_eq!(cfg.window_size, 30);
//! assert_eq!(cfg.forecast_horizon, 3);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{TrustDriftResult, ValidationError};

/// Largest supported forecast horizon.
pub const MAX_FORECAST_HORIZON: usize = 5;

/// Top-level framework configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Rolling window size of the state tracker.
    pub window_size: usize,
    /// Time step between interactions, used by the estimator dynamics.
    pub dt: f64,
    /// Process noise standard deviation of the estimator.
    pub process_noise_std: f64,
    /// Measurement noise standard deviation of the estimator.
    pub measurement_noise_std: f64,
    /// Prior mean of actual reliability for the drift detector.
    pub mu_baseline: f64,
    /// Prior standard deviation of actual reliability for the drift detector.
    pub sigma_baseline: f64,
    /// CUSUM slack as a multiple of the baseline standard deviation.
    pub epsilon_factor: f64,
    /// CUSUM decision threshold as a multiple of the baseline standard deviation.
    pub h_factor: f64,
    /// Calibration delta above which miscalibration is considered harmful.
    pub intervention_threshold: f64,
    /// Miscalibration probability required to trigger a proactive intervention.
    pub intervention_confidence: f64,
    /// Gate calls to wait after a proactive trigger.
    pub cooldown_steps: usize,
    /// Run the forecaster on every n-th interaction.
    pub forecast_interval: usize,
    /// Number of steps forecast ahead.
    pub forecast_horizon: usize,
    /// Enables forecasting and proactive interventions.
    pub enable_predictive: bool,
    /// Observations the drift detector collects before accumulating.
    pub drift_warmup: usize,
    /// Recent observations used to re-estimate the drift baseline.
    pub baseline_window: usize,
    /// Weight of the estimator's delta prediction in the forecast blend.
    pub kalman_weight: f64,
    /// Weight of the latent-conditioned delta prediction in the forecast blend.
    pub latent_weight: f64,
    /// Maximum number of calibration events retained in memory.
    pub max_events: usize,
    /// Latent factor inference knobs.
    pub latent: LatentConfig,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            dt: 1.0,
            process_noise_std: 0.05,
            measurement_noise_std: 0.10,
            mu_baseline: 0.8,
            sigma_baseline: 0.1,
            epsilon_factor: 0.5,
            h_factor: 5.0,
            intervention_threshold: 0.15,
            intervention_confidence: 0.85,
            cooldown_steps: 10,
            forecast_interval: 5,
            forecast_horizon: 3,
            enable_predictive: true,
            drift_warmup: 10,
            baseline_window: 10,
            kalman_weight: 0.6,
            latent_weight: 0.4,
            max_events: 1000,
            latent: LatentConfig::default(),
        }
    }
}

impl FrameworkConfig {
    /// Parses a (possibly partial) JSON configuration and validates it.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON and a validation error
    /// for out-of-range values.
    pub fn from_json_str(json: &str) -> TrustDriftResult<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        at_least("window_size", self.window_size, 1)?;
        at_least("forecast_interval", self.forecast_interval, 1)?;
        at_least("baseline_window", self.baseline_window, 2)?;
        at_least("max_events", self.max_events, 1)?;
        if self.forecast_horizon == 0 || self.forecast_horizon > MAX_FORECAST_HORIZON {
            return Err(ValidationError::InvalidHorizon {
                value: self.forecast_horizon,
                max: MAX_FORECAST_HORIZON,
            });
        }

        positive("dt", self.dt)?;
        positive("process_noise_std", self.process_noise_std)?;
        positive("measurement_noise_std", self.measurement_noise_std)?;
        positive("sigma_baseline", self.sigma_baseline)?;
        positive("h_factor", self.h_factor)?;

        unit("mu_baseline", self.mu_baseline)?;
        unit("intervention_threshold", self.intervention_threshold)?;
        unit("intervention_confidence", self.intervention_confidence)?;
        unit("kalman_weight", self.kalman_weight)?;
        unit("latent_weight", self.latent_weight)?;
        if !self.epsilon_factor.is_finite() || self.epsilon_factor < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "epsilon_factor",
                min: 0.0,
                max: f64::INFINITY,
                value: self.epsilon_factor,
            });
        }
        if self.kalman_weight + self.latent_weight <= 0.0 {
            return Err(ValidationError::DegenerateBlendWeights);
        }

        self.latent.validate()
    }
}

/// Knobs of the latent factor inference.
///
/// The blend weights have no documented derivation; they are kept as
/// configurable defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentConfig {
    /// Weight of the posterior mean when blending task complexity.
    pub task_blend: f64,
    /// Weight of the posterior mean when blending cognitive load.
    pub cognitive_blend: f64,
    /// Weight of the posterior mean when blending user expertise.
    pub expertise_blend: f64,
    /// Override rate above which a context shift is declared.
    pub context_threshold: f64,
    /// Interaction frequency (per minute) that saturates the load signal.
    pub frequency_scale: f64,
    /// Dwell time (seconds) that saturates the load signal.
    pub dwell_scale: f64,
    /// Learning rate of the Beta nudges and context smoothing.
    pub learning_rate: f64,
    /// Assumed observation-noise precision of the delta regression.
    pub noise_precision: f64,
    /// Irreducible variance added to the predictive distribution.
    pub aleatory_variance: f64,
    /// Updates required before the convergence proxy is reported.
    pub min_updates: usize,
    /// Beta prior shape `alpha` shared by the bounded factors.
    pub prior_alpha: f64,
    /// Beta prior shape `beta` shared by the bounded factors.
    pub prior_beta: f64,
    /// Prior probability of a context shift.
    pub prior_context: f64,
    /// Prior mean of the regression weights, ordered task, load, context, expertise.
    pub prior_theta: [f64; 4],
    /// Prior variance of each regression weight.
    pub prior_theta_variance: f64,
}

impl Default for LatentConfig {
    fn default() -> Self {
        Self {
            task_blend: 0.7,
            cognitive_blend: 0.6,
            expertise_blend: 0.8,
            context_threshold: 0.3,
            frequency_scale: 10.0,
            dwell_scale: 60.0,
            learning_rate: 0.1,
            noise_precision: 100.0,
            aleatory_variance: 0.01,
            min_updates: 10,
            prior_alpha: 2.0,
            prior_beta: 2.0,
            prior_context: 0.1,
            prior_theta: [0.15, 0.10, 0.20, -0.10],
            prior_theta_variance: 0.1,
        }
    }
}

impl LatentConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        unit("latent.task_blend", self.task_blend)?;
        unit("latent.cognitive_blend", self.cognitive_blend)?;
        unit("latent.expertise_blend", self.expertise_blend)?;
        unit("latent.context_threshold", self.context_threshold)?;
        unit("latent.learning_rate", self.learning_rate)?;
        unit("latent.prior_context", self.prior_context)?;
        positive("latent.frequency_scale", self.frequency_scale)?;
        positive("latent.dwell_scale", self.dwell_scale)?;
        positive("latent.noise_precision", self.noise_precision)?;
        positive("latent.prior_alpha", self.prior_alpha)?;
        positive("latent.prior_beta", self.prior_beta)?;
        positive("latent.prior_theta_variance", self.prior_theta_variance)?;
        if !self.aleatory_variance.is_finite() || self.aleatory_variance < 0.0 {
            return Err(ValidationError::NotPositive {
                field: "latent.aleatory_variance",
                value: self.aleatory_variance,
            });
        }
        Ok(())
    }
}

fn at_least(field: &'static str, value: usize, min: usize) -> Result<(), ValidationError> {
    if value < min {
        return Err(ValidationError::TooSmall { field, min, value });
    }
    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(())
}

fn unit(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}
