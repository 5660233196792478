//! Latent causal factors behind miscalibration.
//!
//! Four unobserved factors are inferred from behavioral telemetry: task
//! complexity, cognitive load, context shift and user expertise. Each bounded
//! factor carries a Beta posterior; the context shift carries a smoothed
//! probability. An online Bayesian linear regression maps the factor vector
//! to the expected calibration delta, so its predictive uncertainty shrinks as
//! evidence accumulates.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::config::LatentConfig;
use crate::signals::BehavioralSignals;

/// Upper bound of the single-chain convergence proxy.
pub const MAX_R_HAT: f64 = 2.0;
/// Proxy values below this are considered converged.
pub const CONVERGED_R_HAT: f64 = 1.1;

/// Fraction of the current posterior kept by a drift reset.
pub const DRIFT_RETENTION: f64 = 0.7;

/// Point estimates of the latent factors for one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatentVariables {
    /// Task complexity in [0, 1].
    pub task_complexity: f64,
    /// Cognitive load in [0, 1].
    pub cognitive_load: f64,
    /// Exactly 0.0 or 1.0.
    pub context_shift: f64,
    /// User expertise in [0, 1].
    pub user_expertise: f64,
}

impl LatentVariables {
    /// Regression design row `[C_task, L_cognitive, E_context, U_expertise]`.
    #[must_use]
    pub fn as_vector(&self) -> Vector4<f64> {
        Vector4::new(
            self.task_complexity,
            self.cognitive_load,
            self.context_shift,
            self.user_expertise,
        )
    }

    /// Whether a context shift was flagged.
    #[must_use]
    pub fn context_shift_detected(&self) -> bool {
        self.context_shift >= 0.5
    }
}

/// Beta(alpha, beta) shape pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    /// Pseudo-count of successes.
    pub alpha: f64,
    /// Pseudo-count of failures.
    pub beta: f64,
}

impl BetaPosterior {
    /// Creates a posterior with the given shapes.
    #[must_use]
    pub const fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Posterior mean `alpha / (alpha + beta)`.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior variance.
    #[must_use]
    pub fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        self.alpha * self.beta / (s * s * (s + 1.0))
    }

    fn nudge(&mut self, observed: f64, rate: f64) {
        self.alpha += rate * observed;
        self.beta += rate * (1.0 - observed);
    }

    fn blend(&mut self, prior: &Self, retain: f64) {
        self.alpha = retain * self.alpha + (1.0 - retain) * prior.alpha;
        self.beta = retain * self.beta + (1.0 - retain) * prior.beta;
    }
}

/// Single-chain stand-in for a multi-chain R-hat.
///
/// This is an approximation, `1 + trace(theta covariance)`, and says nothing
/// about mixing across chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Convergence {
    /// Too few updates to report anything.
    NotAvailable {
        /// Updates applied so far.
        updates: u64,
        /// Updates needed before a value is reported.
        required: u64,
    },
    /// Proxy value in [1, 2].
    Estimate {
        /// `1 + trace(covariance)`, clamped.
        r_hat: f64,
    },
}

impl Convergence {
    /// Proxy value, with the not-converged bound for missing history.
    #[must_use]
    pub const fn r_hat(&self) -> f64 {
        match self {
            Self::NotAvailable { .. } => MAX_R_HAT,
            Self::Estimate { r_hat } => *r_hat,
        }
    }

    /// Whether the proxy is below the convergence cut-off.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Estimate { r_hat } if *r_hat < CONVERGED_R_HAT)
    }
}

/// Posterior state over the latent factors plus the delta regression.
#[derive(Debug, Clone)]
pub struct LatentInference {
    cfg: LatentConfig,
    miscalibration_threshold: f64,

    task: BetaPosterior,
    load: BetaPosterior,
    expertise: BetaPosterior,
    context_probability: f64,

    theta: Vector4<f64>,
    theta_covariance: Matrix4<f64>,
    updates: u64,
}

impl LatentInference {
    /// Starts at the configured priors.
    #[must_use]
    pub fn new(cfg: LatentConfig, miscalibration_threshold: f64) -> Self {
        let prior = BetaPosterior::new(cfg.prior_alpha, cfg.prior_beta);
        Self {
            miscalibration_threshold,
            task: prior,
            load: prior,
            expertise: prior,
            context_probability: cfg.prior_context,
            theta: Vector4::from(cfg.prior_theta),
            theta_covariance: Matrix4::identity() * cfg.prior_theta_variance,
            updates: 0,
            cfg,
        }
    }

    /// Blends posterior means with signal-derived estimates.
    #[must_use]
    pub fn infer(&self, signals: &BehavioralSignals) -> LatentVariables {
        let cfg = &self.cfg;

        let task_complexity = blend(cfg.task_blend, self.task.mean(), signals.query_complexity());

        let frequency = (signals.interaction_frequency() / cfg.frequency_scale).min(1.0);
        let dwell = (signals.dwell_time() / cfg.dwell_scale).min(1.0);
        let load_signal = 0.5 * frequency + 0.5 * dwell;
        let cognitive_load = blend(cfg.cognitive_blend, self.load.mean(), load_signal);

        let context_shift = if signals.override_rate() > cfg.context_threshold {
            1.0
        } else {
            0.0
        };

        // Moderate reliance reads as expertise; blind trust and blanket rejection do not.
        let reliance_signal = 1.0 - 2.0 * (signals.reliance_ratio() - 0.5).abs();
        let user_expertise = blend(cfg.expertise_blend, self.expertise.mean(), reliance_signal);

        LatentVariables {
            task_complexity,
            cognitive_load,
            context_shift,
            user_expertise,
        }
    }

    /// Folds a realized calibration delta into the posteriors.
    pub fn update_posterior(&mut self, latent: &LatentVariables, delta_observed: f64) {
        if !delta_observed.is_finite() {
            return;
        }
        let x = latent.as_vector();
        let y = delta_observed;

        // Rank-one Bayesian regression update (Sherman-Morrison form).
        let s = self.theta_covariance * x;
        let denom = 1.0 / self.cfg.noise_precision + x.dot(&s);
        if denom.is_finite() && denom > 0.0 {
            let gain = s / denom;
            self.theta += gain * (y - x.dot(&self.theta));
            self.theta_covariance -= gain * s.transpose();
            self.theta_covariance =
                (self.theta_covariance + self.theta_covariance.transpose()) * 0.5;
        }

        let rate = self.cfg.learning_rate;
        if delta_observed > self.miscalibration_threshold {
            self.task.nudge(latent.task_complexity, rate);
            self.load.nudge(latent.cognitive_load, rate);
            self.expertise.nudge(latent.user_expertise, rate);
        }
        self.context_probability =
            (1.0 - rate) * self.context_probability + rate * latent.context_shift;

        self.updates += 1;
    }

    /// Point prediction of the calibration delta, clipped to [0, 1].
    #[must_use]
    pub fn predict_delta(&self, latent: &LatentVariables) -> f64 {
        let raw = self.theta.dot(&latent.as_vector());
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Predictive mean and standard deviation (epistemic plus aleatory).
    #[must_use]
    pub fn get_predictive_distribution(&self, latent: &LatentVariables) -> (f64, f64) {
        let x = latent.as_vector();
        let epistemic = x.dot(&(self.theta_covariance * x)).max(0.0);
        let std = (epistemic + self.cfg.aleatory_variance).sqrt();
        (self.predict_delta(latent), std)
    }

    /// Convergence proxy; unavailable until enough updates were seen.
    #[must_use]
    pub fn get_convergence_diagnostic(&self) -> Convergence {
        let required = self.cfg.min_updates as u64;
        if self.updates < required {
            return Convergence::NotAvailable {
                updates: self.updates,
                required,
            };
        }
        let r_hat = (1.0 + self.theta_covariance.trace()).clamp(1.0, MAX_R_HAT);
        Convergence::Estimate { r_hat }
    }

    /// Moves every posterior quantity part of the way back to its prior.
    ///
    /// `retain` is the share of the current posterior that survives.
    pub fn reset_toward_prior(&mut self, retain: f64) {
        let retain = retain.clamp(0.0, 1.0);
        let prior = BetaPosterior::new(self.cfg.prior_alpha, self.cfg.prior_beta);
        self.task.blend(&prior, retain);
        self.load.blend(&prior, retain);
        self.expertise.blend(&prior, retain);
        self.context_probability =
            retain * self.context_probability + (1.0 - retain) * self.cfg.prior_context;

        let prior_theta = Vector4::from(self.cfg.prior_theta);
        let prior_cov = Matrix4::identity() * self.cfg.prior_theta_variance;
        self.theta = self.theta * retain + prior_theta * (1.0 - retain);
        self.theta_covariance = self.theta_covariance * retain + prior_cov * (1.0 - retain);
    }

    /// Regression weights, ordered task, load, context, expertise.
    #[must_use]
    pub const fn theta(&self) -> &Vector4<f64> {
        &self.theta
    }

    /// Regression weight covariance.
    #[must_use]
    pub const fn theta_covariance(&self) -> &Matrix4<f64> {
        &self.theta_covariance
    }

    /// Posteriors of task complexity, cognitive load and expertise.
    #[must_use]
    pub const fn posteriors(&self) -> [BetaPosterior; 3] {
        [self.task, self.load, self.expertise]
    }

    /// Smoothed probability of a context shift.
    #[must_use]
    pub const fn context_probability(&self) -> f64 {
        self.context_probability
    }

    /// Posterior updates applied so far.
    #[must_use]
    pub const fn updates(&self) -> u64 {
        self.updates
    }
}

fn blend(posterior_weight: f64, posterior_mean: f64, observed: f64) -> f64 {
    let v = posterior_weight * posterior_mean + (1.0 - posterior_weight) * observed;
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        posterior_mean.clamp(0.0, 1.0)
    }
}
