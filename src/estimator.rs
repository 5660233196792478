//! Linear-Gaussian state estimator over `[T_user, R_actual, delta_trust]`.
//!
//! The model is
//!
//! ```text
//! x(t+1) = A x(t) + B u(t) + w,   w ~ N(0, Q)
//! z(t)   = C x(t) + v,            v ~ N(0, R)
//! ```
//!
//! with `A` diagonal (trust persists longest, the calibration delta
//! self-corrects fastest), `B` mapping a scalar intervention onto the state
//! and `C = I`. The belief is a plain value: forecasting threads a copy
//! through the dynamics and never touches the live estimate.
//!
//! `A` decays toward zero and has no mean-reversion target, so a constant
//! measurement `z` settles each mean component at `K z / (1 - a (1 - K))`
//! for its persistence `a` and steady-state gain `K`. That is strictly
//! below `z`, not `z` itself.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Index of user trust in the state vector.
pub const TRUST: usize = 0;
/// Index of actual reliability in the state vector.
pub const RELIABILITY: usize = 1;
/// Index of the calibration delta in the state vector.
pub const DELTA: usize = 2;

/// Per-unit-time persistence of user trust.
const TRUST_PERSISTENCE: f64 = 0.98;
/// Per-unit-time persistence of reliability.
const RELIABILITY_PERSISTENCE: f64 = 0.95;
/// Per-unit-time persistence of the calibration delta.
const DELTA_PERSISTENCE: f64 = 0.90;

/// Control gain: interventions raise trust, leave reliability, shrink delta.
const CONTROL_GAIN: [f64; 3] = [0.10, 0.0, -0.20];

/// Relative noise weights; reliability is the cleanest channel.
const NOISE_SHAPE: [f64; 3] = [1.0, 0.5, 1.0];

const INITIAL_MEAN: [f64; 3] = [0.5, 0.5, 0.0];
const INITIAL_VARIANCE: f64 = 0.1;

/// Added to the innovation covariance diagonal before inversion.
const INNOVATION_FLOOR: f64 = 1e-9;

/// Mean and covariance of the estimated state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// State mean, ordered trust, reliability, delta.
    pub mean: Vector3<f64>,
    /// State covariance.
    pub covariance: Matrix3<f64>,
}

impl Belief {
    /// Prior belief used at construction.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            mean: Vector3::from(INITIAL_MEAN),
            covariance: Matrix3::identity() * INITIAL_VARIANCE,
        }
    }

    /// Standard deviation of one state dimension.
    #[must_use]
    pub fn std(&self, index: usize) -> f64 {
        self.covariance[(index, index)].max(0.0).sqrt()
    }

    /// Compact serializable view.
    #[must_use]
    pub fn summary(&self) -> BeliefSummary {
        BeliefSummary {
            mean: [self.mean[TRUST], self.mean[RELIABILITY], self.mean[DELTA]],
            std: [self.std(TRUST), self.std(RELIABILITY), self.std(DELTA)],
        }
    }

    /// Restores exact symmetry and a non-negative diagonal.
    fn stabilize(&mut self) {
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
        for i in 0..3 {
            if self.covariance[(i, i)] < 0.0 {
                self.covariance[(i, i)] = 0.0;
            }
        }
    }
}

impl Default for Belief {
    fn default() -> Self {
        Self::initial()
    }
}

/// Mean and per-dimension standard deviation, ordered trust, reliability, delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeliefSummary {
    /// Posterior means.
    pub mean: [f64; 3],
    /// Per-dimension standard deviations.
    pub std: [f64; 3],
}

/// The fixed matrices of the state-space model.
#[derive(Debug, Clone, PartialEq)]
pub struct StateModel {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    c: Matrix3<f64>,
    q: Matrix3<f64>,
    r: Matrix3<f64>,
}

impl StateModel {
    /// Builds the model for a time step and noise levels.
    #[must_use]
    pub fn new(dt: f64, process_noise_std: f64, measurement_noise_std: f64) -> Self {
        let a = Matrix3::from_diagonal(&Vector3::new(
            TRUST_PERSISTENCE.powf(dt),
            RELIABILITY_PERSISTENCE.powf(dt),
            DELTA_PERSISTENCE.powf(dt),
        ));
        let b = Vector3::from(CONTROL_GAIN) * dt;
        let shape = Vector3::from(NOISE_SHAPE);
        let q = Matrix3::from_diagonal(&(shape * process_noise_std.powi(2)));
        let r = Matrix3::from_diagonal(&(shape * measurement_noise_std.powi(2)));
        Self {
            a,
            b,
            c: Matrix3::identity(),
            q,
            r,
        }
    }

    /// One prediction step applied to a belief value.
    #[must_use]
    pub fn propagate(&self, belief: &Belief, control: f64) -> Belief {
        let control = if control.is_finite() { control } else { 0.0 };
        let mut next = Belief {
            mean: self.a * belief.mean + self.b * control,
            covariance: self.a * belief.covariance * self.a.transpose() + self.q,
        };
        next.stabilize();
        next
    }

    /// Kalman correction of a belief by a measurement.
    ///
    /// Returns `None` when the innovation covariance stays singular after
    /// flooring; the caller keeps the uncorrected belief.
    #[must_use]
    pub fn correct(&self, belief: &Belief, measurement: &Vector3<f64>) -> Option<Belief> {
        let innovation = measurement - self.c * belief.mean;
        let s = self.c * belief.covariance * self.c.transpose()
            + self.r
            + Matrix3::identity() * INNOVATION_FLOOR;
        let s_inv = s.try_inverse()?;
        let gain = belief.covariance * self.c.transpose() * s_inv;

        // Joseph form keeps the covariance PSD under rounding.
        let i_kc = Matrix3::identity() - gain * self.c;
        let mut corrected = Belief {
            mean: belief.mean + gain * innovation,
            covariance: i_kc * belief.covariance * i_kc.transpose()
                + gain * self.r * gain.transpose(),
        };
        corrected.stabilize();
        if corrected.mean.iter().chain(corrected.covariance.iter()).all(|v| v.is_finite()) {
            Some(corrected)
        } else {
            None
        }
    }
}

/// Live Kalman filter for one monitored subject.
#[derive(Debug, Clone)]
pub struct KalmanEstimator {
    model: StateModel,
    belief: Belief,
}

impl KalmanEstimator {
    /// Creates an estimator at the prior belief.
    #[must_use]
    pub fn new(dt: f64, process_noise_std: f64, measurement_noise_std: f64) -> Self {
        Self {
            model: StateModel::new(dt, process_noise_std, measurement_noise_std),
            belief: Belief::initial(),
        }
    }

    /// Advances the belief by one step with an optional control input.
    pub fn predict(&mut self, control: f64) -> Belief {
        self.belief = self.model.propagate(&self.belief, control);
        self.belief
    }

    /// Corrects the belief with a `[T_user, R_actual, delta]` measurement.
    pub fn update(&mut self, measurement: [f64; 3]) -> Belief {
        let z = Vector3::from(measurement);
        match self.model.correct(&self.belief, &z) {
            Some(corrected) => self.belief = corrected,
            None => warn!(
                ?measurement,
                "singular innovation covariance; keeping predicted belief"
            ),
        }
        self.belief
    }

    /// Predicts `steps` ahead without consuming observations.
    ///
    /// Controls beyond the end of `controls` are zero. The live belief is
    /// not modified.
    #[must_use]
    pub fn forecast(&self, steps: usize, controls: &[f64]) -> Vec<Belief> {
        forecast_from(&self.model, self.belief, steps, controls)
    }

    /// Scales the covariance, widening uncertainty after a regime change.
    pub fn inflate_covariance(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.belief.covariance *= factor;
            self.belief.stabilize();
        }
    }

    /// Current belief.
    #[must_use]
    pub const fn belief(&self) -> &Belief {
        &self.belief
    }

    /// The state-space model used for prediction.
    #[must_use]
    pub const fn model(&self) -> &StateModel {
        &self.model
    }
}

/// Threads a belief copy through `steps` predictions.
#[must_use]
pub fn forecast_from(model: &StateModel, start: Belief, steps: usize, controls: &[f64]) -> Vec<Belief> {
    let mut out = Vec::with_capacity(steps);
    let mut belief = start;
    for i in 0..steps {
        belief = model.propagate(&belief, controls.get(i).copied().unwrap_or(0.0));
        out.push(belief);
    }
    out
}
