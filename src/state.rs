//! Observation intake and the rolling calibration window.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::BehavioralSignals;

/// One interaction's raw observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Trust the user expressed in the AI output.
    pub user_trust: f64,
    /// Measured reliability of the AI for the interaction.
    pub actual_reliability: f64,
}

impl Observation {
    /// Builds an observation, clamping both values into [0, 1].
    ///
    /// Upstream telemetry is noisy; values are never rejected. Non-finite
    /// values collapse to 0.
    #[must_use]
    pub fn new(user_trust: f64, actual_reliability: f64) -> Self {
        Self {
            user_trust: clamp_unit(user_trust),
            actual_reliability: clamp_unit(actual_reliability),
        }
    }

    /// Calibration error magnitude `|T_user - R_actual|`.
    #[must_use]
    pub fn delta(&self) -> f64 {
        (self.user_trust - self.actual_reliability).abs()
    }
}

/// Derived calibration state for one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    /// Time the observation was recorded.
    pub timestamp: DateTime<Utc>,
    /// User trust in [0, 1].
    pub user_trust: f64,
    /// Actual reliability in [0, 1].
    pub actual_reliability: f64,
    /// `|user_trust - actual_reliability|`.
    pub delta_trust: f64,
}

impl TrustState {
    /// Measurement vector `[T_user, R_actual, delta]` for the estimator.
    #[must_use]
    pub fn as_measurement(&self) -> [f64; 3] {
        [self.user_trust, self.actual_reliability, self.delta_trust]
    }
}

/// Summary statistics of `delta_trust` over the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    /// States in the window.
    pub count: usize,
    /// Mean delta.
    pub mean: f64,
    /// Population variance of the delta.
    pub variance: f64,
}

/// Bounded rolling window of trust states.
#[derive(Debug, Clone)]
pub struct StateTracker {
    window_size: usize,
    window: VecDeque<TrustState>,
    interactions: u64,
    last_signals: BehavioralSignals,
}

impl StateTracker {
    /// Creates a tracker with the given window capacity (at least 1).
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            window: VecDeque::with_capacity(window_size),
            interactions: 0,
            last_signals: BehavioralSignals::default(),
        }
    }

    /// Records one interaction and returns its derived state.
    pub fn update(
        &mut self,
        user_trust: f64,
        actual_reliability: f64,
        signals: Option<&BehavioralSignals>,
    ) -> TrustState {
        let obs = Observation::new(user_trust, actual_reliability);
        let state = TrustState {
            timestamp: Utc::now(),
            user_trust: obs.user_trust,
            actual_reliability: obs.actual_reliability,
            delta_trust: obs.delta(),
        };

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(state);

        self.last_signals = signals.cloned().unwrap_or_default();
        self.interactions += 1;
        state
    }

    /// Window mean and population variance of `delta_trust`.
    #[must_use]
    pub fn compute_statistics(&self) -> WindowStatistics {
        let count = self.window.len();
        if count == 0 {
            return WindowStatistics::default();
        }
        let n = count as f64;
        let mean = self.window.iter().map(|s| s.delta_trust).sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|s| (s.delta_trust - mean).powi(2))
            .sum::<f64>()
            / n;
        WindowStatistics {
            count,
            mean,
            variance,
        }
    }

    /// Most recent state, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TrustState> {
        self.window.back()
    }

    /// Total interactions recorded since construction.
    #[must_use]
    pub const fn interaction_count(&self) -> u64 {
        self.interactions
    }

    /// Signals supplied with the latest observation.
    #[must_use]
    pub const fn last_signals(&self) -> &BehavioralSignals {
        &self.last_signals
    }

    /// Up to `n` most recent reliability values from the window, oldest first.
    #[must_use]
    pub fn recent_reliability(&self, n: usize) -> Vec<f64> {
        let skip = self.window.len().saturating_sub(n);
        self.window
            .iter()
            .skip(skip)
            .map(|s| s.actual_reliability)
            .collect()
    }

    /// States currently in the window, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &TrustState> {
        self.window.iter()
    }

    /// Number of states in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Returns true if nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Maximum window size.
    pub const fn capacity(&self) -> usize {
        self.window_size
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
