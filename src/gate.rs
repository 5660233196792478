//! Cooldown-gated proactive intervention decisions.
//!
//! After a proactive intervention fires the gate cools down for
//! `cooldown_steps` calls. Calls made while cooling return "no" regardless of
//! the forecast; the `cooldown_steps`-th call after a trigger is evaluated
//! normally again.

use serde::{Deserialize, Serialize};

use crate::forecast::ForecastResult;

/// Gate state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// Proactive interventions may fire.
    Ready,
    /// Suppressing interventions after a trigger.
    Cooling {
        /// Gate calls since the trigger.
        elapsed: usize,
        /// Calls the cooldown lasts.
        total: usize,
    },
}

/// One gate verdict with its justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether to intervene now.
    pub intervene: bool,
    /// Human-readable justification.
    pub reason: String,
}

impl GateDecision {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            intervene: false,
            reason: reason.into(),
        }
    }
}

/// Converts forecasts into go/no-go proactive intervention signals.
#[derive(Debug, Clone)]
pub struct InterventionGate {
    cooldown_steps: usize,
    state: GateState,
    decisions: u64,
    triggers: u64,
}

impl InterventionGate {
    /// Creates a ready gate.
    #[must_use]
    pub const fn new(cooldown_steps: usize) -> Self {
        Self {
            cooldown_steps,
            state: GateState::Ready,
            decisions: 0,
            triggers: 0,
        }
    }

    /// Decides whether to intervene on this forecast.
    pub fn should_intervene(&mut self, forecast: &ForecastResult) -> GateDecision {
        self.decisions += 1;

        if let GateState::Cooling { elapsed, total } = self.state {
            let elapsed = elapsed + 1;
            if elapsed < total {
                self.state = GateState::Cooling { elapsed, total };
                return GateDecision::no(format!("cooling ({elapsed}/{total})"));
            }
            self.state = GateState::Ready;
        }

        let Some(step) = forecast.intervention_trigger else {
            return GateDecision::no("no threat detected");
        };

        let probability = forecast.trigger_probability().unwrap_or(0.0);
        self.triggers += 1;
        if self.cooldown_steps > 0 {
            self.state = GateState::Cooling {
                elapsed: 0,
                total: self.cooldown_steps,
            };
        }
        GateDecision {
            intervene: true,
            reason: format!(
                "predicted miscalibration at t+{step} with probability {probability:.2}"
            ),
        }
    }

    /// Forces immediate readiness.
    pub fn reset_cooldown(&mut self) {
        self.state = GateState::Ready;
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Returns true when not cooling.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, GateState::Ready)
    }

    /// Calls to `should_intervene` so far.
    #[must_use]
    pub const fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Interventions recommended so far.
    #[must_use]
    pub const fn triggers(&self) -> u64 {
        self.triggers
    }
}
