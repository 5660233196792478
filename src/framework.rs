//! The per-subject update cycle.
//!
//! `TrustDriftFramework` owns one instance of every component and runs them
//! in a fixed order on each interaction:
//!
//! 1. resolve last interaction's events and score the pending 1-step forecast
//! 2. state tracker
//! 3. estimator predict + update
//! 4. drift detector, recalibrating on detection
//! 5. latent inference + posterior update
//! 6. forecaster and intervention gate, every `forecast_interval`-th interaction
//! 7. reactive safety net
//! 8. miscalibration-duration bookkeeping and the status snapshot
//!
//! One framework serves exactly one subject. Use
//! [`SubjectRegistry`](crate::registry::SubjectRegistry) to serve many.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::FrameworkConfig;
use crate::drift::{DriftDetector, DriftSignal};
use crate::error::TrustDriftResult;
use crate::estimator::{Belief, BeliefSummary, KalmanEstimator};
use crate::events::{CalibrationEvent, EventLog, EventNotice, EventSink, EventType};
use crate::forecast::{AccuracySummary, AccuracyTracker, ForecastPayload, ForecastResult, MultiStepForecaster};
use crate::gate::{GateState, InterventionGate};
use crate::latent::{Convergence, LatentInference, LatentVariables, DRIFT_RETENTION};
use crate::signals::BehavioralSignals;
use crate::state::{StateTracker, TrustState, WindowStatistics};

/// Estimator covariance multiplier applied when drift is detected.
const DRIFT_COVARIANCE_INFLATION: f64 = 2.0;

/// Required forecast accuracy.
pub const REQUIRED_FORECAST_ACCURACY: f64 = 0.75;
/// Maximum tolerated false-positive rate of proactive alarms.
pub const MAX_FALSE_POSITIVE_RATE: f64 = 0.05;
/// Required share of proactive interventions followed by a calibrated delta.
pub const REQUIRED_EFFECTIVENESS: f64 = 0.70;
/// Update latency budget in milliseconds.
pub const LATENCY_BUDGET_MS: f64 = 200.0;

/// Intervention block of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionStatus {
    /// A proactive intervention fired this cycle.
    pub proactive_recommended: bool,
    /// The current delta exceeds the threshold and nothing proactive fired.
    pub reactive_required: bool,
    /// Human-readable justification for the verdict.
    pub reason: String,
    /// Proactive interventions since construction.
    pub total_proactive: u64,
    /// Reactive interventions since construction.
    pub total_reactive: u64,
    /// Drift recalibrations since construction.
    pub total_drift_events: u64,
    /// Gate state after this cycle.
    pub gate: GateState,
}

/// Everything one update cycle produced, ready to be persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// 1-based interaction number.
    pub interaction: u64,
    /// Time the observation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Clamped observation and its delta.
    pub state: TrustState,
    /// Delta statistics over the tracker window.
    pub window: WindowStatistics,
    /// Estimator belief after the correction.
    pub belief: BeliefSummary,
    /// Latent factors inferred this cycle.
    pub latent: LatentVariables,
    /// Drift detector output, before any recalibration.
    pub drift: DriftSignal,
    /// Forecast, present on forecasting interactions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastPayload>,
    /// Intervention verdict and running totals.
    pub intervention: InterventionStatus,
    /// Wall-clock duration of this update.
    pub latency_ms: f64,
}

/// Aggregate health of the controller for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkMetrics {
    /// Interactions processed.
    pub interactions: u64,
    /// Mean calibration delta over the tracker window.
    pub mean_delta: f64,
    /// Population variance of the delta over the tracker window.
    pub delta_variance: f64,
    /// 0 until a forecast has been evaluated.
    pub forecast_accuracy: f64,
    /// Full forecast accuracy breakdown.
    pub forecast: AccuracySummary,
    /// False alarms per evaluated forecast.
    pub false_positive_rate: f64,
    /// 1 until a proactive intervention has been resolved.
    pub intervention_effectiveness: f64,
    /// Mean length, in interactions, of runs above threshold (including the ongoing one).
    pub avg_miscalibration_duration: f64,
    /// Mean update latency.
    pub mean_latency_ms: f64,
    /// Worst update latency.
    pub max_latency_ms: f64,
    /// Proactive interventions since construction.
    pub total_proactive: u64,
    /// Reactive interventions since construction.
    pub total_reactive: u64,
    /// Drift recalibrations since construction.
    pub total_drift_events: u64,
    /// Latent regression convergence proxy.
    pub convergence: Convergence,
    /// Threshold the mean delta is judged against.
    pub delta_threshold: f64,
}

impl FrameworkMetrics {
    /// True only when every operational target is met.
    #[must_use]
    pub fn meets_requirements(&self) -> bool {
        self.mean_delta <= self.delta_threshold
            && self.forecast_accuracy >= REQUIRED_FORECAST_ACCURACY
            && self.false_positive_rate <= MAX_FALSE_POSITIVE_RATE
            && self.intervention_effectiveness >= REQUIRED_EFFECTIVENESS
            && self.max_latency_ms <= LATENCY_BUDGET_MS
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EventTotals {
    proactive: u64,
    reactive: u64,
    drift: u64,
    proactive_resolved: u64,
    proactive_effective: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct MiscalibrationRuns {
    current: u64,
    completed_total: u64,
    completed_runs: u64,
}

impl MiscalibrationRuns {
    fn observe(&mut self, above_threshold: bool) {
        if above_threshold {
            self.current += 1;
        } else if self.current > 0 {
            self.completed_total += self.current;
            self.completed_runs += 1;
            self.current = 0;
        }
    }

    fn average(&self) -> f64 {
        let ongoing = u64::from(self.current > 0);
        let runs = self.completed_runs + ongoing;
        if runs == 0 {
            return 0.0;
        }
        (self.completed_total + self.current) as f64 / runs as f64
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LatencyStats {
    count: u64,
    total_ms: f64,
    max_ms: f64,
}

impl LatencyStats {
    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.total_ms += ms;
        self.max_ms = self.max_ms.max(ms);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// Closed-loop trust-drift controller for one monitored subject.
pub struct TrustDriftFramework {
    config: FrameworkConfig,
    tracker: StateTracker,
    estimator: KalmanEstimator,
    drift: DriftDetector,
    latent: LatentInference,
    forecaster: MultiStepForecaster,
    gate: InterventionGate,
    accuracy: AccuracyTracker,
    events: EventLog,
    sink: Option<Arc<dyn EventSink>>,
    totals: EventTotals,
    runs: MiscalibrationRuns,
    latency: LatencyStats,
    last_forecast: Option<ForecastResult>,
}

impl fmt::Debug for TrustDriftFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustDriftFramework")
            .field("config", &self.config)
            .field("interactions", &self.tracker.interaction_count())
            .field("events", &self.events.len())
            .field("gate", &self.gate.state())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl TrustDriftFramework {
    /// Builds a framework from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is out of range.
    pub fn new(config: FrameworkConfig) -> TrustDriftResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Framework with the default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::build(FrameworkConfig::default())
    }

    fn build(config: FrameworkConfig) -> Self {
        Self {
            tracker: StateTracker::new(config.window_size),
            estimator: KalmanEstimator::new(
                config.dt,
                config.process_noise_std,
                config.measurement_noise_std,
            ),
            drift: DriftDetector::new(
                config.mu_baseline,
                config.sigma_baseline,
                config.epsilon_factor,
                config.h_factor,
            )
            .with_warmup(config.drift_warmup),
            latent: LatentInference::new(config.latent.clone(), config.intervention_threshold),
            forecaster: MultiStepForecaster::new(
                config.intervention_threshold,
                config.intervention_confidence,
                config.kalman_weight,
                config.latent_weight,
            ),
            gate: InterventionGate::new(config.cooldown_steps),
            accuracy: AccuracyTracker::new(config.intervention_threshold),
            events: EventLog::new(config.max_events),
            sink: None,
            totals: EventTotals::default(),
            runs: MiscalibrationRuns::default(),
            latency: LatencyStats::default(),
            last_forecast: None,
            config,
        }
    }

    /// Attaches a sink that receives every event notice.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Runs one full update cycle for an interaction.
    ///
    /// Never fails: out-of-range observations are clamped, missing signals
    /// take defaults and numeric degeneracies are floored.
    pub fn update(
        &mut self,
        user_trust: f64,
        actual_reliability: f64,
        signals: Option<&BehavioralSignals>,
        intervention: Option<f64>,
    ) -> StatusSnapshot {
        let started = Instant::now();
        let control = intervention.filter(|u| u.is_finite()).unwrap_or(0.0);

        let state = self.tracker.update(user_trust, actual_reliability, signals);
        let interaction = self.tracker.interaction_count();
        let threshold = self.config.intervention_threshold;

        self.resolve_previous(state.delta_trust, control != 0.0);

        self.estimator.predict(control);
        self.estimator.update(state.as_measurement());

        let drift = self.drift.update(state.actual_reliability);
        if drift.detected {
            self.recalibrate(&drift, interaction, state.delta_trust);
        }

        let latent = self.latent.infer(self.tracker.last_signals());
        self.latent.update_posterior(&latent, state.delta_trust);

        let mut proactive = false;
        let mut reason = None;
        let mut forecast_payload = None;
        if self.config.enable_predictive && interaction % self.config.forecast_interval as u64 == 0 {
            let forecast = self.forecaster.forecast(
                self.estimator.model(),
                self.estimator.belief(),
                &self.latent,
                &latent,
                self.config.forecast_horizon,
                &[],
            );
            self.accuracy.record(&forecast, self.config.intervention_confidence);
            let decision = self.gate.should_intervene(&forecast);
            if decision.intervene {
                proactive = true;
                self.totals.proactive += 1;
                info!(interaction, reason = %decision.reason, "proactive intervention recommended");
                self.record(CalibrationEvent::new(
                    EventType::Proactive,
                    interaction,
                    state.delta_trust,
                    decision.reason.clone(),
                ));
            }
            reason = Some(decision.reason);
            forecast_payload = Some(forecast.payload());
            self.last_forecast = Some(forecast);
        }

        let reactive = state.delta_trust > threshold && !proactive;
        if reactive {
            self.totals.reactive += 1;
            let why = format!(
                "calibration delta {:.3} exceeds threshold {threshold:.2}",
                state.delta_trust
            );
            self.record(CalibrationEvent::new(
                EventType::Reactive,
                interaction,
                state.delta_trust,
                why.clone(),
            ));
            reason = Some(why);
        }

        self.runs.observe(state.delta_trust > threshold);

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.latency.record(latency_ms);

        debug!(
            interaction,
            delta = state.delta_trust,
            drift_statistic = drift.statistic,
            proactive,
            reactive,
            latency_ms,
            "update cycle complete"
        );

        StatusSnapshot {
            interaction,
            timestamp: state.timestamp,
            state,
            window: self.tracker.compute_statistics(),
            belief: self.estimator.belief().summary(),
            latent,
            drift,
            forecast: forecast_payload,
            intervention: InterventionStatus {
                proactive_recommended: proactive,
                reactive_required: reactive,
                reason: reason.unwrap_or_else(|| "within calibration threshold".to_string()),
                total_proactive: self.totals.proactive,
                total_reactive: self.totals.reactive,
                total_drift_events: self.totals.drift,
                gate: self.gate.state(),
            },
            latency_ms,
        }
    }

    /// Fills in outcomes of the previous interaction's events and scores its forecast.
    fn resolve_previous(&mut self, delta: f64, intervened: bool) {
        let threshold = self.config.intervention_threshold;
        for event in self.events.resolve_pending(delta) {
            if event.event_type == EventType::Proactive {
                self.totals.proactive_resolved += 1;
                if event.delta_after.is_some_and(|d| d <= threshold) {
                    self.totals.proactive_effective += 1;
                }
            }
            if let Some(sink) = &self.sink {
                sink.deliver(EventNotice::Resolved(event));
            }
        }
        self.accuracy.evaluate(delta, intervened);
    }

    fn recalibrate(&mut self, drift: &DriftSignal, interaction: u64, delta: f64) {
        self.estimator.inflate_covariance(DRIFT_COVARIANCE_INFLATION);
        self.drift.recalibrate(self.config.baseline_window);
        self.latent.reset_toward_prior(DRIFT_RETENTION);
        self.totals.drift += 1;

        let (mu, sigma) = self.drift.baseline();
        info!(
            interaction,
            change_point = ?drift.change_point,
            statistic = drift.statistic,
            confidence = drift.confidence,
            new_baseline = mu,
            new_sigma = sigma,
            "reliability drift detected; recalibrated"
        );

        let reason = match drift.change_point {
            Some(cp) => format!(
                "reliability drift since observation {cp} (confidence {:.2})",
                drift.confidence
            ),
            None => format!("reliability drift (confidence {:.2})", drift.confidence),
        };
        self.record(CalibrationEvent::new(
            EventType::DriftDetected,
            interaction,
            delta,
            reason,
        ));
    }

    fn record(&mut self, event: CalibrationEvent) {
        if let Some(sink) = &self.sink {
            sink.deliver(EventNotice::Recorded(event.clone()));
        }
        self.events.push(event);
    }

    /// Aggregated controller health.
    #[must_use]
    pub fn get_metrics(&self) -> FrameworkMetrics {
        let window = self.tracker.compute_statistics();
        let forecast = self.accuracy.summary();
        let intervention_effectiveness = if self.totals.proactive_resolved == 0 {
            1.0
        } else {
            self.totals.proactive_effective as f64 / self.totals.proactive_resolved as f64
        };
        FrameworkMetrics {
            interactions: self.tracker.interaction_count(),
            mean_delta: window.mean,
            delta_variance: window.variance,
            forecast_accuracy: forecast.forecast_accuracy,
            false_positive_rate: forecast.false_alarm_rate,
            forecast,
            intervention_effectiveness,
            avg_miscalibration_duration: self.runs.average(),
            mean_latency_ms: self.latency.mean(),
            max_latency_ms: self.latency.max_ms,
            total_proactive: self.totals.proactive,
            total_reactive: self.totals.reactive,
            total_drift_events: self.totals.drift,
            convergence: self.latent.get_convergence_diagnostic(),
            delta_threshold: self.config.intervention_threshold,
        }
    }

    /// Shorthand for `get_metrics().meets_requirements()`.
    #[must_use]
    pub fn meets_requirements(&self) -> bool {
        self.get_metrics().meets_requirements()
    }

    /// Logged events, oldest first (bounded by `max_events`).
    pub fn events(&self) -> impl Iterator<Item = &CalibrationEvent> {
        self.events.iter()
    }

    /// Number of logged events of one type still held in memory.
    #[must_use]
    pub fn count_events(&self, event_type: EventType) -> usize {
        self.events.iter().filter(|e| e.event_type == event_type).count()
    }

    /// Live estimator belief.
    #[must_use]
    pub fn belief(&self) -> &Belief {
        self.estimator.belief()
    }

    /// Latent regression convergence proxy.
    #[must_use]
    pub fn convergence(&self) -> Convergence {
        self.latent.get_convergence_diagnostic()
    }

    /// Most recent forecast, if any ran.
    #[must_use]
    pub fn last_forecast(&self) -> Option<&ForecastResult> {
        self.last_forecast.as_ref()
    }

    /// The drift detector, for inspecting its baseline and statistic.
    #[must_use]
    pub const fn drift_detector(&self) -> &DriftDetector {
        &self.drift
    }

    /// Latent inference state, including its context posterior.
    #[must_use]
    pub const fn latent(&self) -> &LatentInference {
        &self.latent
    }

    /// Up to `n` most recent reliability observations, oldest first.
    #[must_use]
    pub fn recent_reliability(&self, n: usize) -> Vec<f64> {
        self.tracker.recent_reliability(n)
    }

    /// Configuration this framework was built with.
    #[must_use]
    pub const fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Makes the intervention gate ready immediately.
    pub fn reset_cooldown(&mut self) {
        self.gate.reset_cooldown();
    }
}
