//! Realized-versus-predicted bookkeeping for 1-step forecasts.

use serde::{Deserialize, Serialize};

use super::{ForecastResult, PredictionInterval};

/// Percentage errors divide by at least this, so near-perfect calibration
/// does not explode MAPE.
const PERCENT_DENOMINATOR_FLOOR: f64 = 0.05;

/// Target ceiling for mean absolute percentage error.
pub const TARGET_MAPE: f64 = 15.0;
/// Target floor for forecast accuracy.
pub const TARGET_ACCURACY: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingPrediction {
    mean: f64,
    std: f64,
    interval: PredictionInterval,
    predicted_exceedance: bool,
}

/// Outcome of comparing one realized delta with its prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastEvaluation {
    /// Predicted 1-step delta mean.
    pub predicted: f64,
    /// Delta actually observed.
    pub realized: f64,
    /// `|realized - predicted|`.
    pub absolute_error: f64,
    /// Absolute error as a percentage of the (floored) realized delta.
    pub percentage_error: f64,
    /// Whether the realized delta fell inside the 95% interval.
    pub covered: bool,
    /// `(realized - predicted) / std`.
    pub standardized_residual: f64,
    /// Exceedance was predicted, did not happen, and nothing intervened.
    pub false_alarm: bool,
}

/// Aggregate accuracy over all evaluated forecasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    /// Number of evaluated forecasts.
    pub evaluations: u64,
    /// Mean absolute error.
    pub mae: f64,
    /// Mean absolute percentage error.
    pub mape: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// `clamp(1 - MAPE/100, 0, 1)`; 0 before any evaluation.
    pub forecast_accuracy: f64,
    /// Share of realized values inside their 95% interval.
    pub coverage: f64,
    /// Mean standardized residual; near 0 when the forecasts are unbiased.
    pub mean_standardized_residual: f64,
    /// Share of evaluations that were false alarms.
    pub false_alarm_rate: f64,
}

impl AccuracySummary {
    /// MAPE and accuracy both within target.
    #[must_use]
    pub fn meets_targets(&self) -> bool {
        self.evaluations > 0 && self.mape <= TARGET_MAPE && self.forecast_accuracy >= TARGET_ACCURACY
    }
}

/// Tracks the latest 1-step prediction and running error sums.
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    threshold: f64,
    pending: Option<PendingPrediction>,
    evaluations: u64,
    sum_abs: f64,
    sum_pct: f64,
    sum_sq: f64,
    covered: u64,
    sum_z: f64,
    false_alarms: u64,
}

impl AccuracyTracker {
    /// `threshold` is the miscalibration level used to judge false alarms.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self {
            threshold,
            pending: None,
            evaluations: 0,
            sum_abs: 0.0,
            sum_pct: 0.0,
            sum_sq: 0.0,
            covered: 0,
            sum_z: 0.0,
            false_alarms: 0,
        }
    }

    /// Remembers the 1-step prediction of `forecast`, replacing any older one.
    pub fn record(&mut self, forecast: &ForecastResult, confidence_threshold: f64) {
        let Some((mean, std)) = forecast.one_step() else {
            return;
        };
        let Some(interval) = forecast.get_prediction_intervals(0.05).first().copied() else {
            return;
        };
        let predicted_exceedance = forecast
            .miscalibration_probs
            .first()
            .is_some_and(|p| *p > confidence_threshold);
        self.pending = Some(PendingPrediction {
            mean,
            std,
            interval,
            predicted_exceedance,
        });
    }

    /// Whether a prediction is waiting for its outcome.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Scores the pending prediction against `realized`, consuming it.
    pub fn evaluate(&mut self, realized: f64, intervened: bool) -> Option<ForecastEvaluation> {
        let p = self.pending.take()?;
        let absolute_error = (realized - p.mean).abs();
        let percentage_error = 100.0 * absolute_error / realized.abs().max(PERCENT_DENOMINATOR_FLOOR);
        let covered = p.interval.contains(realized);
        let standardized_residual = (realized - p.mean) / p.std.max(1e-6);
        let false_alarm = p.predicted_exceedance && realized <= self.threshold && !intervened;

        self.evaluations += 1;
        self.sum_abs += absolute_error;
        self.sum_pct += percentage_error;
        self.sum_sq += absolute_error * absolute_error;
        self.sum_z += standardized_residual;
        if covered {
            self.covered += 1;
        }
        if false_alarm {
            self.false_alarms += 1;
        }

        Some(ForecastEvaluation {
            predicted: p.mean,
            realized,
            absolute_error,
            percentage_error,
            covered,
            standardized_residual,
            false_alarm,
        })
    }

    /// Aggregates every evaluation so far.
    #[must_use]
    pub fn summary(&self) -> AccuracySummary {
        if self.evaluations == 0 {
            return AccuracySummary::default();
        }
        let n = self.evaluations as f64;
        let mape = self.sum_pct / n;
        AccuracySummary {
            evaluations: self.evaluations,
            mae: self.sum_abs / n,
            mape,
            rmse: (self.sum_sq / n).sqrt(),
            forecast_accuracy: (1.0 - mape / 100.0).clamp(0.0, 1.0),
            coverage: self.covered as f64 / n,
            mean_standardized_residual: self.sum_z / n,
            false_alarm_rate: self.false_alarms as f64 / n,
        }
    }
}
