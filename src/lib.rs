//! # trustdrift - Predictive Trust-Drift Estimation and Intervention
//!
//! trustdrift watches how much a user trusts an automated assistant and how
//! reliable that assistant actually is, and intervenes before the gap between
//! the two grows harmful.
//!
//! ## Core Concepts
//!
//! - **Calibration delta**: `|user_trust - actual_reliability|`, the quantity being controlled
//! - **Estimator**: a Kalman filter over (trust, reliability, delta) with forecasting
//! - **Drift detector**: a one-sided CUSUM on reliability that recalibrates on regime change
//! - **Latent inference**: Beta posteriors over hidden factors plus a Bayesian delta regression
//! - **Forecaster + gate**: multi-step miscalibration risk with a cooldown on proactive alarms
//!
//! ## Usage
//!
//! ```rust
//! use trustdrift::{BehavioralSignals, TrustDriftFramework};
//!
//! let mut fw = TrustDriftFramework::with_defaults();
//! let signals = BehavioralSignals::new().with("reliance_ratio", 0.9);
//! let snapshot = fw.update(0.9, 0.6, Some(&signals), None);
//! assert!(snapshot.intervention.reactive_required);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod drift;
pub mod error;
pub mod estimator;
pub mod events;
pub mod forecast;
pub mod framework;
pub mod gate;
pub mod latent;
pub mod registry;
pub mod replay;
pub mod signals;
pub mod state;

// Re-export primary types at crate root for convenience
pub use config::{FrameworkConfig, LatentConfig, MAX_FORECAST_HORIZON};
pub use drift::{DriftDetector, DriftSignal};
pub use error::{TrustDriftError, TrustDriftResult, ValidationError};
pub use estimator::{Belief, BeliefSummary, KalmanEstimator, StateModel};
pub use events::{
    CalibrationEvent, ChannelEventSink, EventId, EventLog, EventNotice, EventSink, EventType,
    InterventionType,
};
pub use forecast::{
    AccuracySummary, AccuracyTracker, ForecastPayload, ForecastResult, MultiStepForecaster,
    PredictionInterval,
};
pub use framework::{FrameworkMetrics, InterventionStatus, StatusSnapshot, TrustDriftFramework};
pub use gate::{GateDecision, GateState, InterventionGate};
pub use latent::{BetaPosterior, Convergence, LatentInference, LatentVariables};
pub use registry::SubjectRegistry;
pub use signals::BehavioralSignals;
pub use state::{Observation, StateTracker, TrustState, WindowStatistics};
