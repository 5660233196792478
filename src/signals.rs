//! Behavioral telemetry forwarded alongside an observation.
//!
//! Signals arrive as a loose name/value map from the ingestion layer. Missing
//! or non-finite entries fall back to documented defaults; nothing here fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Names of the recognised behavioral signals.
pub mod names {
    /// Seconds spent on the AI output before acting.
    pub const DWELL_TIME: &str = "dwell_time";
    /// Fraction of AI suggestions accepted without edits.
    pub const RELIANCE_RATIO: &str = "reliance_ratio";
    /// Normalised complexity of the user's query.
    pub const QUERY_COMPLEXITY: &str = "query_complexity";
    /// Interactions per minute.
    pub const INTERACTION_FREQUENCY: &str = "interaction_frequency";
    /// Fraction of AI suggestions the user overrode.
    pub const OVERRIDE_RATE: &str = "override_rate";
}

/// Default dwell time in seconds.
pub const DEFAULT_DWELL_TIME: f64 = 30.0;
/// Default reliance ratio.
pub const DEFAULT_RELIANCE_RATIO: f64 = 0.5;
/// Default query complexity.
pub const DEFAULT_QUERY_COMPLEXITY: f64 = 0.5;
/// Default interactions per minute.
pub const DEFAULT_INTERACTION_FREQUENCY: f64 = 1.0;
/// Default override rate.
pub const DEFAULT_OVERRIDE_RATE: f64 = 0.0;

/// Optional behavioral signals keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehavioralSignals(HashMap<String, f64>);

impl BehavioralSignals {
    /// Creates an empty signal map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Inserts or replaces a signal.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Raw value of a signal, if present and finite.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied().filter(|v| v.is_finite())
    }

    /// Value of a signal or the supplied default.
    #[must_use]
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Seconds spent on the response; never negative.
    pub fn dwell_time(&self) -> f64 {
        self.get_or(names::DWELL_TIME, DEFAULT_DWELL_TIME).max(0.0)
    }

    /// Share of suggestions accepted, in [0, 1].
    pub fn reliance_ratio(&self) -> f64 {
        self.get_or(names::RELIANCE_RATIO, DEFAULT_RELIANCE_RATIO)
            .clamp(0.0, 1.0)
    }

    /// Query complexity in [0, 1].
    pub fn query_complexity(&self) -> f64 {
        self.get_or(names::QUERY_COMPLEXITY, DEFAULT_QUERY_COMPLEXITY)
            .clamp(0.0, 1.0)
    }

    /// Interactions per minute; never negative.
    pub fn interaction_frequency(&self) -> f64 {
        self.get_or(names::INTERACTION_FREQUENCY, DEFAULT_INTERACTION_FREQUENCY)
            .max(0.0)
    }

    /// Share of suggestions overridden, in [0, 1].
    pub fn override_rate(&self) -> f64 {
        self.get_or(names::OVERRIDE_RATE, DEFAULT_OVERRIDE_RATE)
            .clamp(0.0, 1.0)
    }

    /// Number of entries, including unrecognised ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no signals were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, f64>> for BehavioralSignals {
    fn from(map: HashMap<String, f64>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for BehavioralSignals {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
