//! One-sided CUSUM change detection on the reliability stream.
//!
//! The detector watches for a sustained drop of actual reliability below its
//! baseline:
//!
//! ```text
//! S_t = max(0, S_{t-1} + (mu - R_t) - epsilon)
//! ```
//!
//! and declares drift once `S_t > h`. Both `epsilon` and `h` scale with the
//! baseline standard deviation. The reported change point is an
//! approximation: the observation at which the current unbroken ascent of
//! the statistic began, not a posterior estimate.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const HISTORY_CAPACITY: usize = 100;
const SIGMA_FLOOR: f64 = 1e-3;

/// Output of one detector update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    /// Current cumulative-sum statistic.
    pub statistic: f64,
    /// Whether the statistic exceeded the threshold on this update.
    pub detected: bool,
    /// 1-based observation index where the current ascent started.
    pub change_point: Option<u64>,
    /// In [0, 1]; grows with how far the statistic exceeds the threshold.
    pub confidence: f64,
}

impl DriftSignal {
    const fn quiet(statistic: f64) -> Self {
        Self {
            statistic,
            detected: false,
            change_point: None,
            confidence: 0.0,
        }
    }
}

/// CUSUM detector with adaptive threshold.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    mu: f64,
    sigma: f64,
    epsilon_factor: f64,
    h_factor: f64,
    warmup: usize,
    statistic: f64,
    ascent_start: Option<u64>,
    observations: u64,
    history: VecDeque<f64>,
}

impl DriftDetector {
    /// Creates a detector with a prior baseline.
    #[must_use]
    pub fn new(mu_baseline: f64, sigma_baseline: f64, epsilon_factor: f64, h_factor: f64) -> Self {
        Self {
            mu: mu_baseline,
            sigma: sigma_baseline.max(SIGMA_FLOOR),
            epsilon_factor,
            h_factor,
            warmup: 0,
            statistic: 0.0,
            ascent_start: None,
            observations: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Number of initial observations that only seed history.
    #[must_use]
    pub const fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    /// Slack subtracted from every increment.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon_factor * self.sigma
    }

    /// Decision threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.h_factor * self.sigma
    }

    /// Feeds one reliability observation.
    pub fn update(&mut self, reliability: f64) -> DriftSignal {
        self.observations += 1;
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(reliability);

        if self.observations <= self.warmup as u64 {
            return DriftSignal::quiet(self.statistic);
        }

        let increment = (self.mu - reliability) - self.epsilon();
        let next = (self.statistic + increment).max(0.0);
        if next <= 0.0 {
            self.ascent_start = None;
        } else if self.statistic <= 0.0 || self.ascent_start.is_none() {
            self.ascent_start = Some(self.observations);
        }
        self.statistic = next;

        let h = self.threshold();
        if self.statistic > h {
            DriftSignal {
                statistic: self.statistic,
                detected: true,
                change_point: self.ascent_start,
                confidence: (self.statistic / (2.0 * h)).min(1.0),
            }
        } else {
            DriftSignal::quiet(self.statistic)
        }
    }

    /// Zeroes the statistic; the baseline is kept.
    pub fn reset(&mut self) {
        self.statistic = 0.0;
        self.ascent_start = None;
    }

    /// Re-estimates the baseline from the latest `window` observations and resets.
    ///
    /// With fewer than two observations only the reset happens.
    pub fn recalibrate(&mut self, window: usize) {
        let skip = self.history.len().saturating_sub(window);
        let recent: Vec<f64> = self.history.iter().skip(skip).copied().collect();
        if recent.len() >= 2 {
            let n = recent.len() as f64;
            let mean = recent.iter().sum::<f64>() / n;
            let var = recent.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
            self.mu = mean;
            self.sigma = var.sqrt().max(SIGMA_FLOOR);
        }
        self.reset();
    }

    /// Current cumulative-sum statistic.
    #[must_use]
    pub const fn statistic(&self) -> f64 {
        self.statistic
    }

    /// Baseline `(mean, std)` in use.
    #[must_use]
    pub const fn baseline(&self) -> (f64, f64) {
        (self.mu, self.sigma)
    }

    /// Observations seen since construction, warm-up included.
    #[must_use]
    pub const fn observations(&self) -> u64 {
        self.observations
    }
}
