//! Offline replay of recorded interaction streams.
//!
//! Input is JSON Lines, one [`ReplayRecord`] per line. Every record is fed
//! through a [`SubjectRegistry`] and the resulting snapshot is written as one
//! JSON line tagged with its subject. Blank lines are ignored.
//!
//! ```text
//! {"subject":"u1","user_trust":0.9,"actual_reliability":0.6,"signals":{"dwell_time":12.0}}
//! {"user_trust":0.7,"actual_reliability":0.7,"intervention":1.0}
//! ```

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{TrustDriftError, TrustDriftResult};
use crate::framework::{FrameworkMetrics, StatusSnapshot};
use crate::registry::SubjectRegistry;
use crate::signals::BehavioralSignals;

/// Subject used for records that do not name one.
pub const DEFAULT_SUBJECT: &str = "default";

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Subject key; [`DEFAULT_SUBJECT`] when absent.
    #[serde(default)]
    pub subject: Option<String>,
    /// Stated or inferred user trust.
    pub user_trust: f64,
    /// Observed reliability of the assistant.
    pub actual_reliability: f64,
    /// Behavioral signals for this interaction.
    #[serde(default)]
    pub signals: Option<BehavioralSignals>,
    /// Intervention control applied, if any.
    #[serde(default)]
    pub intervention: Option<f64>,
}

/// Output line for one replayed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLine {
    /// Subject the snapshot belongs to.
    pub subject: String,
    /// Snapshot fields, inlined.
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
}

/// Trailing per-subject metrics line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsLine {
    /// Subject the metrics belong to.
    pub subject: String,
    /// Whether every operational target is met.
    pub meets_requirements: bool,
    /// Metrics of the subject.
    pub metrics: FrameworkMetrics,
}

/// Counts from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Records replayed.
    pub records: u64,
    /// Distinct subjects seen.
    pub subjects: usize,
    /// Records that produced a proactive recommendation.
    pub proactive: u64,
    /// Records that required a reactive intervention.
    pub reactive: u64,
}

/// Replays every record from `reader`, writing snapshots to `writer`.
///
/// With `emit_metrics` a [`MetricsLine`] per subject follows the snapshots.
///
/// # Errors
///
/// Fails on I/O errors, on the first malformed line (reported with its
/// 1-based line number) and on poisoned registry locks.
pub fn replay<R: BufRead, W: Write>(
    registry: &SubjectRegistry,
    reader: R,
    mut writer: W,
    emit_metrics: bool,
) -> TrustDriftResult<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line).map_err(|e| {
            TrustDriftError::Serialization {
                message: format!("line {}: {e}", idx + 1),
            }
        })?;

        let subject = record.subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let snapshot = registry.update(
            &subject,
            record.user_trust,
            record.actual_reliability,
            record.signals.as_ref(),
            record.intervention,
        )?;
        summary.records += 1;
        if snapshot.intervention.proactive_recommended {
            summary.proactive += 1;
        }
        if snapshot.intervention.reactive_required {
            summary.reactive += 1;
        }

        serde_json::to_writer(&mut writer, &ReplayLine { subject, snapshot })?;
        writer.write_all(b"\n")?;
    }

    let subjects = registry.subjects()?;
    summary.subjects = subjects.len();

    if emit_metrics {
        for subject in subjects {
            let Some(metrics) = registry.metrics(&subject)? else {
                continue;
            };
            let line = MetricsLine {
                subject,
                meets_requirements: metrics.meets_requirements(),
                metrics,
            };
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;

    info!(
        records = summary.records,
        subjects = summary.subjects,
        proactive = summary.proactive,
        reactive = summary.reactive,
        "replay finished"
    );
    Ok(summary)
}
