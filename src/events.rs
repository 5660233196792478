//! Calibration events and their outbound delivery.
//!
//! Events are appended by the framework and never mutated afterwards, except
//! that `delta_after` and `effectiveness` are filled in once the following
//! interaction reveals the outcome. Persistence lives outside this crate; an
//! [`EventSink`] receives every event when it is recorded and again when it
//! is resolved.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a calibration event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an event was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Current delta already exceeds the threshold.
    Reactive,
    /// The forecast predicts the threshold will be crossed.
    Proactive,
    /// The reliability stream changed regime.
    DriftDetected,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reactive => write!(f, "reactive"),
            Self::Proactive => write!(f, "proactive"),
            Self::DriftDetected => write!(f, "drift_detected"),
        }
    }
}

/// Corrective action recommended to the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    /// Surface a calibration prompt for the miscalibration that is already present.
    CalibrationPrompt,
    /// Adjust communicated confidence ahead of a predicted miscalibration.
    ConfidenceAdjustment,
    /// Internal model recalibration after drift.
    Recalibration,
}

impl EventType {
    /// Default corrective action for an event type.
    #[must_use]
    pub const fn intervention(self) -> InterventionType {
        match self {
            Self::Reactive => InterventionType::CalibrationPrompt,
            Self::Proactive => InterventionType::ConfidenceAdjustment,
            Self::DriftDetected => InterventionType::Recalibration,
        }
    }
}

/// One logged calibration event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEvent {
    /// Unique id.
    pub id: EventId,
    /// Wall-clock time the event was raised.
    pub timestamp: DateTime<Utc>,
    /// Interaction number at which the event was raised.
    pub interaction: u64,
    /// Why the event was raised.
    pub event_type: EventType,
    /// Calibration delta when the event was raised.
    pub delta_before: f64,
    /// Calibration delta observed on the following interaction.
    #[serde(default)]
    pub delta_after: Option<f64>,
    /// Recommended corrective action.
    pub intervention_type: InterventionType,
    /// Relative reduction of the delta, in [-1, 1].
    #[serde(default)]
    pub effectiveness: Option<f64>,
    /// Human-readable justification.
    pub reason: String,
}

impl CalibrationEvent {
    /// Creates an unresolved event stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, interaction: u64, delta_before: f64, reason: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            interaction,
            event_type,
            delta_before,
            delta_after: None,
            intervention_type: event_type.intervention(),
            effectiveness: None,
            reason: reason.into(),
        }
    }

    /// Whether the outcome has been filled in.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.delta_after.is_some()
    }

    /// Fills in the outcome. Only the first call has an effect.
    pub fn resolve(&mut self, delta_after: f64) {
        if self.delta_after.is_some() {
            return;
        }
        self.delta_after = Some(delta_after);
        let reduction = (self.delta_before - delta_after) / self.delta_before.max(1e-6);
        self.effectiveness = Some(reduction.clamp(-1.0, 1.0));
    }
}

/// Lifecycle notification delivered to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", content = "event", rename_all = "snake_case")]
pub enum EventNotice {
    /// The event was just raised.
    Recorded(CalibrationEvent),
    /// The event's outcome was filled in.
    Resolved(CalibrationEvent),
}

/// Receiver of calibration events, typically a persistence adapter.
///
/// Called synchronously from the update cycle, so implementations must not block.
pub trait EventSink: Send + Sync {
    /// Accepts one notice without blocking.
    fn deliver(&self, notice: EventNotice);
}

/// Sink backed by a bounded channel; full queues drop notices.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: Sender<EventNotice>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Creates the sink and the receiving end for the consumer.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<EventNotice>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Notices lost to a full or disconnected queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn deliver(&self, notice: EventNotice) {
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Bounded in-memory event log with FIFO eviction.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    events: VecDeque<CalibrationEvent>,
}

impl EventLog {
    /// Creates an empty log holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Appends an event, evicting the oldest one when full.
    pub fn push(&mut self, event: CalibrationEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Resolves every unresolved event, returning the newly resolved ones.
    pub fn resolve_pending(&mut self, delta_after: f64) -> Vec<CalibrationEvent> {
        let mut resolved = Vec::new();
        // Only the tail can be unresolved: events resolve on the next interaction.
        for event in self.events.iter_mut().rev() {
            if event.is_resolved() {
                break;
            }
            event.resolve(delta_after);
            resolved.push(event.clone());
        }
        resolved.reverse();
        resolved
    }

    /// Events oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &CalibrationEvent> {
        self.events.iter()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
