//! Stage progress reporting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

use crate::catalog::DeliverableId;

/// State of one stage's generate/validate/repair machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for its turn.
    Pending,
    /// Calling the generator.
    Generating,
    /// Checking the candidate.
    Validating,
    /// Regenerating after a failed validation.
    Repairing,
    /// Content persisted and current.
    Complete,
    /// The stage failed and halted the run.
    Error,
}

impl StageStatus {
    /// Returns true for statuses that end the stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generating => write!(f, "generating"),
            Self::Validating => write!(f, "validating"),
            Self::Repairing => write!(f, "repairing"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One stage-state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// The stage.
    pub deliverable: DeliverableId,
    /// Its new status.
    pub status: StageStatus,
    /// Attempt about to run, on repairing transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_attempt: Option<usize>,
    /// Attempt bound, on repairing transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_repair_attempts: Option<usize>,
    /// Error text, on error transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageProgress {
    /// A plain transition.
    #[must_use]
    pub fn new(deliverable: DeliverableId, status: StageStatus) -> Self {
        Self {
            deliverable,
            status,
            repair_attempt: None,
            max_repair_attempts: None,
            message: None,
        }
    }

    /// A repairing transition.
    #[must_use]
    pub fn repairing(deliverable: DeliverableId, attempt: usize, max_attempts: usize) -> Self {
        Self {
            repair_attempt: Some(attempt),
            max_repair_attempts: Some(max_attempts),
            ..Self::new(deliverable, StageStatus::Repairing)
        }
    }

    /// An error transition.
    #[must_use]
    pub fn error(deliverable: DeliverableId, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(deliverable, StageStatus::Error)
        }
    }
}

/// Receives stage transitions.
///
/// `try_report` is fire-and-forget: it must not block and must not fail.
pub trait ProgressSink: Send + Sync {
    /// Delivers one transition.
    fn try_report(&self, progress: &StageProgress);
}

/// Discards every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn try_report(&self, _progress: &StageProgress) {}
}

/// Logs transitions through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ProgressSink for LoggingProgressSink {
    fn try_report(&self, progress: &StageProgress) {
        if self.level == Level::DEBUG {
            debug!(
                deliverable = %progress.deliverable,
                status = %progress.status,
                repair_attempt = ?progress.repair_attempt,
                "Stage progress"
            );
        } else {
            info!(
                deliverable = %progress.deliverable,
                status = %progress.status,
                repair_attempt = ?progress.repair_attempt,
                "Stage progress"
            );
        }
    }
}

/// Records transitions in memory.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    records: RwLock<Vec<StageProgress>>,
}

impl CollectingProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transition recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<StageProgress> {
        self.records.read().clone()
    }

    /// Statuses reported for one deliverable, in order.
    #[must_use]
    pub fn statuses_for(&self, deliverable: DeliverableId) -> Vec<StageStatus> {
        self.records
            .read()
            .iter()
            .filter(|p| p.deliverable == deliverable)
            .map(|p| p.status)
            .collect()
    }

    /// Deliverables that reached `status`, in the order they reached it.
    #[must_use]
    pub fn deliverables_with(&self, status: StageStatus) -> Vec<DeliverableId> {
        self.records
            .read()
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.deliverable)
            .collect()
    }

    /// Number of transitions recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drops every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl ProgressSink for CollectingProgressSink {
    fn try_report(&self, progress: &StageProgress) {
        self.records.write().push(progress.clone());
    }
}

/// Forwards transitions over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<StageProgress>,
}

impl ChannelProgressSink {
    /// Creates a sink and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StageProgress>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn try_report(&self, progress: &StageProgress) {
        if self.sender.send(progress.clone()).is_err() {
            debug!(deliverable = %progress.deliverable, "Progress receiver dropped");
        }
    }
}
