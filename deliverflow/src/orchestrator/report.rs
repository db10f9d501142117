//! Run bookkeeping and the values returned to callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::progress::{ProgressSink, StageProgress, StageStatus};
use crate::cancellation::CancellationToken;
use crate::catalog::DeliverableId;
use crate::store::DeliverablePointer;

/// Ephemeral state of one run. Never persisted; dropped when the call that
/// created it returns.
pub(crate) struct RunContext<'a> {
    pub(crate) project_id: String,
    pub(crate) run_id: String,
    pub(crate) cancel: &'a CancellationToken,
    sink: &'a dyn ProgressSink,
    stages: Vec<StageProgress>,
}

impl<'a> RunContext<'a> {
    pub(crate) fn new(
        project_id: &str,
        run_id: String,
        cancel: &'a CancellationToken,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            project_id: project_id.to_string(),
            run_id,
            cancel,
            sink,
            stages: Vec::new(),
        }
    }

    /// Forwards a transition to the sink and keeps the latest per stage.
    pub(crate) fn report(&mut self, progress: StageProgress) {
        self.sink.try_report(&progress);
        match self
            .stages
            .iter_mut()
            .find(|p| p.deliverable == progress.deliverable)
        {
            Some(slot) => *slot = progress,
            None => self.stages.push(progress),
        }
    }

    pub(crate) fn status(&mut self, deliverable: DeliverableId, status: StageStatus) {
        self.report(StageProgress::new(deliverable, status));
    }

    pub(crate) fn finish(self, outcome: RunOutcome) -> RunReport {
        RunReport {
            run_id: self.run_id,
            outcome,
            stages: self.stages,
        }
    }
}

/// How a run ended without an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage in the execution set completed.
    Completed,
    /// The caller cancelled the run between transitions.
    Cancelled {
        /// The first cancellation reason.
        reason: String,
    },
}

/// Summary of a run or regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// The run id artifacts were written under.
    pub run_id: String,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Last reported state of every stage that started, in execution order.
    pub stages: Vec<StageProgress>,
}

impl RunReport {
    /// True when the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Stages that reached `complete`, in execution order.
    #[must_use]
    pub fn completed(&self) -> Vec<DeliverableId> {
        self.stages
            .iter()
            .filter(|p| p.status == StageStatus::Complete)
            .map(|p| p.deliverable)
            .collect()
    }
}

/// Options for selective regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerateOptions {
    /// Also regenerate every transitive dependent.
    #[serde(default)]
    pub cascade: bool,
    /// Re-apply manually edited fields on top of the fresh content.
    #[serde(default)]
    pub preserve_edits: bool,
}

impl RegenerateOptions {
    /// Regenerates only the named deliverable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables cascading.
    #[must_use]
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    /// Enables edit preservation.
    #[must_use]
    pub fn with_preserve_edits(mut self, preserve: bool) -> Self {
        self.preserve_edits = preserve;
        self
    }
}

/// Pointer map of a project plus the pointers that rotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    /// Project id.
    pub project_id: String,
    /// Current run id.
    pub run_id: String,
    /// Current pointer per deliverable.
    pub pointers: BTreeMap<DeliverableId, DeliverablePointer>,
    /// Deliverables whose artifact could not be read.
    pub rotted: Vec<DeliverableId>,
}

impl ProjectStatus {
    /// Deliverables in `order` that lack a validated pointer.
    #[must_use]
    pub fn needs_regeneration(&self, order: &[DeliverableId]) -> Vec<DeliverableId> {
        order
            .iter()
            .copied()
            .filter(|id| !self.pointers.get(id).is_some_and(|p| p.validated))
            .collect()
    }
}
