//! The orchestrator: runs, selective regeneration and manual edits.
//!
//! A run rotates the project's run id, then walks the catalog in topological
//! order. Each stage goes through
//! `pending → generating → validating → {complete | repairing}`, with repairs
//! bounded by [`OrchestratorConfig::max_repair_attempts`]. Stages run strictly
//! one at a time; a second run for the same project fails fast while one is
//! in flight.

mod config;
mod progress;
mod report;
mod stage;


pub use config::{OrchestratorConfig, ENV_GENERATION_TIMEOUT_SECS, ENV_MAX_REPAIR_ATTEMPTS};
pub use progress::{
    ChannelProgressSink, CollectingProgressSink, LoggingProgressSink, NoOpProgressSink,
    ProgressSink, StageProgress, StageStatus,
};
pub use report::{ProjectStatus, RegenerateOptions, RunOutcome, RunReport};

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn, Instrument};

use crate::cancellation::CancellationToken;
use crate::catalog::{Catalog, DeliverableId};
use crate::edits::{EditPatch, EditSnapshot};
use crate::errors::{CatalogError, DeliverflowError, Result, StoreIntegrityError};
use crate::generation::Generator;
use crate::observability::run_span;
use crate::readiness::ReadinessPolicy;
use crate::store::{DeliverablePointer, DeliverableStore};
use crate::validation::{ValidationResult, Validator};
use report::RunContext;

/// Drives deliverable generation for projects held in a [`DeliverableStore`].
pub struct Orchestrator {
    store: Arc<DeliverableStore>,
    generator: Arc<dyn Generator>,
    validator: Arc<dyn Validator>,
    catalog: Catalog,
    readiness: ReadinessPolicy,
    config: OrchestratorConfig,
    progress: Arc<dyn ProgressSink>,
    active_runs: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("catalog", &self.catalog.topological_order())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over the standard catalog and readiness
    /// policy.
    #[must_use]
    pub fn new(
        store: Arc<DeliverableStore>,
        generator: Arc<dyn Generator>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            store,
            generator,
            validator,
            catalog: Catalog::standard(),
            readiness: ReadinessPolicy::standard(),
            config: OrchestratorConfig::default(),
            progress: Arc::new(NoOpProgressSink),
            active_runs: DashMap::new(),
        }
    }

    /// Replaces the catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the readiness policy.
    #[must_use]
    pub fn with_readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Replaces the configuration. Checked when a run starts.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the progress sink.
    #[must_use]
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// The catalog in use.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The store in use.
    #[must_use]
    pub fn store(&self) -> &Arc<DeliverableStore> {
        &self.store
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn acquire_run(&self, project_id: &str) -> Result<OwnedMutexGuard<()>> {
        // The entry guard holds the map shard until the lock is taken, so a
        // concurrent removal cannot hand out a second mutex.
        let entry = self.active_runs.entry(project_id.to_string()).or_default();
        entry
            .value()
            .clone()
            .try_lock_owned()
            .map_err(|_| DeliverflowError::RunInProgress(project_id.to_string()))
    }

    /// Runs the whole catalog for a project under a fresh run id.
    ///
    /// Cancellation yields `Ok` with a cancelled outcome; every other failure
    /// halts the run and is returned as an error. Pointers made current
    /// before the failure are kept.
    pub async fn run(&self, project_id: &str, cancel: &CancellationToken) -> Result<RunReport> {
        self.config.validate()?;
        let _guard = self.acquire_run(project_id)?;

        let run_id = self.store.start_new_run(project_id).await?;
        let stages = self.catalog.topological_order().to_vec();
        info!(project_id, %run_id, stages = stages.len(), "Run started");

        let span = run_span(project_id, &run_id, "run");
        let ctx = RunContext::new(project_id, run_id, cancel, self.progress.as_ref());
        self.execute(ctx, &stages, BTreeMap::new()).instrument(span).await
    }

    /// Regenerates one deliverable, and with `cascade` everything that
    /// transitively depends on it, under the project's current run id.
    /// Deliverables outside the execution set are not touched.
    pub async fn regenerate(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
        options: RegenerateOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        self.config.validate()?;
        if !self.catalog.contains(deliverable) {
            return Err(CatalogError::UnknownDeliverable(deliverable).into());
        }
        let _guard = self.acquire_run(project_id)?;

        let project = self.store.require_project(project_id).await?;
        let stages = self.catalog.execution_set(deliverable, options.cascade);
        let snapshots = if options.preserve_edits {
            self.capture_edits(project_id, &stages).await?
        } else {
            BTreeMap::new()
        };
        info!(
            project_id,
            deliverable = %deliverable,
            cascade = options.cascade,
            preserve_edits = options.preserve_edits,
            stages = stages.len(),
            "Regeneration started"
        );

        let span = run_span(project_id, &project.run_id, "regenerate");
        let ctx = RunContext::new(project_id, project.run_id, cancel, self.progress.as_ref());
        self.execute(ctx, &stages, snapshots).instrument(span).await
    }

    async fn capture_edits(
        &self,
        project_id: &str,
        stages: &[DeliverableId],
    ) -> Result<BTreeMap<DeliverableId, EditSnapshot>> {
        let mut snapshots = BTreeMap::new();
        for &deliverable in stages {
            if !self.catalog.entry(deliverable).is_some_and(|e| e.tracks_edits) {
                continue;
            }
            if let Some((_, artifact)) = self.store.read_current(project_id, deliverable).await? {
                let snapshot = EditSnapshot::capture(&artifact.content);
                if !snapshot.is_empty() {
                    snapshots.insert(deliverable, snapshot);
                }
            }
        }
        Ok(snapshots)
    }

    async fn execute(
        &self,
        mut ctx: RunContext<'_>,
        stages: &[DeliverableId],
        snapshots: BTreeMap<DeliverableId, EditSnapshot>,
    ) -> Result<RunReport> {
        for &deliverable in stages {
            if let Some(reason) = ctx.cancel.reason() {
                return Ok(Self::cancelled(ctx, reason));
            }
            match self.run_stage(&mut ctx, deliverable, snapshots.get(&deliverable)).await {
                Ok(()) => {}
                Err(DeliverflowError::Cancelled(reason)) => return Ok(Self::cancelled(ctx, reason)),
                Err(e) => {
                    warn!(
                        project_id = %ctx.project_id,
                        run_id = %ctx.run_id,
                        deliverable = %deliverable,
                        code = e.code(),
                        error = %e,
                        "Run halted"
                    );
                    return Err(e);
                }
            }
        }

        info!(project_id = %ctx.project_id, run_id = %ctx.run_id, "Run completed");
        Ok(ctx.finish(RunOutcome::Completed))
    }

    fn cancelled(ctx: RunContext<'_>, reason: String) -> RunReport {
        info!(project_id = %ctx.project_id, run_id = %ctx.run_id, %reason, "Run cancelled");
        ctx.finish(RunOutcome::Cancelled { reason })
    }

    /// Applies a manual edit to the current content of a deliverable. The
    /// pointer becomes unvalidated until the deliverable is revalidated or
    /// regenerated.
    pub async fn apply_edit(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
        patch: EditPatch,
    ) -> Result<DeliverablePointer> {
        let entry = self
            .catalog
            .entry(deliverable)
            .ok_or(CatalogError::UnknownDeliverable(deliverable))?;
        if !entry.tracks_edits {
            return Err(DeliverflowError::InvalidEdit(format!(
                "'{deliverable}' does not accept manual edits"
            )));
        }

        let pointer = self
            .store
            .edit_current(project_id, deliverable, |content| patch.apply(content))
            .await?;
        info!(project_id, deliverable = %deliverable, field = %patch.field, "Manual edit applied");
        Ok(pointer)
    }

    /// Re-runs the validator on the current content against its siblings and
    /// records the verdict without changing content.
    pub async fn revalidate(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
    ) -> Result<ValidationResult> {
        let project = self.store.require_project(project_id).await?;
        let Some(pointer) = project.pointer(deliverable) else {
            return Err(DeliverflowError::NoCurrentArtifact {
                project_id: project_id.to_string(),
                deliverable,
            });
        };
        let Some(artifact) = self
            .store
            .artifacts()
            .read_artifact(&pointer.artifact_id)
            .await?
        else {
            return Err(StoreIntegrityError::PointerRot {
                deliverable,
                artifact_id: pointer.artifact_id.to_string(),
            }
            .into());
        };

        let mut siblings = self.store.current_documents(&project).await?;
        siblings.remove(&deliverable);
        let result = self.validator.validate(deliverable, &artifact.content, &siblings);
        self.store.set_validated(project_id, deliverable, result.ok).await?;

        info!(project_id, deliverable = %deliverable, validated = result.ok, "Revalidated");
        Ok(result)
    }

    /// Pointer map of a project, after rot detection.
    pub async fn project_status(&self, project_id: &str) -> Result<ProjectStatus> {
        let rotted = self.store.detect_pointer_rot(project_id).await?;
        let project = self.store.require_project(project_id).await?;
        Ok(ProjectStatus {
            project_id: project.id.clone(),
            run_id: project.run_id.clone(),
            pointers: project.pointers().clone(),
            rotted,
        })
    }

    /// Deletes a project and all its artifacts. Fails while a run is in
    /// flight.
    pub async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let _guard = self.acquire_run(project_id)?;
        let removed = self.store.delete_project(project_id).await?;
        self.active_runs.remove(project_id);
        Ok(removed)
    }
}
