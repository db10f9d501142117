//! The per-stage generate/validate/repair state machine.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn, Instrument};

use super::progress::{StageProgress, StageStatus};
use super::report::RunContext;
use super::Orchestrator;
use crate::catalog::DeliverableId;
use crate::edits::EditSnapshot;
use crate::errors::{
    DeliverflowError, GenerationFailedError, Result, StoreIntegrityError, ValidationFailedError,
};
use crate::generation::{GenerationContext, GenerationError};
use crate::observability::stage_span;
use crate::store::Project;

impl Orchestrator {
    /// Runs one stage to `complete`, reporting `error` before returning any
    /// failure other than cancellation.
    pub(super) async fn run_stage(
        &self,
        ctx: &mut RunContext<'_>,
        deliverable: DeliverableId,
        snapshot: Option<&EditSnapshot>,
    ) -> Result<()> {
        ctx.status(deliverable, StageStatus::Pending);

        let span = stage_span(deliverable);
        let result = if deliverable.is_readiness_check() {
            self.run_readiness_stage(ctx, deliverable).instrument(span).await
        } else {
            self.run_content_stage(ctx, deliverable, snapshot)
                .instrument(span)
                .await
        };

        match result {
            Ok(()) => {
                ctx.status(deliverable, StageStatus::Complete);
                Ok(())
            }
            Err(e @ DeliverflowError::Cancelled(_)) => Err(e),
            Err(e) => {
                ctx.report(StageProgress::error(deliverable, e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_readiness_stage(
        &self,
        ctx: &mut RunContext<'_>,
        deliverable: DeliverableId,
    ) -> Result<()> {
        ctx.status(deliverable, StageStatus::Generating);
        let project = self.store.require_project(&ctx.project_id).await?;
        let transcript = self.store.get_transcript(&ctx.project_id).await?;
        let report = self.readiness.evaluate(&project.settings, transcript.as_deref());

        ctx.status(deliverable, StageStatus::Validating);
        let report = report.into_result().map_err(|blocked| {
            warn!(
                project_id = %ctx.project_id,
                missing = ?blocked.field_names(),
                "Readiness gate blocked the run"
            );
            DeliverflowError::from(blocked)
        })?;
        ctx.cancel.check()?;

        self.store
            .atomic_artifact_write(
                &ctx.project_id,
                &ctx.run_id,
                deliverable,
                report.to_document(),
                true,
            )
            .await?;
        info!(
            project_id = %ctx.project_id,
            checked = report.checked_fields.len(),
            "Readiness gate passed"
        );
        Ok(())
    }

    async fn run_content_stage(
        &self,
        ctx: &mut RunContext<'_>,
        deliverable: DeliverableId,
        snapshot: Option<&EditSnapshot>,
    ) -> Result<()> {
        let project = self.store.require_project(&ctx.project_id).await?;
        let dependencies = self.dependency_documents(&project, deliverable).await?;
        let mut siblings = self.store.current_documents(&project).await?;
        siblings.remove(&deliverable);

        let max_attempts = self.config.max_repair_attempts;
        let mut context = GenerationContext {
            project_id: ctx.project_id.clone(),
            run_id: ctx.run_id.clone(),
            deliverable,
            settings: project.settings.clone(),
            transcript: self.store.get_transcript(&ctx.project_id).await?,
            dependencies,
            attempt: 1,
            previous_candidate: None,
            validation_errors: Vec::new(),
        };

        ctx.status(deliverable, StageStatus::Generating);
        let content = loop {
            let candidate = self.generate(deliverable, &context).await?;
            ctx.cancel.check()?;

            ctx.status(deliverable, StageStatus::Validating);
            let result = self.validator.validate(deliverable, &candidate, &siblings);
            if result.ok {
                debug!(deliverable = %deliverable, attempt = context.attempt, "Candidate accepted");
                break candidate;
            }

            let errors = result.messages();
            warn!(
                deliverable = %deliverable,
                attempt = context.attempt,
                max_attempts,
                errors = ?errors,
                "Candidate failed validation"
            );
            if context.attempt >= max_attempts {
                return Err(ValidationFailedError {
                    deliverable,
                    errors,
                    error_type: result.error_type(),
                    attempts: context.attempt,
                }
                .into());
            }

            ctx.cancel.check()?;
            context.advance(candidate, errors);
            ctx.report(StageProgress::repairing(deliverable, context.attempt, max_attempts));
        };

        match snapshot {
            Some(snapshot) => {
                self.write_with_edits(ctx, deliverable, content, snapshot, &siblings)
                    .await
            }
            None => {
                self.store
                    .atomic_artifact_write(&ctx.project_id, &ctx.run_id, deliverable, content, true)
                    .await?;
                Ok(())
            }
        }
    }

    /// Persists the fresh content, then lays the preserved edits on top in a
    /// second write. The merged document is validated again and its verdict
    /// becomes the pointer's.
    async fn write_with_edits(
        &self,
        ctx: &RunContext<'_>,
        deliverable: DeliverableId,
        content: Value,
        snapshot: &EditSnapshot,
        siblings: &BTreeMap<DeliverableId, Value>,
    ) -> Result<()> {
        let mut merged = content.clone();
        snapshot.reapply(&mut merged)?;

        self.store
            .atomic_artifact_write(&ctx.project_id, &ctx.run_id, deliverable, content, true)
            .await?;

        let verdict = self.validator.validate(deliverable, &merged, siblings);
        if !verdict.ok {
            warn!(
                deliverable = %deliverable,
                errors = ?verdict.messages(),
                "Preserved edits do not validate; pointer left unvalidated"
            );
        }
        self.store
            .atomic_artifact_write(&ctx.project_id, &ctx.run_id, deliverable, merged, verdict.ok)
            .await?;
        info!(
            deliverable = %deliverable,
            fields = ?snapshot.field_names(),
            "Preserved edits re-applied"
        );
        Ok(())
    }

    /// Checks every declared dependency has a validated pointer and reads its
    /// content.
    async fn dependency_documents(
        &self,
        project: &Project,
        deliverable: DeliverableId,
    ) -> Result<BTreeMap<DeliverableId, Value>> {
        let dependencies = self.catalog.dependencies_of(deliverable);
        let missing: Vec<DeliverableId> = dependencies
            .iter()
            .copied()
            .filter(|dep| !project.is_validated(*dep))
            .collect();
        if !missing.is_empty() {
            return Err(DeliverflowError::DependencyNotReady { deliverable, missing });
        }

        let mut documents = BTreeMap::new();
        for dependency in dependencies {
            let Some(pointer) = project.pointer(dependency) else {
                continue;
            };
            let artifact = self
                .store
                .artifacts()
                .read_artifact(&pointer.artifact_id)
                .await?
                .ok_or_else(|| StoreIntegrityError::PointerRot {
                    deliverable: dependency,
                    artifact_id: pointer.artifact_id.to_string(),
                })?;
            documents.insert(dependency, artifact.content);
        }
        Ok(documents)
    }

    async fn generate(
        &self,
        deliverable: DeliverableId,
        context: &GenerationContext,
    ) -> Result<Value> {
        let call = self.generator.generate(deliverable, context);
        let result = match self.config.generation_timeout() {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(GenerationError::Timeout {
                    seconds: limit.as_secs_f64(),
                })),
            None => call.await,
        };
        result.map_err(|source| {
            GenerationFailedError {
                deliverable,
                attempt: context.attempt,
                source,
            }
            .into()
        })
    }
}
