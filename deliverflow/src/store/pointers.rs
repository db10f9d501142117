//! The deliverable store: projects, transcripts, artifacts and the pointer map.
//!
//! Every pointer mutation goes through one of two narrow operations:
//! [`DeliverableStore::atomic_artifact_write`] (content + pointer) or
//! [`DeliverableStore::update_pointer`] (pointer only). Both run under a
//! per-project lock, so a manual edit and an in-flight regeneration serialize
//! at pointer granularity and the last writer wins.
//!
//! A content write that fails part way puts the slot's previous body back
//! before the error is returned. When that restore fails too, a pointer
//! naming the slot is marked unvalidated.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::artifact_id::ArtifactId;
use super::artifacts::{Artifact, ArtifactStore};
use super::backend::{Collection, InMemoryKeyValueStore, KeyValueStore};
use super::project::{new_run_id, DeliverablePointer, PointerUpdate, Project};
use crate::catalog::DeliverableId;
use crate::errors::{DeliverflowError, Result, StoreIntegrityError};

/// Handle over every persisted collection the engine touches.
pub struct DeliverableStore {
    backend: Arc<dyn KeyValueStore>,
    artifacts: ArtifactStore,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for DeliverableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliverableStore")
            .field("locked_projects", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl DeliverableStore {
    /// Creates a store over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            artifacts: ArtifactStore::new(backend.clone()),
            backend,
            locks: DashMap::new(),
        }
    }

    /// Creates a store over a fresh in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    /// The underlying artifact store.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    /// Creates a project record.
    ///
    /// Fails with `ProjectExists` if the id is taken. Pointers carried by the
    /// argument are discarded; a new project starts with none.
    pub async fn create_project(&self, project: Project) -> Result<Project> {
        let lock = self.project_lock(&project.id);
        let _guard = lock.lock().await;
        if self.get_project(&project.id).await?.is_some() {
            return Err(DeliverflowError::ProjectExists(project.id));
        }
        let mut project = project.without_pointers();
        self.save_project(&mut project).await?;
        info!(project_id = %project.id, run_id = %project.run_id, "Project created");
        Ok(project)
    }

    /// Loads a project record.
    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let Some(raw) = self.backend.get(Collection::Projects, project_id).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            DeliverflowError::from(StoreIntegrityError::Corrupt {
                key: project_id.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Loads a project record or fails with `ProjectNotFound`.
    pub async fn require_project(&self, project_id: &str) -> Result<Project> {
        self.get_project(project_id)
            .await?
            .ok_or_else(|| DeliverflowError::ProjectNotFound(project_id.to_string()))
    }

    /// Replaces the project's settings.
    pub async fn update_settings(
        &self,
        project_id: &str,
        settings: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Project> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        let mut project = self.require_project(project_id).await?;
        project.settings = settings;
        self.save_project(&mut project).await?;
        Ok(project)
    }

    /// Rotates the project's run id and returns the new one.
    pub async fn start_new_run(&self, project_id: &str) -> Result<String> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        let mut project = self.require_project(project_id).await?;
        project.run_id = new_run_id();
        self.save_project(&mut project).await?;
        debug!(project_id, run_id = %project.run_id, "Run id rotated");
        Ok(project.run_id)
    }

    /// Deletes the project, its transcript and every artifact under its key
    /// prefix. Returns the number of artifacts removed.
    pub async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        let removed = self.artifacts.delete_project_artifacts(project_id).await?;
        self.backend.delete(Collection::Transcripts, project_id).await?;
        self.backend.delete(Collection::Projects, project_id).await?;
        self.locks.remove(project_id);
        info!(project_id, artifacts_removed = removed, "Project deleted");
        Ok(removed)
    }

    async fn save_project(&self, project: &mut Project) -> Result<()> {
        project.updated_at = Utc::now();
        let body = serde_json::to_string(project)?;
        self.backend
            .put(Collection::Projects, &project.id, body)
            .await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Transcripts
    // ---------------------------------------------------------------------

    /// Stores the project's primary transcript.
    pub async fn put_transcript(&self, project_id: &str, transcript: &str) -> Result<()> {
        self.backend
            .put(Collection::Transcripts, project_id, transcript.to_string())
            .await?;
        Ok(())
    }

    /// Reads the project's primary transcript.
    pub async fn get_transcript(&self, project_id: &str) -> Result<Option<String>> {
        Ok(self.backend.get(Collection::Transcripts, project_id).await?)
    }

    // ---------------------------------------------------------------------
    // Pointer operations
    // ---------------------------------------------------------------------

    /// Writes and verifies the artifact, then makes it current.
    ///
    /// If either step fails the pointer keeps its previous value and the
    /// artifact slot its previous body.
    pub async fn atomic_artifact_write(
        &self,
        project_id: &str,
        run_id: &str,
        deliverable: DeliverableId,
        content: serde_json::Value,
        validated: bool,
    ) -> Result<DeliverablePointer> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let mut project = self.require_project(project_id).await?;
        let artifact_id = ArtifactId::new(project_id, run_id, deliverable)?;
        let artifact = Artifact::generated(content, validated);

        let pointer = self
            .commit(&mut project, &artifact_id, &artifact, |project| {
                let pointer = DeliverablePointer {
                    artifact_id: artifact_id.clone(),
                    validated,
                    generated_at: artifact.generated_at,
                    edited_at: None,
                };
                project.set_pointer(deliverable, pointer.clone());
                Ok(pointer)
            })
            .await?;

        debug!(
            project_id,
            deliverable = %deliverable,
            artifact_id = %pointer.artifact_id,
            validated,
            "Pointer updated"
        );
        Ok(pointer)
    }

    /// Writes `artifact`, lets `point` update the pointer map and saves the
    /// project. On failure the slot gets its previous body back.
    async fn commit<F>(
        &self,
        project: &mut Project,
        artifact_id: &ArtifactId,
        artifact: &Artifact,
        point: F,
    ) -> Result<DeliverablePointer>
    where
        F: FnOnce(&mut Project) -> Result<DeliverablePointer> + Send,
    {
        let previous = self.artifacts.read_raw(artifact_id).await?;
        match self.write_and_save(project, artifact_id, artifact, point).await {
            Ok(pointer) => Ok(pointer),
            Err(write_error) => Err(self
                .roll_back(&project.id, artifact_id, previous.as_deref(), write_error)
                .await),
        }
    }

    async fn write_and_save<F>(
        &self,
        project: &mut Project,
        artifact_id: &ArtifactId,
        artifact: &Artifact,
        point: F,
    ) -> Result<DeliverablePointer>
    where
        F: FnOnce(&mut Project) -> Result<DeliverablePointer> + Send,
    {
        self.artifacts.write_artifact(artifact_id, artifact).await?;
        let pointer = point(project)?;
        self.save_project(project).await?;
        Ok(pointer)
    }

    async fn roll_back(
        &self,
        project_id: &str,
        artifact_id: &ArtifactId,
        previous: Option<&str>,
        write_error: DeliverflowError,
    ) -> DeliverflowError {
        let restore_error = match self.artifacts.restore_raw(artifact_id, previous).await {
            Ok(()) => {
                warn!(
                    artifact_id = %artifact_id,
                    error = %write_error,
                    "Write failed; previous artifact restored"
                );
                return write_error;
            }
            Err(e) => e,
        };

        error!(
            artifact_id = %artifact_id,
            write_error = %write_error,
            restore_error = %restore_error,
            "Rollback failed; invalidating pointer"
        );
        if let Err(e) = self.invalidate_pointer_to(project_id, artifact_id).await {
            error!(artifact_id = %artifact_id, error = %e, "Could not invalidate pointer");
        }
        StoreIntegrityError::RollbackFailed {
            key: artifact_id.to_string(),
            write_error: write_error.to_string(),
            restore_error: restore_error.to_string(),
        }
        .into()
    }

    /// Marks the deliverable's pointer unvalidated if it names `artifact_id`.
    async fn invalidate_pointer_to(
        &self,
        project_id: &str,
        artifact_id: &ArtifactId,
    ) -> Result<()> {
        let mut project = self.require_project(project_id).await?;
        let deliverable = artifact_id.deliverable();
        let names_slot = project
            .pointer(deliverable)
            .is_some_and(|p| p.validated && p.artifact_id == *artifact_id);
        if names_slot {
            let update = PointerUpdate::SetValidated(false);
            Self::apply_pointer_update(&mut project, deliverable, update)?;
            self.save_project(&mut project).await?;
        }
        Ok(())
    }

    /// Applies a pointer-only update.
    pub async fn update_pointer(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
        update: PointerUpdate,
    ) -> Result<DeliverablePointer> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        let mut project = self.require_project(project_id).await?;
        let pointer = Self::apply_pointer_update(&mut project, deliverable, update)?;
        self.save_project(&mut project).await?;
        Ok(pointer)
    }

    fn apply_pointer_update(
        project: &mut Project,
        deliverable: DeliverableId,
        update: PointerUpdate,
    ) -> Result<DeliverablePointer> {
        let project_id = project.id.clone();
        let pointer = project
            .pointer_mut(deliverable)
            .ok_or(DeliverflowError::NoCurrentArtifact {
                project_id,
                deliverable,
            })?;
        pointer.apply(update);
        Ok(pointer.clone())
    }

    /// Applies a manual edit to the current content of a deliverable.
    ///
    /// The edited content is written under the pointer's artifact id with
    /// `validated = false`, then the pointer is marked edited.
    pub async fn edit_current<F>(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
        edit: F,
    ) -> Result<DeliverablePointer>
    where
        F: FnOnce(&mut serde_json::Value) -> Result<()> + Send,
    {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let mut project = self.require_project(project_id).await?;
        let (pointer, artifact) = self.resolve(&project, deliverable).await?;

        let mut content = artifact.content;
        edit(&mut content)?;

        let now = Utc::now();
        let edited = Artifact {
            content,
            validated: false,
            generated_at: artifact.generated_at,
            edited_at: Some(now),
        };
        self.commit(&mut project, &pointer.artifact_id, &edited, |project| {
            Self::apply_pointer_update(project, deliverable, PointerUpdate::MarkEdited { at: now })
        })
        .await
    }

    /// Records a new validity verdict on both the artifact and its pointer
    /// without changing content.
    pub async fn set_validated(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
        validated: bool,
    ) -> Result<DeliverablePointer> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let mut project = self.require_project(project_id).await?;
        let (pointer, artifact) = self.resolve(&project, deliverable).await?;

        let update = PointerUpdate::SetValidated(validated);
        if artifact.validated == validated {
            let pointer = Self::apply_pointer_update(&mut project, deliverable, update)?;
            self.save_project(&mut project).await?;
            return Ok(pointer);
        }

        let updated = Artifact {
            validated,
            ..artifact
        };
        self.commit(&mut project, &pointer.artifact_id, &updated, |project| {
            Self::apply_pointer_update(project, deliverable, update)
        })
        .await
    }

    /// Reads every pointer's artifact; pointers whose artifact is gone (or
    /// undecodable) are marked invalid and returned. Pointers are never
    /// deleted.
    pub async fn detect_pointer_rot(&self, project_id: &str) -> Result<Vec<DeliverableId>> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let mut project = self.require_project(project_id).await?;
        let mut rotted = Vec::new();
        let mut changed = false;

        let pointers: Vec<_> = project
            .pointers()
            .iter()
            .map(|(d, p)| (*d, p.clone()))
            .collect();
        for (deliverable, pointer) in pointers {
            match self.artifacts.read_artifact(&pointer.artifact_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(DeliverflowError::StoreIntegrity(StoreIntegrityError::Corrupt {
                    key,
                    reason,
                })) => {
                    warn!(artifact_id = %key, %reason, "Treating corrupt artifact as rotted");
                }
                Err(e) => return Err(e),
            }

            warn!(
                project_id,
                deliverable = %deliverable,
                artifact_id = %pointer.artifact_id,
                "Pointer rot detected"
            );
            if pointer.validated {
                let update = PointerUpdate::SetValidated(false);
                Self::apply_pointer_update(&mut project, deliverable, update)?;
                changed = true;
            }
            rotted.push(deliverable);
        }

        if changed {
            self.save_project(&mut project).await?;
        }
        Ok(rotted)
    }

    /// Returns the current pointer and artifact for a deliverable, if any.
    pub async fn read_current(
        &self,
        project_id: &str,
        deliverable: DeliverableId,
    ) -> Result<Option<(DeliverablePointer, Artifact)>> {
        let project = self.require_project(project_id).await?;
        let Some(pointer) = project.pointer(deliverable).cloned() else {
            return Ok(None);
        };
        Ok(self
            .artifacts
            .read_artifact(&pointer.artifact_id)
            .await?
            .map(|artifact| (pointer, artifact)))
    }

    /// Reads the content behind every pointer of a project.
    ///
    /// Rotted pointers are skipped; callers that need them surfaced use
    /// [`Self::detect_pointer_rot`].
    pub async fn current_documents(
        &self,
        project: &Project,
    ) -> Result<BTreeMap<DeliverableId, serde_json::Value>> {
        let mut documents = BTreeMap::new();
        for (deliverable, pointer) in project.pointers() {
            match self.artifacts.read_artifact(&pointer.artifact_id).await? {
                Some(artifact) => {
                    documents.insert(*deliverable, artifact.content);
                }
                None => warn!(
                    project_id = %project.id,
                    deliverable = %deliverable,
                    "Skipping rotted pointer while collecting documents"
                ),
            }
        }
        Ok(documents)
    }

    async fn resolve(
        &self,
        project: &Project,
        deliverable: DeliverableId,
    ) -> Result<(DeliverablePointer, Artifact)> {
        let pointer = project
            .pointer(deliverable)
            .cloned()
            .ok_or_else(|| DeliverflowError::NoCurrentArtifact {
                project_id: project.id.clone(),
                deliverable,
            })?;
        let artifact = self
            .artifacts
            .read_artifact(&pointer.artifact_id)
            .await?
            .ok_or_else(|| StoreIntegrityError::PointerRot {
                deliverable,
                artifact_id: pointer.artifact_id.to_string(),
            })?;
        Ok((pointer, artifact))
    }
}
