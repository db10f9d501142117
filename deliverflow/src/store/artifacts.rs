//! Artifact persistence with read-after-write verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use super::artifact_id::ArtifactId;
use super::backend::{Collection, KeyValueStore};
use crate::errors::{DeliverflowError, Result, StoreIntegrityError};

/// A stored deliverable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// The document itself; opaque to the store.
    pub content: serde_json::Value,
    /// Whether the content passed validation when written.
    pub validated: bool,
    /// When the content was generated.
    pub generated_at: DateTime<Utc>,
    /// When the content was last edited by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Creates a freshly generated artifact.
    #[must_use]
    pub fn generated(content: serde_json::Value, validated: bool) -> Self {
        Self {
            content,
            validated,
            generated_at: Utc::now(),
            edited_at: None,
        }
    }
}

/// Stores artifacts in the `artifacts` collection keyed by [`ArtifactId`].
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore").finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates a store over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Persists an artifact, then reads the key back and fails loudly unless
    /// the exact bytes written are returned.
    pub async fn write_artifact(&self, id: &ArtifactId, artifact: &Artifact) -> Result<()> {
        let key = id.to_string();
        let body = serde_json::to_string(artifact)?;

        self.backend
            .put(Collection::Artifacts, &key, body.clone())
            .await?;
        self.verify(&key, Some(body.as_str())).await?;
        debug!(artifact_id = %key, validated = artifact.validated, "Artifact written");
        Ok(())
    }

    /// Reads the stored body of an artifact without decoding it.
    pub(crate) async fn read_raw(&self, id: &ArtifactId) -> Result<Option<String>> {
        Ok(self
            .backend
            .get(Collection::Artifacts, &id.to_string())
            .await?)
    }

    /// Puts a body captured by [`Self::read_raw`] back, or deletes the key
    /// when there was none. Nothing is written if the key already holds it.
    pub(crate) async fn restore_raw(&self, id: &ArtifactId, previous: Option<&str>) -> Result<()> {
        let key = id.to_string();
        let current = self.backend.get(Collection::Artifacts, &key).await?;
        if current.as_deref() == previous {
            return Ok(());
        }

        match previous {
            Some(body) => {
                self.backend
                    .put(Collection::Artifacts, &key, body.to_string())
                    .await?;
            }
            None => {
                self.backend.delete(Collection::Artifacts, &key).await?;
            }
        }
        self.verify(&key, previous).await?;
        debug!(artifact_id = %key, restored = previous.is_some(), "Artifact slot restored");
        Ok(())
    }

    async fn verify(&self, key: &str, expected: Option<&str>) -> Result<()> {
        let stored = self.backend.get(Collection::Artifacts, key).await?;
        if stored.as_deref() == expected {
            return Ok(());
        }
        let key = key.to_string();
        if stored.is_none() {
            error!(artifact_id = %key, "Artifact missing after write");
            Err(StoreIntegrityError::VerifyMissing { key }.into())
        } else {
            error!(artifact_id = %key, "Artifact verification mismatch");
            Err(StoreIntegrityError::VerifyMismatch { key }.into())
        }
    }

    /// Reads an artifact; `None` when absent.
    pub async fn read_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>> {
        let key = id.to_string();
        let Some(raw) = self.backend.get(Collection::Artifacts, &key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| {
            DeliverflowError::from(StoreIntegrityError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })
    }

    /// Deletes an artifact, returning whether it existed.
    pub async fn delete_artifact(&self, id: &ArtifactId) -> Result<bool> {
        Ok(self
            .backend
            .delete(Collection::Artifacts, &id.to_string())
            .await?)
    }

    /// Lists every artifact id written during a run.
    ///
    /// A key under the prefix that does not parse is a data-integrity bug and
    /// is returned as an error rather than skipped.
    pub async fn list_artifact_ids(
        &self,
        project_id: &str,
        run_id: &str,
    ) -> Result<Vec<ArtifactId>> {
        let prefix = ArtifactId::run_prefix(project_id, run_id);
        self.list_with_prefix(&prefix).await
    }

    /// Deletes every artifact whose key belongs to the project, including
    /// orphans from earlier runs. Returns the number removed.
    pub async fn delete_project_artifacts(&self, project_id: &str) -> Result<usize> {
        let prefix = ArtifactId::project_prefix(project_id);
        let keys = self
            .backend
            .list_keys(Collection::Artifacts, &prefix)
            .await?;
        let mut removed = 0;
        for key in keys {
            if self.backend.delete(Collection::Artifacts, &key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_with_prefix(&self, prefix: &str) -> Result<Vec<ArtifactId>> {
        let keys = self
            .backend
            .list_keys(Collection::Artifacts, prefix)
            .await?;
        keys.iter()
            .map(|k| ArtifactId::parse(k).map_err(DeliverflowError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DeliverableId;
    use crate::store::InMemoryKeyValueStore;
    use crate::testing::{FlakyKeyValueStore, WriteFault};
    use pretty_assertions::assert_eq;

    fn id(project: &str, run: &str, deliverable: DeliverableId) -> ArtifactId {
        ArtifactId::new(project, run, deliverable).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = ArtifactStore::new(Arc::new(InMemoryKeyValueStore::new()));
        let artifact = Artifact::generated(serde_json::json!({"name": "Ada"}), true);
        let key = id("p", "r", DeliverableId::Profile);

        store.write_artifact(&key, &artifact).await.unwrap();

        assert_eq!(store.read_artifact(&key).await.unwrap(), Some(artifact));
        assert_eq!(
            store.read_artifact(&id("p", "r", DeliverableId::Framework)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_write_detects_dropped_write() {
        let backend = Arc::new(FlakyKeyValueStore::new());
        backend.inject(Collection::Artifacts, "p:", WriteFault::Drop);
        let store = ArtifactStore::new(backend);

        let err = store
            .write_artifact(
                &id("p", "r", DeliverableId::Profile),
                &Artifact::generated(serde_json::json!({}), true),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliverflowError::StoreIntegrity(StoreIntegrityError::VerifyMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_detects_corrupted_write() {
        let backend = Arc::new(FlakyKeyValueStore::new());
        backend.inject(Collection::Artifacts, "p:", WriteFault::Corrupt);
        let store = ArtifactStore::new(backend);

        let err = store
            .write_artifact(
                &id("p", "r", DeliverableId::Profile),
                &Artifact::generated(serde_json::json!({}), true),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliverflowError::StoreIntegrity(StoreIntegrityError::VerifyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_puts_previous_body_back() {
        let backend = Arc::new(FlakyKeyValueStore::new());
        let store = ArtifactStore::new(backend.clone());
        let key = id("p", "r", DeliverableId::Profile);
        store
            .write_artifact(&key, &Artifact::generated(serde_json::json!({"v": 1}), true))
            .await
            .unwrap();
        let previous = store.read_raw(&key).await.unwrap();

        backend.inject_once(Collection::Artifacts, "p:", WriteFault::Corrupt);
        assert!(store
            .write_artifact(&key, &Artifact::generated(serde_json::json!({"v": 2}), true))
            .await
            .is_err());
        store.restore_raw(&key, previous.as_deref()).await.unwrap();

        let restored = store.read_artifact(&key).await.unwrap().unwrap();
        assert_eq!(restored.content, serde_json::json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_restore_without_previous_body_deletes_key() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        let store = ArtifactStore::new(backend.clone());
        let key = id("p", "r", DeliverableId::Profile);
        store
            .write_artifact(&key, &Artifact::generated(serde_json::json!({}), true))
            .await
            .unwrap();

        store.restore_raw(&key, None).await.unwrap();

        assert_eq!(store.read_artifact(&key).await.unwrap(), None);
        assert!(backend.is_empty(Collection::Artifacts));
    }

    #[tokio::test]
    async fn test_restore_reports_failure_when_store_keeps_corrupting() {
        let backend = Arc::new(FlakyKeyValueStore::new());
        let store = ArtifactStore::new(backend.clone());
        let key = id("p", "r", DeliverableId::Profile);
        store
            .write_artifact(&key, &Artifact::generated(serde_json::json!({"v": 1}), true))
            .await
            .unwrap();
        let previous = store.read_raw(&key).await.unwrap();

        backend.inject(Collection::Artifacts, "p:", WriteFault::Corrupt);
        assert!(store
            .write_artifact(&key, &Artifact::generated(serde_json::json!({"v": 2}), true))
            .await
            .is_err());
        let err = store.restore_raw(&key, previous.as_deref()).await.unwrap_err();

        assert!(matches!(
            err,
            DeliverflowError::StoreIntegrity(StoreIntegrityError::VerifyMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_reports_corrupt_record() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        backend
            .put(Collection::Artifacts, "p:r:profile:v1", "not json".to_string())
            .await
            .unwrap();
        let store = ArtifactStore::new(backend);

        let err = store.read_artifact(&id("p", "r", DeliverableId::Profile)).await.unwrap_err();
        assert!(matches!(
            err,
            DeliverflowError::StoreIntegrity(StoreIntegrityError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_artifact_ids_scopes_to_run() {
        let store = ArtifactStore::new(Arc::new(InMemoryKeyValueStore::new()));
        let artifact = Artifact::generated(serde_json::json!({}), true);
        for key in [
            id("p", "r1", DeliverableId::Profile),
            id("p", "r1", DeliverableId::Framework),
            id("p", "r2", DeliverableId::Profile),
            id("q", "r1", DeliverableId::Profile),
        ] {
            store.write_artifact(&key, &artifact).await.unwrap();
        }

        let ids = store.list_artifact_ids("p", "r1").await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|i| i.run_id() == "r1" && i.project_id() == "p"));
    }

    #[tokio::test]
    async fn test_list_rejects_malformed_keys() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        backend
            .put(Collection::Artifacts, "p:r1:profile", "{}".to_string())
            .await
            .unwrap();
        let store = ArtifactStore::new(backend);

        assert!(matches!(
            store.list_artifact_ids("p", "r1").await,
            Err(DeliverflowError::ArtifactId(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_project_artifacts_includes_orphans() {
        let store = ArtifactStore::new(Arc::new(InMemoryKeyValueStore::new()));
        let artifact = Artifact::generated(serde_json::json!({}), true);
        for key in [
            id("p", "old-run", DeliverableId::Profile),
            id("p", "new-run", DeliverableId::Profile),
            id("other", "run", DeliverableId::Profile),
        ] {
            store.write_artifact(&key, &artifact).await.unwrap();
        }

        assert_eq!(store.delete_project_artifacts("p").await.unwrap(), 2);
        assert!(store.list_artifact_ids("other", "run").await.unwrap().len() == 1);
    }
}
