//! Filesystem-backed key/value store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   artifacts/<sha256(key)>.json
//!   projects/<sha256(key)>.json
//!   transcripts/<sha256(key)>.json
//! ```
//!
//! Each file holds a `{key, value}` envelope so prefix scans can recover the
//! original key without reversing the hash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::backend::{Collection, KeyValueStore, StorageError};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: String,
}

/// Key/value store persisting one JSON file per key.
#[derive(Debug, Clone)]
pub struct FsKeyValueStore {
    root: PathBuf,
}

impl FsKeyValueStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for collection in Collection::ALL {
            tokio::fs::create_dir_all(root.join(collection.as_str())).await?;
        }
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, collection: Collection, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root
            .join(collection.as_str())
            .join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_envelope(path: &Path) -> Result<Option<Envelope>, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Backend(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FsKeyValueStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(collection, key);
        let Some(envelope) = Self::read_envelope(&path).await? else {
            return Ok(None);
        };
        if envelope.key != key {
            return Err(StorageError::Backend(format!(
                "{} holds key '{}', expected '{key}'",
                path.display(),
                envelope.key
            )));
        }
        Ok(Some(envelope.value))
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        let path = self.path_for(collection, key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string(&Envelope {
            key: key.to_string(),
            value,
        })
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(collection, key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(collection.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_envelope(&path).await {
                Ok(Some(envelope)) if envelope.key.starts_with(prefix) => keys.push(envelope.key),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable store entry");
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_fs_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyValueStore::open(dir.path()).await.unwrap();

        store
            .put(Collection::Projects, "proj-1", r#"{"id":"proj-1"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            store.get(Collection::Projects, "proj-1").await.unwrap().as_deref(),
            Some(r#"{"id":"proj-1"}"#)
        );
        assert_eq!(store.get(Collection::Transcripts, "proj-1").await.unwrap(), None);

        assert!(store.delete(Collection::Projects, "proj-1").await.unwrap());
        assert!(!store.delete(Collection::Projects, "proj-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsKeyValueStore::open(dir.path()).await.unwrap();
            store.put(Collection::Artifacts, "p:r:profile:v1", "{}".to_string()).await.unwrap();
        }

        let reopened = FsKeyValueStore::open(dir.path()).await.unwrap();
        assert!(reopened.get(Collection::Artifacts, "p:r:profile:v1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fs_store_prefix_listing_ignores_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyValueStore::open(dir.path()).await.unwrap();
        for key in ["p:r1:profile:v1", "p:r1:framework:v1", "p:r2:profile:v1"] {
            store.put(Collection::Artifacts, key, "{}".to_string()).await.unwrap();
        }
        tokio::fs::write(dir.path().join("artifacts").join("notes.txt"), "ignore me")
            .await
            .unwrap();

        let keys = store.list_keys(Collection::Artifacts, "p:r1:").await.unwrap();
        assert_eq!(keys, vec!["p:r1:framework:v1", "p:r1:profile:v1"]);
    }
}
