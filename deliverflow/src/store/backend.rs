//! Keyed storage backend trait and the in-memory implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// The three logical collections the engine persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Primary transcripts keyed by project id.
    Transcripts,
    /// Artifacts keyed by composite artifact id.
    Artifacts,
    /// Project records keyed by project id.
    Projects,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 3] = [Self::Transcripts, Self::Artifacts, Self::Projects];

    /// Returns the collection name used on disk and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcripts => "transcripts",
            Self::Artifacts => "artifacts",
            Self::Projects => "projects",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A local persistent key/value store partitioned into collections.
///
/// Implementations make no durability promise beyond their own; the artifact
/// layer verifies every write by reading it back.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes (or replaces) a value.
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: String,
    ) -> Result<(), StorageError>;

    /// Deletes a value, returning whether it existed.
    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError>;

    /// Lists keys starting with `prefix`, sorted.
    async fn list_keys(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys in a collection.
    #[must_use]
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns true if the collection holds no keys.
    #[must_use]
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .and_then(|c| c.get(key).cloned()))
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        self.collections
            .write()
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .collections
            .write()
            .get_mut(&collection)
            .is_some_and(|c| c.remove(key).is_some()))
    }

    async fn list_keys(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError> {
        let collections = self.collections.read();
        let Some(entries) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
