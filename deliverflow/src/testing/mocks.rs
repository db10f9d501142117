//! Scripted generators, canned validators and a fault-injecting store.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::fixtures::valid_document;
use crate::cancellation::CancellationToken;
use crate::catalog::DeliverableId;
use crate::generation::{GenerationContext, GenerationError, Generator};
use crate::store::{Collection, InMemoryKeyValueStore, KeyValueStore, StorageError};
use crate::validation::{ValidationIssue, ValidationResult, Validator};

/// One recorded call to a [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    /// The deliverable requested.
    pub deliverable: DeliverableId,
    /// Attempt number.
    pub attempt: usize,
    /// Dependencies whose content was supplied.
    pub dependencies: Vec<DeliverableId>,
    /// Validation errors supplied on repair attempts.
    pub validation_errors: Vec<String>,
}

/// A generator returning scripted responses per deliverable.
///
/// Queued responses are consumed first; after that the generator returns the
/// deliverable's fixed response if one was set, else [`valid_document`].
#[derive(Default)]
pub struct ScriptedGenerator {
    queued: Mutex<HashMap<DeliverableId, VecDeque<Result<Value, GenerationError>>>>,
    fixed: Mutex<HashMap<DeliverableId, Value>>,
    cancel_after: Mutex<Option<(DeliverableId, Arc<CancellationToken>)>>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl std::fmt::Debug for ScriptedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedGenerator")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedGenerator {
    /// Creates a generator that returns valid fixture documents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response.
    #[must_use]
    pub fn with_response(self, deliverable: DeliverableId, response: Value) -> Self {
        self.push(deliverable, Ok(response));
        self
    }

    /// Queues one error.
    #[must_use]
    pub fn with_error(self, deliverable: DeliverableId, error: GenerationError) -> Self {
        self.push(deliverable, Err(error));
        self
    }

    /// Returns `response` for every unqueued call.
    #[must_use]
    pub fn with_fixed(self, deliverable: DeliverableId, response: Value) -> Self {
        self.fixed.lock().insert(deliverable, response);
        self
    }

    /// Cancels `token` as soon as `deliverable` has been generated once.
    #[must_use]
    pub fn cancelling_after(
        self,
        deliverable: DeliverableId,
        token: Arc<CancellationToken>,
    ) -> Self {
        *self.cancel_after.lock() = Some((deliverable, token));
        self
    }

    /// Queues a response after construction.
    pub fn push(&self, deliverable: DeliverableId, response: Result<Value, GenerationError>) {
        self.queued
            .lock()
            .entry(deliverable)
            .or_default()
            .push_back(response);
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made for one deliverable.
    #[must_use]
    pub fn call_count(&self, deliverable: DeliverableId) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.deliverable == deliverable)
            .count()
    }

    /// Deliverables in the order their first attempt was made.
    #[must_use]
    pub fn generated_order(&self) -> Vec<DeliverableId> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.attempt == 1)
            .map(|c| c.deliverable)
            .collect()
    }

    /// Forgets recorded calls.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        deliverable: DeliverableId,
        context: &GenerationContext,
    ) -> Result<Value, GenerationError> {
        self.calls.lock().push(GenerationCall {
            deliverable,
            attempt: context.attempt,
            dependencies: context.dependencies.keys().copied().collect(),
            validation_errors: context.validation_errors.clone(),
        });

        let queued = self
            .queued
            .lock()
            .get_mut(&deliverable)
            .and_then(VecDeque::pop_front);
        let response = match queued {
            Some(response) => response,
            None => Ok(self
                .fixed
                .lock()
                .get(&deliverable)
                .cloned()
                .unwrap_or_else(|| valid_document(deliverable))),
        };

        if let Some((target, token)) = self.cancel_after.lock().as_ref() {
            if *target == deliverable {
                token.cancel(format!("cancelled after {deliverable}"));
            }
        }
        response
    }
}

/// Accepts every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl Validator for AcceptAllValidator {
    fn validate(
        &self,
        _deliverable: DeliverableId,
        _candidate: &Value,
        _siblings: &BTreeMap<DeliverableId, Value>,
    ) -> ValidationResult {
        ValidationResult::passed()
    }
}

/// Rejects every candidate for the listed deliverables; delegates the rest.
pub struct AlwaysFailValidator {
    targets: HashSet<DeliverableId>,
    issue: ValidationIssue,
    fallback: Arc<dyn Validator>,
}

impl std::fmt::Debug for AlwaysFailValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlwaysFailValidator")
            .field("targets", &self.targets)
            .field("issue", &self.issue)
            .finish_non_exhaustive()
    }
}

impl AlwaysFailValidator {
    /// Fails `targets` with a schema issue and accepts everything else.
    #[must_use]
    pub fn new(targets: impl IntoIterator<Item = DeliverableId>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            issue: ValidationIssue::schema("$", "rejected by test validator"),
            fallback: Arc::new(AcceptAllValidator),
        }
    }

    /// Delegates non-target deliverables to `fallback`.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Validator>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Validator for AlwaysFailValidator {
    fn validate(
        &self,
        deliverable: DeliverableId,
        candidate: &Value,
        siblings: &BTreeMap<DeliverableId, Value>,
    ) -> ValidationResult {
        if self.targets.contains(&deliverable) {
            ValidationResult::from_issues(vec![self.issue.clone()])
        } else {
            self.fallback.validate(deliverable, candidate, siblings)
        }
    }
}

/// How a [`FlakyKeyValueStore`] misbehaves on a matching write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// The write returns an error.
    Fail,
    /// The write reports success but stores nothing.
    Drop,
    /// The write reports success but stores different bytes.
    Corrupt,
}

#[derive(Debug)]
struct Fault {
    collection: Collection,
    prefix: String,
    fault: WriteFault,
    remaining: Option<usize>,
}

/// An in-memory store whose writes can be made to fail, vanish or corrupt.
#[derive(Debug, Default)]
pub struct FlakyKeyValueStore {
    inner: InMemoryKeyValueStore,
    faults: Mutex<Vec<Fault>>,
}

impl FlakyKeyValueStore {
    /// Creates a store with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `fault` to every write in `collection` whose key starts with
    /// `prefix`.
    pub fn inject(&self, collection: Collection, prefix: &str, fault: WriteFault) {
        self.push_fault(collection, prefix, fault, None);
    }

    /// Applies `fault` to the next matching write only.
    pub fn inject_once(&self, collection: Collection, prefix: &str, fault: WriteFault) {
        self.push_fault(collection, prefix, fault, Some(1));
    }

    /// Removes every fault.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn push_fault(
        &self,
        collection: Collection,
        prefix: &str,
        fault: WriteFault,
        remaining: Option<usize>,
    ) {
        self.faults.lock().push(Fault {
            collection,
            prefix: prefix.to_string(),
            fault,
            remaining,
        });
    }

    fn take_fault(&self, collection: Collection, key: &str) -> Option<WriteFault> {
        let mut faults = self.faults.lock();
        let index = faults
            .iter()
            .position(|f| f.collection == collection && key.starts_with(f.prefix.as_str()))?;
        let fault = faults[index].fault;
        if let Some(remaining) = faults[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(index);
            }
        }
        Some(fault)
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(collection, key).await
    }

    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        match self.take_fault(collection, key) {
            None => self.inner.put(collection, key, value).await,
            Some(WriteFault::Fail) => Err(StorageError::Backend(format!(
                "injected failure writing '{key}'"
            ))),
            Some(WriteFault::Drop) => Ok(()),
            Some(WriteFault::Corrupt) => {
                self.inner.put(collection, key, format!("{value}~corrupt")).await
            }
        }
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(collection, key).await
    }

    async fn list_keys(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> Result<Vec<String>, StorageError> {
        self.inner.list_keys(collection, prefix).await
    }
}
