//! Test support: fixtures, scripted collaborators and a fault-injecting
//! store.

mod fixtures;
mod mocks;

pub use fixtures::{
    ready_project, sample_transcript, test_catalog, valid_document, TestHarness, TEST_PROJECT_ID,
};
pub use mocks::{
    AcceptAllValidator, AlwaysFailValidator, FlakyKeyValueStore, GenerationCall, ScriptedGenerator,
    WriteFault,
};
