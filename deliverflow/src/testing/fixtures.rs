//! Fixtures: a small catalog, valid documents and a ready-made harness.

use serde_json::{json, Value};
use std::sync::Arc;

use super::mocks::ScriptedGenerator;
use crate::catalog::{Catalog, DeliverableId};
use crate::orchestrator::{CollectingProgressSink, Orchestrator, OrchestratorConfig};
use crate::store::{DeliverableStore, Project};
use crate::validation::Validator;

/// Project id used by [`TestHarness`].
pub const TEST_PROJECT_ID: &str = "proj";

/// A six-stage catalog: readiness check, foundation (`profile`), structure
/// (`framework`), two content stages (`curriculum`, `workbook`) and the
/// quality report depending on all of them.
#[must_use]
pub fn test_catalog() -> Catalog {
    use DeliverableId as D;
    Catalog::builder()
        .entry(D::Preflight, &[], false)
        .entry(D::Profile, &[D::Preflight], true)
        .entry(D::Framework, &[D::Profile], true)
        .entry(D::Curriculum, &[D::Profile, D::Framework], true)
        .entry(D::Workbook, &[D::Profile, D::Framework], true)
        .entry(
            D::QualityReport,
            &[D::Profile, D::Framework, D::Curriculum, D::Workbook],
            false,
        )
        .build()
        .expect("test catalog is valid")
}

/// A transcript long enough for the standard readiness policy.
#[must_use]
pub fn sample_transcript() -> String {
    "In this session we walk through pricing a first online course, \
     choosing a narrow audience, outlining six modules and writing the \
     launch emails. Students leave with a worksheet per module and a \
     four-week launch plan they can follow without outside help."
        .to_string()
}

/// A project carrying every setting the standard readiness policy needs.
#[must_use]
pub fn ready_project(id: &str) -> Project {
    Project::new(id)
        .with_setting("audience", json!("first-time course creators"))
        .with_setting("offer", json!("Course Launch Kit"))
}

/// A document that passes the standard rules for `deliverable`, given the
/// fixture documents of its dependencies.
#[must_use]
pub fn valid_document(deliverable: DeliverableId) -> Value {
    match deliverable {
        DeliverableId::Preflight => json!({
            "ready": true,
            "checked_fields": ["transcript", "audience", "offer"]
        }),
        DeliverableId::Profile => json!({
            "name": "Course Launch Kit",
            "summary": "A guided path from idea to first sale.",
            "audience": "first-time course creators"
        }),
        DeliverableId::Framework => json!({
            "title": "Launch Framework",
            "blocks": [
                {"id": "b1", "title": "Positioning"},
                {"id": "b2", "title": "Building"}
            ]
        }),
        DeliverableId::Curriculum => json!({
            "modules": [
                {"title": "Find your reader", "block_id": "b1"},
                {"title": "Record the course", "block_id": "b2"}
            ]
        }),
        DeliverableId::LessonScripts => json!({
            "lessons": [{"title": "Welcome", "script": "Hi, and welcome."}]
        }),
        DeliverableId::Workbook => json!({
            "title": "Launch Workbook",
            "exercises": [{"prompt": "Describe your reader in one sentence."}]
        }),
        DeliverableId::LandingPage => json!({
            "headline": "Launch your first course in four weeks",
            "call_to_action": "Join now",
            "sections": ["What you get", "Who it is for"]
        }),
        DeliverableId::EmailSequence => json!({
            "emails": [{"subject": "Doors are open", "body": "Enrollment starts today."}]
        }),
        DeliverableId::Timeline => json!({
            "segments": [
                {"block_id": "b1", "week": 1},
                {"block_id": "b2", "week": 2}
            ]
        }),
        DeliverableId::QualityReport => json!({
            "score": 0.92,
            "verdict": "pass",
            "checked": ["profile", "framework"]
        }),
    }
}

/// An orchestrator wired to in-memory collaborators with a ready project.
pub struct TestHarness {
    /// The store.
    pub store: Arc<DeliverableStore>,
    /// The generator.
    pub generator: Arc<ScriptedGenerator>,
    /// Collected progress.
    pub progress: Arc<CollectingProgressSink>,
    /// The orchestrator under test.
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Builds a harness over [`test_catalog`] and an in-memory store.
    pub async fn new(
        generator: ScriptedGenerator,
        validator: Arc<dyn Validator>,
        config: OrchestratorConfig,
    ) -> Self {
        let store = Arc::new(DeliverableStore::in_memory());
        Self::with_store(store, generator, validator, config).await
    }

    /// Builds a harness over [`test_catalog`] and the given store.
    pub async fn with_store(
        store: Arc<DeliverableStore>,
        generator: ScriptedGenerator,
        validator: Arc<dyn Validator>,
        config: OrchestratorConfig,
    ) -> Self {
        store
            .create_project(ready_project(TEST_PROJECT_ID))
            .await
            .expect("create test project");
        store
            .put_transcript(TEST_PROJECT_ID, &sample_transcript())
            .await
            .expect("store test transcript");

        let generator = Arc::new(generator);
        let progress = Arc::new(CollectingProgressSink::new());
        let orchestrator = Orchestrator::new(store.clone(), generator.clone(), validator)
            .with_catalog(test_catalog())
            .with_config(config)
            .with_progress_sink(progress.clone());

        Self {
            store,
            generator,
            progress,
            orchestrator,
        }
    }

    /// Reloads the test project.
    pub async fn project(&self) -> Project {
        self.store
            .require_project(TEST_PROJECT_ID)
            .await
            .expect("test project exists")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::ReadinessPolicy;

    #[test]
    fn test_fixture_inputs_pass_standard_readiness() {
        let project = ready_project("p");
        let report =
            ReadinessPolicy::standard().evaluate(&project.settings, Some(&sample_transcript()));
        assert!(report.is_ready(), "missing: {:?}", report.missing);
    }

    #[test]
    fn test_catalog_order() {
        use DeliverableId as D;
        assert_eq!(
            test_catalog().topological_order(),
            &[D::Preflight, D::Profile, D::Framework, D::Curriculum, D::Workbook, D::QualityReport]
        );
    }
}
