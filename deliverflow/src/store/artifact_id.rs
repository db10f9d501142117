//! Composite artifact identifiers: `project_id:run_id:deliverable_id:version`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::catalog::DeliverableId;
use crate::errors::ArtifactIdError;

/// Separator between identifier segments.
pub const SEPARATOR: char = ':';

/// The only artifact version currently written.
pub const ARTIFACT_VERSION: &str = "v1";

/// Identifies one artifact slot.
///
/// The id is stable within a run: rewriting the same deliverable replaces the
/// content but keeps the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId {
    project_id: String,
    run_id: String,
    deliverable: DeliverableId,
    version: String,
}

impl ArtifactId {
    /// Builds the id for a deliverable within a run.
    pub fn new(
        project_id: &str,
        run_id: &str,
        deliverable: DeliverableId,
    ) -> Result<Self, ArtifactIdError> {
        check_component(project_id)?;
        check_component(run_id)?;
        Ok(Self {
            project_id: project_id.to_string(),
            run_id: run_id.to_string(),
            deliverable,
            version: ARTIFACT_VERSION.to_string(),
        })
    }

    /// Parses an identifier, rejecting anything that is not exactly four
    /// non-empty segments with a known deliverable and version.
    pub fn parse(raw: &str) -> Result<Self, ArtifactIdError> {
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        if segments.len() != 4 {
            return Err(ArtifactIdError::SegmentCount {
                id: raw.to_string(),
                found: segments.len(),
            });
        }
        if let Some(position) = segments.iter().position(|s| s.is_empty()) {
            return Err(ArtifactIdError::EmptySegment {
                id: raw.to_string(),
                position,
            });
        }

        let deliverable = segments[2]
            .parse::<DeliverableId>()
            .map_err(|_| ArtifactIdError::UnknownDeliverable {
                id: raw.to_string(),
                segment: segments[2].to_string(),
            })?;
        if segments[3] != ARTIFACT_VERSION {
            return Err(ArtifactIdError::UnsupportedVersion {
                id: raw.to_string(),
                version: segments[3].to_string(),
            });
        }

        Ok(Self {
            project_id: segments[0].to_string(),
            run_id: segments[1].to_string(),
            deliverable,
            version: segments[3].to_string(),
        })
    }

    /// Key prefix covering every artifact of a project.
    #[must_use]
    pub fn project_prefix(project_id: &str) -> String {
        format!("{project_id}{SEPARATOR}")
    }

    /// Key prefix covering every artifact of one run.
    #[must_use]
    pub fn run_prefix(project_id: &str, run_id: &str) -> String {
        format!("{project_id}{SEPARATOR}{run_id}{SEPARATOR}")
    }

    /// The project segment.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The run segment.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The deliverable segment.
    #[must_use]
    pub fn deliverable(&self) -> DeliverableId {
        self.deliverable
    }

    /// The version segment.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

fn check_component(component: &str) -> Result<(), ArtifactIdError> {
    if component.is_empty() {
        return Err(ArtifactIdError::EmptySegment {
            id: component.to_string(),
            position: 0,
        });
    }
    if component.contains(SEPARATOR) {
        return Err(ArtifactIdError::SeparatorInComponent(component.to_string()));
    }
    Ok(())
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.project_id, self.run_id, self.deliverable, self.version
        )
    }
}

impl FromStr for ArtifactId {
    type Err = ArtifactIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = ArtifactIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}
