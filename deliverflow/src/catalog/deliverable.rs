//! Deliverable identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the fixed set of deliverables the pipeline can produce.
///
/// Declaration order is display order, so the derived `Ord` sorts
/// deliverables the way they are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableId {
    /// Readiness-check pseudo-stage; gates every other stage.
    Preflight,
    /// Foundation: the creator/offer profile.
    Profile,
    /// Structure: the framework of content blocks.
    Framework,
    /// Module-level curriculum.
    Curriculum,
    /// Per-lesson scripts.
    LessonScripts,
    /// Student workbook.
    Workbook,
    /// Landing-page copy.
    LandingPage,
    /// Launch email sequence.
    EmailSequence,
    /// Video timeline segments.
    Timeline,
    /// Final quality report over all content.
    QualityReport,
}

impl DeliverableId {
    /// Every deliverable, in display order.
    pub const ALL: [Self; 10] = [
        Self::Preflight,
        Self::Profile,
        Self::Framework,
        Self::Curriculum,
        Self::LessonScripts,
        Self::Workbook,
        Self::LandingPage,
        Self::EmailSequence,
        Self::Timeline,
        Self::QualityReport,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Profile => "profile",
            Self::Framework => "framework",
            Self::Curriculum => "curriculum",
            Self::LessonScripts => "lesson_scripts",
            Self::Workbook => "workbook",
            Self::LandingPage => "landing_page",
            Self::EmailSequence => "email_sequence",
            Self::Timeline => "timeline",
            Self::QualityReport => "quality_report",
        }
    }

    /// True for the readiness-check pseudo-stage.
    #[must_use]
    pub const fn is_readiness_check(self) -> bool {
        matches!(self, Self::Preflight)
    }

    /// Position in display order.
    #[must_use]
    pub const fn display_order(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DeliverableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown deliverable name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown deliverable: '{0}'")]
pub struct ParseDeliverableIdError(pub String);

impl FromStr for DeliverableId {
    type Err = ParseDeliverableIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ParseDeliverableIdError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for id in DeliverableId::ALL {
            assert_eq!(id.to_string().parse::<DeliverableId>(), Ok(id));
        }
    }

    #[test]
    fn test_parse_rejects_unknown_and_case() {
        assert!("Profile".parse::<DeliverableId>().is_err());
        assert!("".parse::<DeliverableId>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&DeliverableId::LessonScripts).unwrap();
        assert_eq!(json, r#""lesson_scripts""#);
    }

    #[test]
    fn test_display_order_follows_declaration() {
        assert_eq!(DeliverableId::Preflight.display_order(), 0);
        assert_eq!(DeliverableId::QualityReport.display_order(), 9);
        assert!(DeliverableId::Profile < DeliverableId::Framework);
    }
}
