//! Rules for the standard catalog.

use super::rules::{FieldKind, Rule, RuleValidator};
use crate::catalog::DeliverableId;

/// Verdicts a quality report may give.
pub const QUALITY_VERDICTS: [&str; 3] = ["pass", "needs_work", "fail"];

fn block_reference(field: &str) -> Rule {
    Rule::CrossReference {
        field: field.to_string(),
        item_key: "block_id".to_string(),
        target: DeliverableId::Framework,
        target_field: "blocks".to_string(),
        target_key: "id".to_string(),
    }
}

impl RuleValidator {
    /// Rules for every deliverable of the standard catalog.
    #[must_use]
    pub fn standard() -> Self {
        use DeliverableId as D;
        use FieldKind as K;

        Self::new()
            .with_rules(
                D::Preflight,
                vec![
                    Rule::RequireObject,
                    Rule::field("ready", K::Bool),
                    Rule::field("checked_fields", K::Array),
                ],
            )
            .with_rules(
                D::Profile,
                vec![
                    Rule::RequireObject,
                    Rule::field("name", K::String),
                    Rule::field("summary", K::String),
                    Rule::field("audience", K::String),
                ],
            )
            .with_rules(
                D::Framework,
                vec![
                    Rule::RequireObject,
                    Rule::field("title", K::String),
                    Rule::non_empty("blocks"),
                    Rule::items_have("blocks", "id", K::String),
                    Rule::items_have("blocks", "title", K::String),
                ],
            )
            .with_rules(
                D::Curriculum,
                vec![
                    Rule::RequireObject,
                    Rule::non_empty("modules"),
                    Rule::items_have("modules", "title", K::String),
                    Rule::items_have("modules", "block_id", K::String),
                    block_reference("modules"),
                ],
            )
            .with_rules(
                D::LessonScripts,
                vec![
                    Rule::RequireObject,
                    Rule::non_empty("lessons"),
                    Rule::items_have("lessons", "title", K::String),
                    Rule::items_have("lessons", "script", K::String),
                ],
            )
            .with_rules(
                D::Workbook,
                vec![
                    Rule::RequireObject,
                    Rule::field("title", K::String),
                    Rule::non_empty("exercises"),
                    Rule::items_have("exercises", "prompt", K::String),
                ],
            )
            .with_rules(
                D::LandingPage,
                vec![
                    Rule::RequireObject,
                    Rule::field("headline", K::String),
                    Rule::field("call_to_action", K::String),
                    Rule::non_empty("sections"),
                ],
            )
            .with_rules(
                D::EmailSequence,
                vec![
                    Rule::RequireObject,
                    Rule::non_empty("emails"),
                    Rule::items_have("emails", "subject", K::String),
                    Rule::items_have("emails", "body", K::String),
                ],
            )
            .with_rules(
                D::Timeline,
                vec![
                    Rule::RequireObject,
                    Rule::non_empty("segments"),
                    Rule::items_have("segments", "block_id", K::String),
                    Rule::items_have("segments", "week", K::Number),
                    block_reference("segments"),
                ],
            )
            .with_rules(
                D::QualityReport,
                vec![
                    Rule::RequireObject,
                    Rule::field("score", K::Number),
                    Rule::OneOf {
                        field: "verdict".to_string(),
                        allowed: QUALITY_VERDICTS.iter().map(ToString::to_string).collect(),
                    },
                    Rule::non_empty("checked"),
                    Rule::DeliverableRefs {
                        field: "checked".to_string(),
                    },
                ],
            )
    }
}
