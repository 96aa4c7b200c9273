//! Field mapping seeding functionality
//!
//! Seeds the field mapping registry with the default BRD-to-Jira rules.
//! Rules are stored in BRD-to-Jira orientation: `source_field` is the
//! BRD side, `target_field` the Jira side.

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::repositories::{FieldMappingRepository, NewFieldMapping};
use crate::sync::SyncDirection;
use crate::sync::mapper::TransformKind;

struct SeedRule {
    source_field: &'static str,
    target_field: &'static str,
    direction: SyncDirection,
    transform: TransformKind,
    jira_field_id: Option<&'static str>,
}

/// The default rule set a fresh deployment starts with.
const DEFAULT_RULES: &[SeedRule] = &[
    SeedRule {
        source_field: "title",
        target_field: "summary",
        direction: SyncDirection::Bidirectional,
        transform: TransformKind::Direct,
        jira_field_id: None,
    },
    SeedRule {
        source_field: "description",
        target_field: "description",
        direction: SyncDirection::Bidirectional,
        transform: TransformKind::Direct,
        jira_field_id: None,
    },
    SeedRule {
        source_field: "status",
        target_field: "status",
        direction: SyncDirection::Bidirectional,
        transform: TransformKind::StatusMap,
        jira_field_id: None,
    },
    // Story points live in a Jira custom field; the budget conversion
    // only makes sense outbound.
    SeedRule {
        source_field: "budget",
        target_field: "story_points",
        direction: SyncDirection::BrdToJira,
        transform: TransformKind::BudgetToStoryPoints,
        jira_field_id: Some("customfield_10016"),
    },
    SeedRule {
        source_field: "stakeholders",
        target_field: "labels",
        direction: SyncDirection::BrdToJira,
        transform: TransformKind::ArrayJoin,
        jira_field_id: None,
    },
];

/// Seeds the field mapping registry with the default rules
///
/// Existing rules are matched by source and target field and left alone,
/// so seeding is safe to run on every startup. Returns the number of
/// rules created.
pub async fn seed_field_mappings(db: &DatabaseConnection) -> Result<usize> {
    let repo = FieldMappingRepository::new(db.clone());
    let existing = repo.list_all().await?;

    let mut created = 0usize;
    for rule in DEFAULT_RULES {
        let present = existing
            .iter()
            .any(|m| m.source_field == rule.source_field && m.target_field == rule.target_field);
        if present {
            tracing::debug!(
                source_field = rule.source_field,
                target_field = rule.target_field,
                "Field mapping already exists, skipping"
            );
            continue;
        }

        tracing::info!(
            source_field = rule.source_field,
            target_field = rule.target_field,
            transform = rule.transform.as_str(),
            "Creating default field mapping"
        );
        repo.create(NewFieldMapping {
            source_field: rule.source_field.to_string(),
            target_field: rule.target_field.to_string(),
            direction: rule.direction.as_str().to_string(),
            is_custom_field: rule.jira_field_id.is_some(),
            jira_field_id: rule.jira_field_id.map(str::to_string),
            transform: rule.transform.as_str().to_string(),
            active: true,
        })
        .await?;
        created += 1;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::mapper::MappingRule;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn default_rules_all_parse() {
        // Every seed rule must survive the mapper's own validation.
        let now = Utc::now().fixed_offset();
        for rule in DEFAULT_RULES {
            let model = crate::models::field_mapping::Model {
                id: Uuid::new_v4(),
                source_field: rule.source_field.to_string(),
                target_field: rule.target_field.to_string(),
                direction: rule.direction.as_str().to_string(),
                is_custom_field: rule.jira_field_id.is_some(),
                jira_field_id: rule.jira_field_id.map(str::to_string),
                transform: Some(rule.transform.as_str().to_string()),
                active: true,
                created_at: now,
                updated_at: now,
            };
            MappingRule::from_model(&model).expect("seed rule must be valid");
        }
    }

    #[test]
    fn bidirectional_rules_use_invertible_transforms() {
        for rule in DEFAULT_RULES {
            if rule.direction == SyncDirection::Bidirectional {
                assert!(rule.transform.is_self_inverting());
            }
        }
    }
}
