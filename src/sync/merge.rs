//! Three-way merge
//!
//! Pure comparison of a common ancestor (base) against the local and
//! remote copies of a field document. Produces the merged document and
//! the set of fields that need human or policy resolution. No I/O; the
//! resolver persists whatever this module reports.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, FixedOffset};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::ConflictKind;

/// Separator used by the string `merge` strategy. Concatenation is lossy;
/// the resulting value is meant for manual review, not automated reuse.
pub const MERGE_SEPARATOR: &str = " | ";

/// Last-modified timestamps used to classify near-simultaneous edits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModificationWindow {
    pub local_modified_at: Option<DateTime<FixedOffset>>,
    pub remote_modified_at: Option<DateTime<FixedOffset>>,
    pub window_seconds: i64,
}

impl ModificationWindow {
    /// True when both sides were modified within `window_seconds` of each
    /// other. Unknown timestamps never count as concurrent.
    pub fn is_concurrent(&self) -> bool {
        match (self.local_modified_at, self.remote_modified_at) {
            (Some(local), Some(remote)) => {
                (local - remote).abs() <= Duration::seconds(self.window_seconds)
            }
            _ => false,
        }
    }
}

/// One field that changed on both sides to different values.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: String,
    pub kind: ConflictKind,
    pub base: Option<JsonValue>,
    pub local: Option<JsonValue>,
    pub remote: Option<JsonValue>,
}

/// Result of a three-way merge pass over a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// The local document with non-conflicting remote changes applied.
    /// Conflicting fields keep their local value until resolved.
    pub merged: JsonMap<String, JsonValue>,
    pub conflicts: Vec<FieldConflict>,
    /// Fields whose remote value was applied without conflict.
    pub remote_applied: Vec<String>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn merged_value(&self) -> JsonValue {
        JsonValue::Object(self.merged.clone())
    }
}

/// JSON null is treated as an absent (tombstoned) field throughout.
fn field_of<'a>(document: &'a JsonValue, field: &str) -> Option<&'a JsonValue> {
    match document.as_object()?.get(field) {
        Some(JsonValue::Null) | None => None,
        Some(value) => Some(value),
    }
}

fn classify(
    field: &str,
    local: Option<&JsonValue>,
    remote: Option<&JsonValue>,
    window: &ModificationWindow,
) -> ConflictKind {
    if field == "status" {
        ConflictKind::StatusMismatch
    } else if local.is_none() || remote.is_none() {
        // Both sides changed relative to base, so an absent side means a
        // deletion racing a modification.
        ConflictKind::Deletion
    } else if window.is_concurrent() {
        ConflictKind::ConcurrentModification
    } else {
        ConflictKind::FieldChange
    }
}

/// Merge `local` and `remote` against their common ancestor `base`.
///
/// Per field: a change on one side only is applied; an identical change on
/// both sides is kept; diverging changes on both sides are reported as a
/// conflict and the local value stays in the merged document.
pub fn three_way_merge(
    base: &JsonValue,
    local: &JsonValue,
    remote: &JsonValue,
    window: &ModificationWindow,
) -> MergeOutcome {
    let mut fields = BTreeSet::new();
    for document in [base, local, remote] {
        if let Some(object) = document.as_object() {
            fields.extend(object.keys().cloned());
        }
    }

    let mut outcome = MergeOutcome::default();
    for field in fields {
        let base_value = field_of(base, &field);
        let local_value = field_of(local, &field);
        let remote_value = field_of(remote, &field);

        let local_changed = local_value != base_value;
        let remote_changed = remote_value != base_value;

        if local_changed && remote_changed && local_value != remote_value {
            outcome.conflicts.push(FieldConflict {
                kind: classify(&field, local_value, remote_value, window),
                field: field.clone(),
                base: base_value.cloned(),
                local: local_value.cloned(),
                remote: remote_value.cloned(),
            });
            if let Some(value) = local_value {
                outcome.merged.insert(field, value.clone());
            }
        } else if remote_changed && !local_changed {
            if let Some(value) = remote_value {
                outcome.merged.insert(field.clone(), value.clone());
                outcome.remote_applied.push(field);
            } else {
                // Remote deleted the field; drop it from the merged view.
                outcome.remote_applied.push(field);
            }
        } else if let Some(value) = local_value {
            outcome.merged.insert(field, value.clone());
        }
    }

    outcome
}

/// Type-aware combination of a conflicted field's two sides, used by the
/// `merge` resolution strategy.
///
/// Arrays take the set union, local order first then novel remote
/// elements. Objects merge shallowly with remote filling only keys absent
/// locally. Strings concatenate around [`MERGE_SEPARATOR`]. Anything else
/// (diverging scalars, mismatched types) falls back to the remote value.
/// An absent side yields the present side unchanged.
pub fn merge_values(local: Option<&JsonValue>, remote: Option<&JsonValue>) -> JsonValue {
    match (local, remote) {
        (None, None) => JsonValue::Null,
        (Some(value), None) | (None, Some(value)) => value.clone(),
        (Some(local), Some(remote)) => match (local, remote) {
            (JsonValue::Array(local_items), JsonValue::Array(remote_items)) => {
                let mut merged = local_items.clone();
                for item in remote_items {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                JsonValue::Array(merged)
            }
            (JsonValue::Object(local_map), JsonValue::Object(remote_map)) => {
                let mut merged = local_map.clone();
                for (key, value) in remote_map {
                    merged.entry(key.clone()).or_insert_with(|| value.clone());
                }
                JsonValue::Object(merged)
            }
            (JsonValue::String(local_text), JsonValue::String(remote_text)) => {
                if local_text == remote_text {
                    JsonValue::String(local_text.clone())
                } else {
                    JsonValue::String(format!("{local_text}{MERGE_SEPARATOR}{remote_text}"))
                }
            }
            (_, remote) => remote.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_window() -> ModificationWindow {
        ModificationWindow::default()
    }

    #[test]
    fn local_only_change_keeps_local_without_conflict() {
        let outcome = three_way_merge(
            &json!({"title": "A"}),
            &json!({"title": "A2"}),
            &json!({"title": "A"}),
            &no_window(),
        );
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged["title"], json!("A2"));
    }

    #[test]
    fn diverging_changes_report_one_conflict_with_all_snapshots() {
        let outcome = three_way_merge(
            &json!({"title": "A"}),
            &json!({"title": "A2"}),
            &json!({"title": "A3"}),
            &no_window(),
        );
        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.field, "title");
        assert_eq!(conflict.kind, ConflictKind::FieldChange);
        assert_eq!(conflict.base, Some(json!("A")));
        assert_eq!(conflict.local, Some(json!("A2")));
        assert_eq!(conflict.remote, Some(json!("A3")));
        // Local value stays in place until the conflict is resolved.
        assert_eq!(outcome.merged["title"], json!("A2"));
    }

    #[test]
    fn remote_only_change_is_applied() {
        let outcome = three_way_merge(
            &json!({"title": "A", "priority": "low"}),
            &json!({"title": "A", "priority": "low"}),
            &json!({"title": "A", "priority": "high"}),
            &no_window(),
        );
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged["priority"], json!("high"));
        assert_eq!(outcome.remote_applied, vec!["priority".to_string()]);
    }

    #[test]
    fn identical_changes_on_both_sides_do_not_conflict() {
        let outcome = three_way_merge(
            &json!({"title": "A"}),
            &json!({"title": "B"}),
            &json!({"title": "B"}),
            &no_window(),
        );
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged["title"], json!("B"));
    }

    #[test]
    fn remote_deletion_of_untouched_field_is_applied() {
        let outcome = three_way_merge(
            &json!({"title": "A", "notes": "n"}),
            &json!({"title": "A", "notes": "n"}),
            &json!({"title": "A"}),
            &no_window(),
        );
        assert!(outcome.conflicts.is_empty());
        assert!(!outcome.merged.contains_key("notes"));
        assert_eq!(outcome.remote_applied, vec!["notes".to_string()]);
    }

    #[test]
    fn deletion_racing_modification_is_classified_as_deletion() {
        let outcome = three_way_merge(
            &json!({"notes": "n"}),
            &json!({"notes": "edited"}),
            &json!({}),
            &no_window(),
        );
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::Deletion);
        assert_eq!(outcome.conflicts[0].remote, None);
    }

    #[test]
    fn status_field_conflicts_are_status_mismatch() {
        let outcome = three_way_merge(
            &json!({"status": "draft"}),
            &json!({"status": "approved"}),
            &json!({"status": "rejected"}),
            &no_window(),
        );
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::StatusMismatch);
    }

    #[test]
    fn near_simultaneous_edits_are_concurrent_modification() {
        let base_time: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap();
        let window = ModificationWindow {
            local_modified_at: Some(base_time),
            remote_modified_at: Some(base_time + Duration::seconds(90)),
            window_seconds: 300,
        };
        let outcome = three_way_merge(
            &json!({"title": "A"}),
            &json!({"title": "B"}),
            &json!({"title": "C"}),
            &window,
        );
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::ConcurrentModification);
    }

    #[test]
    fn edits_outside_the_window_are_plain_field_changes() {
        let base_time: DateTime<FixedOffset> =
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap();
        let window = ModificationWindow {
            local_modified_at: Some(base_time),
            remote_modified_at: Some(base_time + Duration::seconds(3600)),
            window_seconds: 300,
        };
        let outcome = three_way_merge(
            &json!({"title": "A"}),
            &json!({"title": "B"}),
            &json!({"title": "C"}),
            &window,
        );
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::FieldChange);
    }

    #[test]
    fn null_is_treated_as_absent() {
        let outcome = three_way_merge(
            &json!({"notes": "n"}),
            &json!({"notes": null}),
            &json!({"notes": "n"}),
            &no_window(),
        );
        // Local tombstoned it, remote untouched: the deletion sticks.
        assert!(outcome.conflicts.is_empty());
        assert!(!outcome.merged.contains_key("notes"));
    }

    #[test]
    fn fields_added_on_one_side_survive_the_merge() {
        let outcome = three_way_merge(
            &json!({}),
            &json!({"local_only": 1}),
            &json!({"remote_only": 2}),
            &no_window(),
        );
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.merged["local_only"], json!(1));
        assert_eq!(outcome.merged["remote_only"], json!(2));
    }

    #[test]
    fn merge_values_unions_arrays_keeping_local_order() {
        let merged = merge_values(
            Some(&json!(["alice", "bob"])),
            Some(&json!(["bob", "carol"])),
        );
        assert_eq!(merged, json!(["alice", "bob", "carol"]));
    }

    #[test]
    fn merge_values_shallow_merges_objects_without_overriding_local() {
        let merged = merge_values(
            Some(&json!({"a": 1, "b": 2})),
            Some(&json!({"b": 99, "c": 3})),
        );
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn merge_values_concatenates_strings_with_separator() {
        let merged = merge_values(Some(&json!("local text")), Some(&json!("remote text")));
        assert_eq!(merged, json!("local text | remote text"));
    }

    #[test]
    fn merge_values_takes_remote_for_diverging_scalars() {
        assert_eq!(merge_values(Some(&json!(1)), Some(&json!(2))), json!(2));
    }

    #[test]
    fn merge_values_with_one_absent_side_takes_the_other() {
        assert_eq!(merge_values(Some(&json!("x")), None), json!("x"));
        assert_eq!(merge_values(None, Some(&json!("y"))), json!("y"));
    }
}
