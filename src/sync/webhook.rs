//! Jira webhook events
//!
//! Payload types for Jira webhook deliveries and the pure routing
//! decision that turns one into a resync intent. Deciding is separated
//! from enqueueing so the routing rules are testable without I/O: the
//! handler verifies the signature, parses the payload, calls [`decide`],
//! and only then touches the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::SyncDirection;
use crate::models::sync_mapping::Model as SyncMappingModel;

/// Webhook event names that describe a change worth syncing.
const SYNCABLE_EVENTS: &[&str] = &["jira:issue_updated", "jira:issue_created"];

/// One changelog entry in a Jira webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangelogItem {
    /// Field that changed
    pub field: String,
    /// Value before the change, as Jira renders it
    #[serde(default, rename = "fromString")]
    pub from_string: Option<String>,
    /// Value after the change
    #[serde(default, rename = "toString")]
    pub to_string: Option<String>,
}

/// Changelog block of a Jira webhook delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Changelog {
    #[serde(default)]
    pub items: Vec<ChangelogItem>,
}

/// Issue block of a Jira webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookIssue {
    /// Issue key (e.g. PROJ-123)
    pub key: String,
    /// Raw field values at event time
    #[serde(default)]
    pub fields: Option<JsonValue>,
}

/// A Jira webhook delivery, reduced to the parts the router inspects.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JiraWebhookEvent {
    /// Event name (e.g. jira:issue_updated)
    #[serde(rename = "webhookEvent")]
    pub webhook_event: String,
    pub issue: WebhookIssue,
    #[serde(default)]
    pub changelog: Option<Changelog>,
}

/// Why a webhook delivery was acknowledged without creating a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The event name is not one we sync on.
    IrrelevantEvent,
    /// No mapping exists for the issue key.
    NoMapping,
    /// The mapping exists but has sync disabled.
    SyncDisabled,
    /// The mapping exists but does not follow webhook events.
    AutoSyncDisabled,
}

impl DropReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            DropReason::IrrelevantEvent => "irrelevant_event",
            DropReason::NoMapping => "no_mapping",
            DropReason::SyncDisabled => "sync_disabled",
            DropReason::AutoSyncDisabled => "auto_sync_disabled",
        }
    }
}

/// Routing verdict for one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookDecision {
    /// Enqueue a resync of this mapping, pulling the remote change in.
    Resync {
        mapping_id: Uuid,
        direction: SyncDirection,
    },
    /// Acknowledge and do nothing.
    Drop(DropReason),
}

/// Decide what to do with a verified, parsed webhook delivery.
///
/// Pure: the caller looks up the mapping by issue key and passes it in.
pub fn decide(event: &JiraWebhookEvent, mapping: Option<&SyncMappingModel>) -> WebhookDecision {
    if !SYNCABLE_EVENTS.contains(&event.webhook_event.as_str()) {
        return WebhookDecision::Drop(DropReason::IrrelevantEvent);
    }

    let Some(mapping) = mapping else {
        return WebhookDecision::Drop(DropReason::NoMapping);
    };

    if !mapping.sync_enabled {
        return WebhookDecision::Drop(DropReason::SyncDisabled);
    }
    if !mapping.auto_sync {
        return WebhookDecision::Drop(DropReason::AutoSyncDisabled);
    }

    WebhookDecision::Resync {
        mapping_id: mapping.id,
        direction: SyncDirection::JiraToBrd,
    }
}
