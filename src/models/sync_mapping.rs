//! SyncMapping entity model
//!
//! This module contains the SeaORM entity model for the sync_mappings table,
//! which links one BRD requirement to one Jira issue and carries the state
//! needed for incremental and three-way synchronization.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// SyncMapping entity representing a BRD <-> Jira issue link
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_mappings")]
pub struct Model {
    /// Unique identifier for the mapping (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Identifier of the BRD requirement document
    pub brd_id: String,

    /// Jira issue key (e.g. PROJ-123), globally unique across mappings
    pub jira_key: String,

    /// Jira project key portion of the issue key
    pub jira_project_key: Option<String>,

    /// Whether this mapping participates in sync at all
    pub sync_enabled: bool,

    /// Whether webhook events for this issue trigger automatic sync
    pub auto_sync: bool,

    /// Total number of conflicts ever detected for this mapping
    pub conflict_count: i32,

    /// Timestamp of the last successful sync in either direction
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Last known modification time of the BRD side
    pub last_modified_local: Option<DateTimeWithTimeZone>,

    /// Last known modification time of the Jira side
    pub last_modified_remote: Option<DateTimeWithTimeZone>,

    /// Field snapshot captured at last successful sync, used as the
    /// three-way merge base
    #[sea_orm(column_type = "JsonBinary")]
    pub base_snapshot: Option<JsonValue>,

    /// Timestamp when the mapping was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the mapping was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sync_conflict::Entity")]
    SyncConflicts,
}

impl Related<super::sync_conflict::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncConflicts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
