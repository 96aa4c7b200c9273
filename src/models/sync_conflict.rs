//! SyncConflict entity model
//!
//! This module contains the SeaORM entity model for the sync_conflicts table.
//! A row records one field-level disagreement between the BRD and Jira sides
//! of a mapping. The three value snapshots (base, local, remote) are captured
//! at detection time and never rewritten afterwards.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// SyncConflict entity representing one detected field-level disagreement
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_conflicts")]
pub struct Model {
    /// Unique identifier for the conflict (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Mapping this conflict belongs to
    pub mapping_id: Uuid,

    /// BRD identifier, denormalized for listing without a join
    pub brd_id: String,

    /// Jira issue key, denormalized for listing without a join
    pub jira_key: String,

    /// Kind of disagreement (field_change, status_mismatch, deletion,
    /// concurrent_modification)
    pub conflict_type: String,

    /// Field the two sides disagree on
    pub field: String,

    /// Value at the last agreed sync point, if one was recorded
    #[sea_orm(column_type = "JsonBinary")]
    pub base_value: Option<JsonValue>,

    /// BRD-side value at detection time
    #[sea_orm(column_type = "JsonBinary")]
    pub local_value: Option<JsonValue>,

    /// Jira-side value at detection time
    #[sea_orm(column_type = "JsonBinary")]
    pub remote_value: Option<JsonValue>,

    /// Review state (pending, resolved, ignored)
    pub status: String,

    /// Strategy used to settle the conflict, once resolved
    pub resolution_strategy: Option<String>,

    /// Value that won, once resolved
    #[sea_orm(column_type = "JsonBinary")]
    pub resolved_value: Option<JsonValue>,

    /// Who or what resolved the conflict (user id or "auto")
    pub resolved_by: Option<String>,

    /// Timestamp when the conflict was settled
    pub resolved_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the disagreement was detected
    pub detected_at: DateTimeWithTimeZone,

    /// Timestamp when the conflict row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the conflict row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sync_mapping::Entity",
        from = "Column::MappingId",
        to = "super::sync_mapping::Column::Id"
    )]
    SyncMapping,
}

impl Related<super::sync_mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncMapping.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
