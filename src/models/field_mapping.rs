//! FieldMapping entity model
//!
//! This module contains the SeaORM entity model for the field_mappings table,
//! which configures how individual fields translate between BRD documents and
//! Jira issues. A partial unique index guarantees at most one active rule per
//! (source_field, target_field, direction) triple.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// FieldMapping entity representing one field translation rule
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "field_mappings")]
pub struct Model {
    /// Unique identifier for the rule (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Field name on the source side
    pub source_field: String,

    /// Field name on the target side
    pub target_field: String,

    /// Direction this rule applies to (jira_to_brd, brd_to_jira, bidirectional)
    pub direction: String,

    /// Whether the Jira side is a custom field
    pub is_custom_field: bool,

    /// Jira custom field identifier (e.g. customfield_10001) when applicable
    pub jira_field_id: Option<String>,

    /// Named transformation applied to the value (direct, status_map, ...).
    /// NULL means direct.
    pub transform: Option<String>,

    /// Whether this rule is currently in force
    pub active: bool,

    /// Timestamp when the rule was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the rule was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
