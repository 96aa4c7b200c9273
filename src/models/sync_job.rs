//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! which represents queued units of synchronization work. A row is the
//! durable record of one import, export, bulk pass, resync, or
//! webhook-triggered sync, including its retry and progress bookkeeping.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// SyncJob entity representing one queued unit of sync work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Direction of the pass (jira_to_brd, brd_to_jira, bidirectional)
    pub direction: String,

    /// Operation kind (create, update, bulk_import, bulk_export,
    /// mapping_sync, webhook_sync)
    pub operation: String,

    /// Current lifecycle status (pending, in_progress, completed, failed,
    /// retrying, cancelled)
    pub status: String,

    /// Mapping this job operates on, when it targets a single mapping
    pub mapping_id: Option<Uuid>,

    /// BRD identifier for single-record operations
    pub brd_id: Option<String>,

    /// Jira issue key for single-record operations
    pub jira_key: Option<String>,

    /// Jira project key for bulk operations scoped to a project
    pub project_key: Option<String>,

    /// Operation-specific input (bulk item lists, webhook event, overrides)
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// Integer progress percentage, 0..=100
    pub progress: i32,

    /// Total number of items this job covers (1 for single-record jobs)
    pub total_items: i32,

    /// Items processed successfully so far
    pub processed_items: i32,

    /// Items that failed permanently within this run
    pub failed_items: i32,

    /// Per-item failure records accumulated by bulk operations
    #[sea_orm(column_type = "JsonBinary")]
    pub item_failures: Option<JsonValue>,

    /// Number of retries consumed so far
    pub retry_count: i32,

    /// Retry budget for this job
    pub max_retries: i32,

    /// Earliest time a retrying job may be picked up again
    pub run_after: Option<DateTimeWithTimeZone>,

    /// Set when a caller asked for cancellation; honored at the next
    /// checkpoint of a running job
    pub cancel_requested: bool,

    /// Job this one was forked from by a failed-subset retry
    pub parent_job_id: Option<Uuid>,

    /// Structured error details if the job failed
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    /// Timestamp when the job was enqueued
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job first started execution
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job reached a terminal status
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
