//! # SyncMapping Repository
//!
//! Persistence for BRD-to-Jira issue pairings. Mappings are never hard
//! deleted; disabling sync keeps the row for audit continuity. The
//! conflict counter only ever moves up, via an atomic in-database add.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, not_found};
use crate::models::sync_mapping::{ActiveModel, Column, Entity, Model};

/// Repository for sync mapping database operations
#[derive(Debug, Clone)]
pub struct SyncMappingRepository {
    db: DatabaseConnection,
}

/// Timestamps and snapshot recorded after a successful sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncedUpdate {
    pub last_modified_local: Option<DateTime<FixedOffset>>,
    pub last_modified_remote: Option<DateTime<FixedOffset>>,
    pub base_snapshot: Option<JsonValue>,
}

impl SyncMappingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a mapping for a new BRD/issue pair. A duplicate `jira_key`
    /// surfaces as a unique violation and maps to 409.
    pub async fn create(
        &self,
        brd_id: &str,
        jira_key: &str,
        jira_project_key: Option<&str>,
        auto_sync: bool,
        base_snapshot: Option<JsonValue>,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let mapping = ActiveModel {
            id: Set(id),
            brd_id: Set(brd_id.to_string()),
            jira_key: Set(jira_key.to_string()),
            jira_project_key: Set(jira_project_key.map(str::to_string)),
            sync_enabled: Set(true),
            auto_sync: Set(auto_sync),
            conflict_count: Set(0),
            last_synced_at: Set(Some(now)),
            last_modified_local: Set(Some(now)),
            last_modified_remote: Set(Some(now)),
            base_snapshot: Set(base_snapshot),
            created_at: Set(now),
            updated_at: Set(now),
        };

        mapping.insert(&self.db).await?;

        // SQLite does not return the inserted row; fetch it by id.
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("mapping", &id.to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Load a mapping or fail with 404.
    pub async fn get_required(&self, id: Uuid) -> Result<Model, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| not_found("mapping", &id.to_string()))
    }

    pub async fn find_by_jira_key(&self, jira_key: &str) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::JiraKey.eq(jira_key))
            .one(&self.db)
            .await?)
    }

    pub async fn find_by_pair(
        &self,
        brd_id: &str,
        jira_key: &str,
    ) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::BrdId.eq(brd_id))
            .filter(Column::JiraKey.eq(jira_key))
            .one(&self.db)
            .await?)
    }

    pub async fn find_by_brd(&self, brd_id: &str) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::BrdId.eq(brd_id))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    /// List mappings newest first with keyset pagination.
    pub async fn list(
        &self,
        enabled_only: bool,
        limit: u64,
        cursor: Option<String>,
    ) -> Result<(Vec<Model>, Option<String>), ApiError> {
        if limit == 0 {
            return Ok((Vec::new(), cursor));
        }

        let mut query = Entity::find()
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id);

        if enabled_only {
            query = query.filter(Column::SyncEnabled.eq(true));
        }

        if let Some(cursor) = cursor
            && !cursor.is_empty()
        {
            let position = decode_cursor(&cursor)?;
            let condition = Condition::any()
                .add(Column::CreatedAt.lt(position.created_at))
                .add(
                    Condition::all()
                        .add(Column::CreatedAt.eq(position.created_at))
                        .add(Column::Id.lt(position.id)),
                );
            query = query.filter(condition);
        }

        let mut rows = query.limit(limit + 1).all(&self.db).await?;

        let next_cursor = if rows.len() as u64 > limit {
            rows.pop();
            rows.last()
                .map(|last| encode_cursor(&last.created_at.with_timezone(&Utc), &last.id))
        } else {
            None
        };

        Ok((rows, next_cursor))
    }

    /// Record a successful sync pass: bump `last_synced_at`, refresh the
    /// modification timestamps and the three-way-merge base snapshot.
    pub async fn record_synced(
        &self,
        id: Uuid,
        update: SyncedUpdate,
    ) -> Result<Model, ApiError> {
        let existing = self.get_required(id).await?;
        let now = Utc::now().fixed_offset();

        let mut active: ActiveModel = existing.into();
        active.last_synced_at = Set(Some(now));
        if update.last_modified_local.is_some() {
            active.last_modified_local = Set(update.last_modified_local);
        }
        if update.last_modified_remote.is_some() {
            active.last_modified_remote = Set(update.last_modified_remote);
        }
        if update.base_snapshot.is_some() {
            active.base_snapshot = Set(update.base_snapshot);
        }
        active.updated_at = Set(now);

        Ok(active.update(&self.db).await?)
    }

    /// Atomically add to the conflict counter. The counter is monotonic;
    /// nothing ever subtracts from it.
    pub async fn add_conflicts(&self, id: Uuid, detected: u32) -> Result<(), ApiError> {
        if detected == 0 {
            return Ok(());
        }

        let result = Entity::update_many()
            .col_expr(
                Column::ConflictCount,
                Expr::col(Column::ConflictCount).add(detected as i32),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(not_found("mapping", &id.to_string()));
        }

        Ok(())
    }

    /// Soft-disable or re-enable sync. Rows are never deleted.
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Model, ApiError> {
        let existing = self.get_required(id).await?;

        let mut active: ActiveModel = existing.into();
        active.sync_enabled = Set(enabled);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    pub async fn set_auto_sync(&self, id: Uuid, auto_sync: bool) -> Result<Model, ApiError> {
        let existing = self.get_required(id).await?;

        let mut active: ActiveModel = existing.into();
        active.auto_sync = Set(auto_sync);
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }
}
