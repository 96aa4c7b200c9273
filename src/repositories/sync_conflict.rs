//! # SyncConflict Repository
//!
//! Persistence for the append-only conflict register. Detection writes
//! conflicts and bumps the mapping's conflict counter in one transaction.
//! Resolution primitives are conditional updates matching `status =
//! 'pending'`, so a record that has been resolved or ignored can never be
//! written again, regardless of caller interleaving.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, not_found};
use crate::models::sync_conflict::{ActiveModel, Column, Entity, Model};
use crate::models::sync_mapping;
use crate::sync::ConflictStatus;

/// A conflict as reported by the merge pass, before persistence.
#[derive(Debug, Clone)]
pub struct NewSyncConflict {
    pub conflict_type: String,
    pub field: String,
    pub base_value: Option<JsonValue>,
    pub local_value: Option<JsonValue>,
    pub remote_value: Option<JsonValue>,
}

/// One resolution to apply, carrying the record's own resolved value.
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    pub conflict_id: Uuid,
    pub strategy: String,
    pub resolved_value: Option<JsonValue>,
    pub resolved_by: Option<String>,
}

/// Repository for conflict register database operations
#[derive(Debug, Clone)]
pub struct SyncConflictRepository {
    db: DatabaseConnection,
}

impl SyncConflictRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Persist freshly detected conflicts and bump the mapping's conflict
    /// counter, atomically.
    pub async fn record_detected(
        &self,
        mapping: &sync_mapping::Model,
        conflicts: Vec<NewSyncConflict>,
    ) -> Result<Vec<Model>, ApiError> {
        if conflicts.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;
        let mut ids = Vec::with_capacity(conflicts.len());

        for conflict in conflicts {
            let id = Uuid::new_v4();
            let row = ActiveModel {
                id: Set(id),
                mapping_id: Set(mapping.id),
                brd_id: Set(mapping.brd_id.clone()),
                jira_key: Set(mapping.jira_key.clone()),
                conflict_type: Set(conflict.conflict_type),
                field: Set(conflict.field),
                base_value: Set(conflict.base_value),
                local_value: Set(conflict.local_value),
                remote_value: Set(conflict.remote_value),
                status: Set(ConflictStatus::Pending.as_str().to_string()),
                resolution_strategy: Set(None),
                resolved_value: Set(None),
                resolved_by: Set(None),
                resolved_at: Set(None),
                detected_at: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
            };
            row.insert(&txn).await?;
            ids.push(id);
        }

        sync_mapping::Entity::update_many()
            .col_expr(
                sync_mapping::Column::ConflictCount,
                Expr::col(sync_mapping::Column::ConflictCount).add(ids.len() as i32),
            )
            .col_expr(sync_mapping::Column::UpdatedAt, Expr::value(now))
            .filter(sync_mapping::Column::Id.eq(mapping.id))
            .exec(&txn)
            .await?;

        let created = Entity::find()
            .filter(Column::Id.is_in(ids))
            .order_by_asc(Column::Field)
            .all(&txn)
            .await?;

        txn.commit().await?;
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn get_required(&self, id: Uuid) -> Result<Model, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| not_found("conflict", &id.to_string()))
    }

    /// List conflicts newest first with optional filters and keyset
    /// pagination.
    pub async fn list(
        &self,
        mapping_id: Option<Uuid>,
        brd_id: Option<&str>,
        status: Option<&str>,
        limit: u64,
        cursor: Option<String>,
    ) -> Result<(Vec<Model>, Option<String>), ApiError> {
        if limit == 0 {
            return Ok((Vec::new(), cursor));
        }

        let mut query = Entity::find()
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id);

        if let Some(mapping_id) = mapping_id {
            query = query.filter(Column::MappingId.eq(mapping_id));
        }
        if let Some(brd_id) = brd_id {
            query = query.filter(Column::BrdId.eq(brd_id));
        }
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
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

    /// All pending conflicts on a mapping.
    pub async fn pending_for_mapping(&self, mapping_id: Uuid) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::MappingId.eq(mapping_id))
            .filter(Column::Status.eq(ConflictStatus::Pending.as_str()))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Other pending conflicts on the same mapping and field, for
    /// apply-to-similar resolution.
    pub async fn similar_pending(
        &self,
        mapping_id: Uuid,
        field: &str,
        exclude: Uuid,
    ) -> Result<Vec<Model>, ApiError> {
        Ok(Entity::find()
            .filter(Column::MappingId.eq(mapping_id))
            .filter(Column::Field.eq(field))
            .filter(Column::Status.eq(ConflictStatus::Pending.as_str()))
            .filter(Column::Id.ne(exclude))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Apply a set of resolutions in one transaction. Each write matches
    /// only a still-pending row; records resolved concurrently are left
    /// untouched. Returns how many rows were actually resolved.
    pub async fn resolve_batch(
        &self,
        resolutions: &[ConflictResolution],
    ) -> Result<u64, ApiError> {
        if resolutions.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;
        let mut resolved = 0_u64;

        for resolution in resolutions {
            let result = Entity::update_many()
                .col_expr(
                    Column::Status,
                    Expr::value(ConflictStatus::Resolved.as_str()),
                )
                .col_expr(
                    Column::ResolutionStrategy,
                    Expr::value(resolution.strategy.clone()),
                )
                .col_expr(
                    Column::ResolvedValue,
                    Expr::value(resolution.resolved_value.clone()),
                )
                .col_expr(
                    Column::ResolvedBy,
                    Expr::value(resolution.resolved_by.clone()),
                )
                .col_expr(Column::ResolvedAt, Expr::value(now))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.eq(resolution.conflict_id))
                .filter(Column::Status.eq(ConflictStatus::Pending.as_str()))
                .exec(&txn)
                .await?;

            resolved += result.rows_affected;
        }

        txn.commit().await?;
        Ok(resolved)
    }

    /// Mark a pending conflict ignored. Returns false when the record was
    /// no longer pending.
    pub async fn ignore(
        &self,
        conflict_id: Uuid,
        resolved_by: Option<&str>,
    ) -> Result<bool, ApiError> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(ConflictStatus::Ignored.as_str()),
            )
            .col_expr(
                Column::ResolvedBy,
                Expr::value(resolved_by.map(str::to_string)),
            )
            .col_expr(Column::ResolvedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(conflict_id))
            .filter(Column::Status.eq(ConflictStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn count_pending(&self) -> Result<u64, ApiError> {
        Ok(Entity::find()
            .filter(Column::Status.eq(ConflictStatus::Pending.as_str()))
            .count(&self.db)
            .await?)
    }
}
