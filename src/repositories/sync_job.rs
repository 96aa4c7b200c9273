//! # SyncJob Repository
//!
//! Persistence for the durable job queue. Claiming is a two-step
//! select-then-update inside one transaction so concurrent workers never
//! pick the same job, and jobs touching a mapping that already has an
//! in-progress job are left on the queue to keep per-mapping runs
//! serialized. Terminal rows are protected by conditional updates that
//! match on the expected current status.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, not_found};
use crate::models::sync_job::{ActiveModel, Column, Entity, Model};
use crate::sync::JobStatus;

/// Fields accepted when enqueueing a job.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub direction: String,
    pub operation: String,
    pub mapping_id: Option<Uuid>,
    pub brd_id: Option<String>,
    pub jira_key: Option<String>,
    pub project_key: Option<String>,
    pub payload: Option<JsonValue>,
    pub total_items: i32,
    pub max_retries: i32,
    pub parent_job_id: Option<Uuid>,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still waiting and is now terminally cancelled.
    Cancelled,
    /// The job is running; it will stop at its next checkpoint.
    CancelRequested,
}

/// Repository for sync job database operations
#[derive(Debug, Clone)]
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue a new job in `pending` status.
    pub async fn create(&self, new: NewSyncJob) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let job = ActiveModel {
            id: Set(id),
            direction: Set(new.direction),
            operation: Set(new.operation),
            status: Set(JobStatus::Pending.as_str().to_string()),
            mapping_id: Set(new.mapping_id),
            brd_id: Set(new.brd_id),
            jira_key: Set(new.jira_key),
            project_key: Set(new.project_key),
            payload: Set(new.payload),
            progress: Set(0),
            total_items: Set(new.total_items),
            processed_items: Set(0),
            failed_items: Set(0),
            item_failures: Set(None),
            retry_count: Set(0),
            max_retries: Set(new.max_retries),
            run_after: Set(None),
            cancel_requested: Set(false),
            parent_job_id: Set(new.parent_job_id),
            error: Set(None),
            created_at: Set(now),
            started_at: Set(None),
            finished_at: Set(None),
            updated_at: Set(now),
        };

        job.insert(&self.db).await?;

        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| not_found("job", &id.to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Model>, ApiError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn get_required(&self, id: Uuid) -> Result<Model, ApiError> {
        self.get(id)
            .await?
            .ok_or_else(|| not_found("job", &id.to_string()))
    }

    /// List jobs newest first with optional status/operation filters and
    /// keyset pagination.
    pub async fn list(
        &self,
        status: Option<&str>,
        operation: Option<&str>,
        limit: u64,
        cursor: Option<String>,
    ) -> Result<(Vec<Model>, Option<String>), ApiError> {
        if limit == 0 {
            return Ok((Vec::new(), cursor));
        }

        let mut query = Entity::find()
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id);

        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(operation) = operation {
            query = query.filter(Column::Operation.eq(operation));
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

    /// Atomically claim up to `batch` runnable jobs, moving them to
    /// `in_progress`.
    ///
    /// Runnable means `pending` or `retrying` with any `run_after` in the
    /// past, FIFO by creation time. Jobs whose mapping already has an
    /// in-progress job are skipped, and at most one job per mapping is
    /// claimed out of a single batch, so runs against one mapping never
    /// overlap.
    pub async fn claim_runnable(&self, batch: u64) -> Result<Vec<Model>, ApiError> {
        if batch == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let runnable = [
            JobStatus::Pending.as_str(),
            JobStatus::Retrying.as_str(),
        ];

        let eligible: Vec<(Uuid, Option<Uuid>)> = Entity::find()
            .select_only()
            .column(Column::Id)
            .column(Column::MappingId)
            .filter(Column::Status.is_in(runnable))
            .filter(
                Condition::any()
                    .add(Column::RunAfter.is_null())
                    .add(Column::RunAfter.lte(now)),
            )
            .filter(
                Condition::any().add(Column::MappingId.is_null()).add(
                    Column::MappingId.not_in_subquery(
                        Entity::find()
                            .select_only()
                            .column(Column::MappingId)
                            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
                            .filter(Column::MappingId.is_not_null())
                            .into_query(),
                    ),
                ),
            )
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .limit(batch * 4)
            .into_tuple()
            .all(&txn)
            .await?;

        // One job per mapping per batch; unmapped jobs are unconstrained.
        let mut seen_mappings = HashSet::new();
        let mut claim_ids = Vec::new();
        for (id, mapping_id) in eligible {
            if let Some(mapping_id) = mapping_id
                && !seen_mappings.insert(mapping_id)
            {
                continue;
            }
            claim_ids.push(id);
            if claim_ids.len() as u64 >= batch {
                break;
            }
        }

        if claim_ids.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(JobStatus::InProgress.as_str()),
            )
            .col_expr(Column::StartedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.is_in(claim_ids.clone()))
            .filter(Column::Status.is_in(runnable))
            .exec(&txn)
            .await?;

        let claimed = Entity::find()
            .filter(Column::Id.is_in(claim_ids))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&txn)
            .await?;

        txn.commit().await?;
        Ok(claimed)
    }

    /// Update item counters and progress on a running job. Returns false
    /// when the job is no longer in progress (nothing was written).
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        processed_items: i32,
        failed_items: i32,
        progress: i32,
        item_failures: Option<&JsonValue>,
    ) -> Result<bool, ApiError> {
        let mut update = Entity::update_many()
            .col_expr(Column::ProcessedItems, Expr::value(processed_items))
            .col_expr(Column::FailedItems, Expr::value(failed_items))
            .col_expr(Column::Progress, Expr::value(progress.clamp(0, 100)))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()));

        if let Some(failures) = item_failures {
            update = update.col_expr(Column::ItemFailures, Expr::value(failures.clone()));
        }

        let result = update
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Whether a caller has asked this job to stop.
    pub async fn is_cancel_requested(&self, job_id: Uuid) -> Result<bool, ApiError> {
        let flag: Option<bool> = Entity::find_by_id(job_id)
            .select_only()
            .column(Column::CancelRequested)
            .into_tuple()
            .one(&self.db)
            .await?;

        Ok(flag.unwrap_or(false))
    }

    /// Terminal success. Only legal from `in_progress`.
    pub async fn mark_completed(&self, job: &Model) -> Result<Model, ApiError> {
        self.finish(job, JobStatus::Completed, None).await
    }

    /// Terminal failure, once the retry budget is spent.
    pub async fn mark_failed(&self, job: &Model, error: JsonValue) -> Result<Model, ApiError> {
        self.finish(job, JobStatus::Failed, Some(error)).await
    }

    /// Terminal cancellation observed by the worker at a checkpoint.
    pub async fn mark_cancelled(&self, job: &Model) -> Result<Model, ApiError> {
        self.finish(job, JobStatus::Cancelled, None).await
    }

    async fn finish(
        &self,
        job: &Model,
        status: JobStatus,
        error: Option<JsonValue>,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::FinishedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        if status == JobStatus::Completed {
            update = update.col_expr(Column::Progress, Expr::value(100));
        }
        if let Some(error) = error {
            update = update.col_expr(Column::Error, Expr::value(error));
        }

        let result = update
            .filter(Column::Id.eq(job.id))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            tracing::warn!(
                job_id = %job.id,
                target_status = status.as_str(),
                "Job was not in progress when finishing; leaving it untouched"
            );
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "INVALID_STATE",
                "Job is not in progress",
            ));
        }

        self.get_required(job.id).await
    }

    /// Schedule another attempt after a transient failure: `retrying`
    /// status, incremented retry count, and a wake-up time.
    pub async fn mark_retrying(
        &self,
        job: &Model,
        run_after: DateTime<FixedOffset>,
        error: JsonValue,
    ) -> Result<Model, ApiError> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Retrying.as_str()))
            .col_expr(
                Column::RetryCount,
                Expr::col(Column::RetryCount).add(1),
            )
            .col_expr(Column::RunAfter, Expr::value(run_after))
            .col_expr(Column::Error, Expr::value(error))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job.id))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "INVALID_STATE",
                "Job is not in progress",
            ));
        }

        self.get_required(job.id).await
    }

    /// Cancel a job. Waiting jobs become `cancelled` immediately; a
    /// running job gets its cancellation flag set and stops at the next
    /// checkpoint. Terminal jobs reject the request.
    pub async fn request_cancel(&self, job_id: Uuid) -> Result<(Model, CancelOutcome), ApiError> {
        let job = self.get_required(job_id).await?;
        let status = JobStatus::parse(&job.status).ok_or_else(|| {
            ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Job has an unknown status",
            )
        })?;

        let now = Utc::now().fixed_offset();

        match status {
            JobStatus::Pending | JobStatus::Retrying => {
                let result = Entity::update_many()
                    .col_expr(
                        Column::Status,
                        Expr::value(JobStatus::Cancelled.as_str()),
                    )
                    .col_expr(Column::FinishedAt, Expr::value(now))
                    .col_expr(Column::UpdatedAt, Expr::value(now))
                    .filter(Column::Id.eq(job_id))
                    .filter(Column::Status.eq(job.status.clone()))
                    .exec(&self.db)
                    .await?;

                if result.rows_affected == 0 {
                    // Lost the race with a worker claim; fall back to the flag.
                    return self.flag_cancel(job_id).await;
                }

                Ok((self.get_required(job_id).await?, CancelOutcome::Cancelled))
            }
            JobStatus::InProgress => self.flag_cancel(job_id).await,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                Err(ApiError::new(
                    axum::http::StatusCode::CONFLICT,
                    "INVALID_STATE",
                    "Job has already finished",
                ))
            }
        }
    }

    async fn flag_cancel(&self, job_id: Uuid) -> Result<(Model, CancelOutcome), ApiError> {
        Entity::update_many()
            .col_expr(Column::CancelRequested, Expr::value(true))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .exec(&self.db)
            .await?;

        Ok((
            self.get_required(job_id).await?,
            CancelOutcome::CancelRequested,
        ))
    }

    /// Requeue jobs left `in_progress` by a previous process. Run once at
    /// startup, before workers begin; the jobs re-enter through the
    /// `retrying` path without consuming a retry.
    pub async fn requeue_orphaned(&self) -> Result<u64, ApiError> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Retrying.as_str()))
            .col_expr(Column::RunAfter, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(JobStatus::InProgress.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::warn!(
                count = result.rows_affected,
                "Requeued jobs orphaned by a previous process"
            );
        }

        Ok(result.rows_affected)
    }

    /// Job counts per status, for the queue stats endpoint.
    pub async fn count_by_status(&self) -> Result<Vec<(String, i64)>, ApiError> {
        Ok(Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "count")
            .group_by(Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?)
    }
}
