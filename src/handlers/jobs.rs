//! # Jobs API Handlers
//!
//! Handlers for inspecting and managing sync jobs: listing with filters,
//! fetching a single job, cancellation, failed-subset retry, and queue
//! statistics.

use crate::error::{ApiError, validation_error};
use crate::models::sync_job;
use crate::server::AppState;
use crate::sync::queue::QueueStats;
use crate::sync::{JobStatus, OperationKind};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by job status (pending, in_progress, completed, failed,
    /// retrying, cancelled)
    pub status: Option<String>,
    /// Filter by operation kind (create, update, bulk_import, bulk_export,
    /// mapping_sync, webhook_sync)
    pub operation: Option<String>,
    /// Maximum number of jobs to return (default: 50, max: 100)
    pub limit: Option<u32>,
    /// Opaque cursor for pagination
    pub cursor: Option<String>,
}

/// Job information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique identifier for the sync job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Direction of the pass
    #[schema(example = "jira_to_brd")]
    pub direction: String,
    /// Operation kind
    #[schema(example = "bulk_import")]
    pub operation: String,
    /// Current lifecycle status
    #[schema(example = "pending")]
    pub status: String,
    /// Mapping this job operates on, when it targets a single mapping
    pub mapping_id: Option<String>,
    /// BRD identifier for single-record operations
    pub brd_id: Option<String>,
    /// Jira issue key for single-record operations
    #[schema(example = "PROJ-123")]
    pub jira_key: Option<String>,
    /// Jira project key for bulk operations
    #[schema(example = "PROJ")]
    pub project_key: Option<String>,
    /// Integer progress percentage, 0..=100
    #[schema(example = 100)]
    pub progress: i32,
    /// Total number of items this job covers
    #[schema(example = 3)]
    pub total_items: i32,
    /// Items processed successfully so far
    pub processed_items: i32,
    /// Items that failed permanently within this run
    pub failed_items: i32,
    /// Per-item failure records accumulated by bulk operations
    pub item_failures: Option<JsonValue>,
    /// Number of retries consumed so far
    pub retry_count: i32,
    /// Retry budget for this job
    pub max_retries: i32,
    /// Whether a caller asked for cancellation
    pub cancel_requested: bool,
    /// Job this one was forked from by a failed-subset retry
    pub parent_job_id: Option<String>,
    /// Structured error details if the job failed
    pub error: Option<JsonValue>,
    /// Timestamp when the job was enqueued
    #[schema(example = "2021-01-01T00:00:00Z")]
    pub created_at: String,
    /// Timestamp when the job first started execution
    pub started_at: Option<String>,
    /// Timestamp when the job reached a terminal status
    pub finished_at: Option<String>,
}

impl From<sync_job::Model> for JobInfo {
    fn from(model: sync_job::Model) -> Self {
        Self {
            id: model.id.to_string(),
            direction: model.direction,
            operation: model.operation,
            status: model.status,
            mapping_id: model.mapping_id.map(|id| id.to_string()),
            brd_id: model.brd_id,
            jira_key: model.jira_key,
            project_key: model.project_key,
            progress: model.progress,
            total_items: model.total_items,
            processed_items: model.processed_items,
            failed_items: model.failed_items,
            item_failures: model.item_failures,
            retry_count: model.retry_count,
            max_retries: model.max_retries,
            cancel_requested: model.cancel_requested,
            parent_job_id: model.parent_job_id.map(|id| id.to_string()),
            error: model.error,
            created_at: model.created_at.to_rfc3339(),
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            finished_at: model.finished_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Response payload for the jobs listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    /// List of jobs matching the query
    pub jobs: Vec<JobInfo>,
    /// Opaque cursor for fetching the next page (null if no more pages)
    pub next_cursor: Option<String>,
}

/// Response payload for a cancellation request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelJobResponse {
    /// What the cancellation request did: "cancelled" when the job was
    /// still waiting, "cancel_requested" when it is running and will stop
    /// at its next checkpoint
    #[schema(example = "cancel_requested")]
    pub outcome: String,
    /// The job after the request was applied
    pub job: JobInfo,
}

/// List sync jobs, newest first
#[utoipa::path(
    get,
    path = "/sync/jobs",
    params(
        ("status" = Option<String>, Query, description = "Filter by job status"),
        ("operation" = Option<String>, Query, description = "Filter by operation kind"),
        ("limit" = Option<u32>, Query, description = "Page size (default 50, max 100)"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
    ),
    responses(
        (status = 200, description = "Jobs matching the query", body = JobsResponse),
        (status = 400, description = "Invalid filter or cursor"),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    if let Some(status) = query.status.as_deref()
        && JobStatus::parse(status).is_none()
    {
        return Err(validation_error(
            "Unknown job status",
            json!({ "status": status }),
        ));
    }
    if let Some(operation) = query.operation.as_deref()
        && OperationKind::parse(operation).is_none()
    {
        return Err(validation_error(
            "Unknown operation kind",
            json!({ "operation": operation }),
        ));
    }

    let limit = super::page_limit(query.limit)?;
    let (rows, next_cursor) = state
        .jobs
        .list(
            query.status.as_deref(),
            query.operation.as_deref(),
            limit,
            query.cursor,
        )
        .await?;

    Ok(Json(JobsResponse {
        jobs: rows.into_iter().map(JobInfo::from).collect(),
        next_cursor,
    }))
}

/// Fetch a single job by id
#[utoipa::path(
    get,
    path = "/sync/jobs/{id}",
    params(("id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "The job", body = JobInfo),
        (status = 404, description = "No such job"),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobInfo>, ApiError> {
    let job = state.jobs.get_required(id).await?;
    Ok(Json(JobInfo::from(job)))
}

/// Cancel a job
///
/// Waiting jobs are cancelled immediately; running jobs stop at their
/// next checkpoint.
#[utoipa::path(
    post,
    path = "/sync/jobs/{id}/cancel",
    params(("id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Cancellation applied or requested", body = CancelJobResponse),
        (status = 404, description = "No such job"),
        (status = 409, description = "Job already finished"),
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    use crate::repositories::CancelOutcome;

    let (job, outcome) = state.jobs.request_cancel(id).await?;
    let outcome = match outcome {
        CancelOutcome::Cancelled => "cancelled",
        CancelOutcome::CancelRequested => "cancel_requested",
    };

    Ok(Json(CancelJobResponse {
        outcome: outcome.to_string(),
        job: JobInfo::from(job),
    }))
}

/// Retry the failed items of a finished bulk job
///
/// Enqueues a fresh job covering only the items that failed, referencing
/// the original through `parent_job_id`.
#[utoipa::path(
    post,
    path = "/sync/jobs/{id}/retry",
    params(("id" = Uuid, Path, description = "Job identifier")),
    responses(
        (status = 202, description = "Retry job enqueued", body = JobInfo),
        (status = 404, description = "No such job"),
        (status = 409, description = "Job is not finished or has no failed items"),
    ),
    tag = "jobs"
)]
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let job = state.orchestrator.retry_failed_items(id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}

/// Queue statistics: job counts by status
#[utoipa::path(
    get,
    path = "/sync/queue/stats",
    responses(
        (status = 200, description = "Job counts by status", body = QueueStats),
    ),
    tag = "jobs"
)]
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}
