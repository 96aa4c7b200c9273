//! # Sync Intent Handlers
//!
//! Handlers that accept sync requests and enqueue jobs: single import and
//! export plus their bulk variants. All of them validate and return 202
//! with the queued job; the actual work happens on the worker pool.

use crate::error::{ApiError, validation_error};
use crate::server::AppState;
use crate::sync::ResolutionStrategy;
use crate::sync::orchestrator::BulkOptions;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::jobs::JobInfo;

/// Request body for importing a single Jira issue as a new BRD
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// Jira issue key to import
    #[schema(example = "PROJ-123")]
    pub jira_key: String,
    /// Jira project the issue belongs to
    #[schema(example = "PROJ")]
    pub project_key: String,
}

/// Request body for exporting a single BRD as a new Jira issue
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// BRD identifier to export
    #[schema(example = "brd-42")]
    pub brd_id: String,
    /// Jira project to create the issue in
    #[schema(example = "PROJ")]
    pub project_key: String,
}

/// Request body for a bulk import
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportRequest {
    /// Jira issue keys to import (at most 100)
    pub jira_keys: Vec<String>,
    /// Jira project the issues belong to
    #[schema(example = "PROJ")]
    pub project_key: String,
    /// Resolve conflicts raised during the pass automatically
    #[serde(default)]
    pub auto_resolve_conflicts: Option<bool>,
    /// Strategy for automatic resolution (keep_local, keep_remote, merge)
    #[serde(default)]
    pub strategy: Option<String>,
}

/// Request body for a bulk export
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkExportRequest {
    /// BRD identifiers to export (at most 100)
    pub brd_ids: Vec<String>,
    /// Jira project to create the issues in
    #[schema(example = "PROJ")]
    pub project_key: String,
    /// Resolve conflicts raised during the pass automatically
    #[serde(default)]
    pub auto_resolve_conflicts: Option<bool>,
    /// Strategy for automatic resolution (keep_local, keep_remote, merge)
    #[serde(default)]
    pub strategy: Option<String>,
}

fn bulk_options(
    auto_resolve: Option<bool>,
    strategy: Option<&str>,
) -> Result<BulkOptions, ApiError> {
    let default_strategy = strategy
        .map(|s| {
            ResolutionStrategy::parse(s)
                .ok_or_else(|| validation_error("Unknown resolution strategy", json!({ "strategy": s })))
        })
        .transpose()?;

    Ok(BulkOptions {
        auto_resolve_conflicts: auto_resolve.unwrap_or(false),
        default_strategy,
    })
}

/// Import a Jira issue as a new BRD
#[utoipa::path(
    post,
    path = "/sync/import",
    request_body = ImportRequest,
    responses(
        (status = 202, description = "Import job enqueued", body = JobInfo),
        (status = 400, description = "Missing or blank fields"),
        (status = 409, description = "Issue is already mapped"),
    ),
    tag = "sync"
)]
pub async fn import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let job = state
        .orchestrator
        .import_epic(&request.jira_key, &request.project_key)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}

/// Export a BRD as a new Jira issue
#[utoipa::path(
    post,
    path = "/sync/export",
    request_body = ExportRequest,
    responses(
        (status = 202, description = "Export job enqueued", body = JobInfo),
        (status = 400, description = "Missing or blank fields"),
        (status = 409, description = "BRD is already mapped"),
    ),
    tag = "sync"
)]
pub async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let job = state
        .orchestrator
        .export_brd(&request.brd_id, &request.project_key)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}

/// Import many Jira issues in one job
///
/// Items are processed in order; individual failures are recorded on the
/// job without aborting the batch. Batches are capped at 100 items.
#[utoipa::path(
    post,
    path = "/sync/bulk/import",
    request_body = BulkImportRequest,
    responses(
        (status = 202, description = "Bulk import job enqueued", body = JobInfo),
        (status = 400, description = "Empty batch, oversized batch, or blank items"),
    ),
    tag = "sync"
)]
pub async fn bulk_import(
    State(state): State<AppState>,
    Json(request): Json<BulkImportRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let options = bulk_options(request.auto_resolve_conflicts, request.strategy.as_deref())?;
    let job = state
        .orchestrator
        .bulk_import(&request.jira_keys, &request.project_key, options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}

/// Export many BRDs in one job
#[utoipa::path(
    post,
    path = "/sync/bulk/export",
    request_body = BulkExportRequest,
    responses(
        (status = 202, description = "Bulk export job enqueued", body = JobInfo),
        (status = 400, description = "Empty batch, oversized batch, or blank items"),
    ),
    tag = "sync"
)]
pub async fn bulk_export(
    State(state): State<AppState>,
    Json(request): Json<BulkExportRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let options = bulk_options(request.auto_resolve_conflicts, request.strategy.as_deref())?;
    let job = state
        .orchestrator
        .bulk_export(&request.brd_ids, &request.project_key, options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}
