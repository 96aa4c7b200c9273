//! # Mappings API Handlers
//!
//! Handlers for the BRD-to-Jira mapping registry: listing, inspection,
//! enable/disable, auto-sync toggling, and manual resync.

use crate::error::{ApiError, validation_error};
use crate::models::sync_mapping;
use crate::server::AppState;
use crate::sync::SyncDirection;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::jobs::JobInfo;

/// Query parameters for listing mappings
#[derive(Debug, Deserialize)]
pub struct ListMappingsQuery {
    /// Only return mappings with sync enabled
    pub enabled_only: Option<bool>,
    /// Maximum number of mappings to return (default: 50, max: 100)
    pub limit: Option<u32>,
    /// Opaque cursor for pagination
    pub cursor: Option<String>,
}

/// Mapping information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MappingInfo {
    /// Unique identifier for the mapping
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// BRD identifier
    #[schema(example = "brd-42")]
    pub brd_id: String,
    /// Jira issue key
    #[schema(example = "PROJ-123")]
    pub jira_key: String,
    /// Jira project key portion of the issue key
    #[schema(example = "PROJ")]
    pub jira_project_key: Option<String>,
    /// Whether this mapping participates in sync at all
    pub sync_enabled: bool,
    /// Whether webhook events for this issue trigger automatic sync
    pub auto_sync: bool,
    /// Total number of conflicts ever detected for this mapping
    pub conflict_count: i32,
    /// Timestamp of the last successful sync in either direction
    pub last_synced_at: Option<String>,
    /// Last known modification time of the BRD side
    pub last_modified_local: Option<String>,
    /// Last known modification time of the Jira side
    pub last_modified_remote: Option<String>,
    /// Timestamp when the mapping was created
    #[schema(example = "2021-01-01T00:00:00Z")]
    pub created_at: String,
    /// Timestamp when the mapping was last updated
    pub updated_at: String,
}

impl From<sync_mapping::Model> for MappingInfo {
    fn from(model: sync_mapping::Model) -> Self {
        Self {
            id: model.id.to_string(),
            brd_id: model.brd_id,
            jira_key: model.jira_key,
            jira_project_key: model.jira_project_key,
            sync_enabled: model.sync_enabled,
            auto_sync: model.auto_sync,
            conflict_count: model.conflict_count,
            last_synced_at: model.last_synced_at.map(|dt| dt.to_rfc3339()),
            last_modified_local: model.last_modified_local.map(|dt| dt.to_rfc3339()),
            last_modified_remote: model.last_modified_remote.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Response payload for the mappings listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MappingsResponse {
    /// List of mappings matching the query
    pub mappings: Vec<MappingInfo>,
    /// Opaque cursor for fetching the next page (null if no more pages)
    pub next_cursor: Option<String>,
}

/// Request body for toggling auto-sync on a mapping
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AutoSyncRequest {
    /// Whether webhook events should trigger automatic sync
    pub enabled: bool,
}

/// Request body for a manual resync
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ResyncRequest {
    /// Direction of the pass (jira_to_brd, brd_to_jira, bidirectional);
    /// defaults to bidirectional
    #[serde(default)]
    pub direction: Option<String>,
}

/// List mappings, newest first
#[utoipa::path(
    get,
    path = "/sync/mappings",
    params(
        ("enabled_only" = Option<bool>, Query, description = "Only return mappings with sync enabled"),
        ("limit" = Option<u32>, Query, description = "Page size (default 50, max 100)"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
    ),
    responses(
        (status = 200, description = "Mappings matching the query", body = MappingsResponse),
        (status = 400, description = "Invalid cursor"),
    ),
    tag = "mappings"
)]
pub async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<ListMappingsQuery>,
) -> Result<Json<MappingsResponse>, ApiError> {
    let limit = super::page_limit(query.limit)?;
    let (rows, next_cursor) = state
        .mappings
        .list(query.enabled_only.unwrap_or(false), limit, query.cursor)
        .await?;

    Ok(Json(MappingsResponse {
        mappings: rows.into_iter().map(MappingInfo::from).collect(),
        next_cursor,
    }))
}

/// Fetch a single mapping by id
#[utoipa::path(
    get,
    path = "/sync/mappings/{id}",
    params(("id" = Uuid, Path, description = "Mapping identifier")),
    responses(
        (status = 200, description = "The mapping", body = MappingInfo),
        (status = 404, description = "No such mapping"),
    ),
    tag = "mappings"
)]
pub async fn get_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MappingInfo>, ApiError> {
    let mapping = state.mappings.get_required(id).await?;
    Ok(Json(MappingInfo::from(mapping)))
}

/// Enable sync for a mapping
#[utoipa::path(
    post,
    path = "/sync/mappings/{id}/enable",
    params(("id" = Uuid, Path, description = "Mapping identifier")),
    responses(
        (status = 200, description = "Mapping enabled", body = MappingInfo),
        (status = 404, description = "No such mapping"),
    ),
    tag = "mappings"
)]
pub async fn enable_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MappingInfo>, ApiError> {
    let mapping = state.mappings.set_enabled(id, true).await?;
    Ok(Json(MappingInfo::from(mapping)))
}

/// Disable sync for a mapping
///
/// Disabled mappings are skipped by resyncs, bulk passes, and webhook
/// routing until re-enabled.
#[utoipa::path(
    post,
    path = "/sync/mappings/{id}/disable",
    params(("id" = Uuid, Path, description = "Mapping identifier")),
    responses(
        (status = 200, description = "Mapping disabled", body = MappingInfo),
        (status = 404, description = "No such mapping"),
    ),
    tag = "mappings"
)]
pub async fn disable_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MappingInfo>, ApiError> {
    let mapping = state.mappings.set_enabled(id, false).await?;
    Ok(Json(MappingInfo::from(mapping)))
}

/// Toggle webhook-driven auto-sync for a mapping
#[utoipa::path(
    post,
    path = "/sync/mappings/{id}/auto-sync",
    params(("id" = Uuid, Path, description = "Mapping identifier")),
    request_body = AutoSyncRequest,
    responses(
        (status = 200, description = "Auto-sync updated", body = MappingInfo),
        (status = 404, description = "No such mapping"),
    ),
    tag = "mappings"
)]
pub async fn set_auto_sync(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AutoSyncRequest>,
) -> Result<Json<MappingInfo>, ApiError> {
    let mapping = state.mappings.set_auto_sync(id, request.enabled).await?;
    Ok(Json(MappingInfo::from(mapping)))
}

/// Resync a mapping
///
/// Enqueues a three-way sync pass against the mapping's stored base
/// snapshot. Runs for one mapping never overlap; a request while another
/// job is in flight queues behind it.
#[utoipa::path(
    post,
    path = "/sync/mappings/{id}/resync",
    params(("id" = Uuid, Path, description = "Mapping identifier")),
    request_body = ResyncRequest,
    responses(
        (status = 202, description = "Resync job enqueued", body = JobInfo),
        (status = 400, description = "Unknown direction or sync disabled"),
        (status = 404, description = "No such mapping"),
    ),
    tag = "mappings"
)]
pub async fn resync_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<ResyncRequest>>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let requested = request.and_then(|Json(r)| r.direction);
    let direction = match requested.as_deref() {
        None => SyncDirection::Bidirectional,
        Some(value) => SyncDirection::parse(value).ok_or_else(|| {
            validation_error("Unknown sync direction", json!({ "direction": value }))
        })?,
    };

    let job = state.orchestrator.resync_mapping(id, direction).await?;
    Ok((StatusCode::ACCEPTED, Json(JobInfo::from(job))))
}
