//! # Conflicts API Handlers
//!
//! Handlers for the conflict review queue: listing pending and settled
//! conflicts, resolving with a strategy, and ignoring.

use crate::error::{ApiError, validation_error};
use crate::models::sync_conflict;
use crate::server::AppState;
use crate::sync::{ConflictStatus, ResolutionStrategy};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use utoipa::ToSchema;
use uuid::Uuid;

/// Query parameters for listing conflicts
#[derive(Debug, Deserialize)]
pub struct ListConflictsQuery {
    /// Filter by mapping identifier
    pub mapping_id: Option<Uuid>,
    /// Filter by BRD identifier
    pub brd_id: Option<String>,
    /// Filter by review state (pending, resolved, ignored)
    pub status: Option<String>,
    /// Maximum number of conflicts to return (default: 50, max: 100)
    pub limit: Option<u32>,
    /// Opaque cursor for pagination
    pub cursor: Option<String>,
}

/// Conflict information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConflictInfo {
    /// Unique identifier for the conflict
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Mapping this conflict belongs to
    pub mapping_id: String,
    /// BRD identifier
    #[schema(example = "brd-42")]
    pub brd_id: String,
    /// Jira issue key
    #[schema(example = "PROJ-123")]
    pub jira_key: String,
    /// Kind of disagreement
    #[schema(example = "field_change")]
    pub conflict_type: String,
    /// Field the two sides disagree on
    #[schema(example = "description")]
    pub field: String,
    /// Value at the last agreed sync point, if one was recorded
    pub base_value: Option<JsonValue>,
    /// BRD-side value at detection time
    pub local_value: Option<JsonValue>,
    /// Jira-side value at detection time
    pub remote_value: Option<JsonValue>,
    /// Review state
    #[schema(example = "pending")]
    pub status: String,
    /// Strategy used to settle the conflict, once resolved
    pub resolution_strategy: Option<String>,
    /// Value that won, once resolved
    pub resolved_value: Option<JsonValue>,
    /// Who or what resolved the conflict
    pub resolved_by: Option<String>,
    /// Timestamp when the conflict was settled
    pub resolved_at: Option<String>,
    /// Timestamp when the disagreement was detected
    #[schema(example = "2021-01-01T00:00:00Z")]
    pub detected_at: String,
    /// Timestamp when the conflict row was created
    pub created_at: String,
}

impl From<sync_conflict::Model> for ConflictInfo {
    fn from(model: sync_conflict::Model) -> Self {
        Self {
            id: model.id.to_string(),
            mapping_id: model.mapping_id.to_string(),
            brd_id: model.brd_id,
            jira_key: model.jira_key,
            conflict_type: model.conflict_type,
            field: model.field,
            base_value: model.base_value,
            local_value: model.local_value,
            remote_value: model.remote_value,
            status: model.status,
            resolution_strategy: model.resolution_strategy,
            resolved_value: model.resolved_value,
            resolved_by: model.resolved_by,
            resolved_at: model.resolved_at.map(|dt| dt.to_rfc3339()),
            detected_at: model.detected_at.to_rfc3339(),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Response payload for the conflicts listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConflictsResponse {
    /// List of conflicts matching the query
    pub conflicts: Vec<ConflictInfo>,
    /// Opaque cursor for fetching the next page (null if no more pages)
    pub next_cursor: Option<String>,
}

/// Request body for resolving a conflict
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// Resolution strategy (keep_local, keep_remote, merge, manual)
    #[schema(example = "keep_remote")]
    pub strategy: String,
    /// Winning value, required for the manual strategy
    #[serde(default)]
    pub resolved_value: Option<JsonValue>,
    /// Who is resolving (user id); defaults to unattributed
    #[serde(default)]
    pub resolved_by: Option<String>,
    /// Also resolve other pending conflicts on the same mapping and field
    #[serde(default)]
    pub apply_to_similar: Option<bool>,
}

/// Request body for ignoring a conflict
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreConflictRequest {
    /// Who is ignoring (user id); defaults to unattributed
    #[serde(default)]
    pub resolved_by: Option<String>,
}

/// Response payload for a resolution
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveConflictResponse {
    /// The conflict after resolution
    pub conflict: ConflictInfo,
    /// Similar conflicts settled in the same pass
    pub also_resolved: Vec<ConflictInfo>,
}

/// List conflicts, newest first
#[utoipa::path(
    get,
    path = "/sync/conflicts",
    params(
        ("mapping_id" = Option<Uuid>, Query, description = "Filter by mapping identifier"),
        ("brd_id" = Option<String>, Query, description = "Filter by BRD identifier"),
        ("status" = Option<String>, Query, description = "Filter by review state"),
        ("limit" = Option<u32>, Query, description = "Page size (default 50, max 100)"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
    ),
    responses(
        (status = 200, description = "Conflicts matching the query", body = ConflictsResponse),
        (status = 400, description = "Invalid filter or cursor"),
    ),
    tag = "conflicts"
)]
pub async fn list_conflicts(
    State(state): State<AppState>,
    Query(query): Query<ListConflictsQuery>,
) -> Result<Json<ConflictsResponse>, ApiError> {
    if let Some(status) = query.status.as_deref()
        && ConflictStatus::parse(status).is_none()
    {
        return Err(validation_error(
            "Unknown conflict status",
            json!({ "status": status }),
        ));
    }

    let limit = super::page_limit(query.limit)?;
    let (rows, next_cursor) = state
        .conflicts
        .list(
            query.mapping_id,
            query.brd_id.as_deref(),
            query.status.as_deref(),
            limit,
            query.cursor,
        )
        .await?;

    Ok(Json(ConflictsResponse {
        conflicts: rows.into_iter().map(ConflictInfo::from).collect(),
        next_cursor,
    }))
}

/// Fetch a single conflict by id
#[utoipa::path(
    get,
    path = "/sync/conflicts/{id}",
    params(("id" = Uuid, Path, description = "Conflict identifier")),
    responses(
        (status = 200, description = "The conflict", body = ConflictInfo),
        (status = 404, description = "No such conflict"),
    ),
    tag = "conflicts"
)]
pub async fn get_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConflictInfo>, ApiError> {
    let conflict = state.conflicts.get_required(id).await?;
    Ok(Json(ConflictInfo::from(conflict)))
}

/// Resolve a conflict with a strategy
///
/// Pending conflicts only; a settled conflict never changes again. With
/// `applyToSimilar`, other pending conflicts on the same mapping and
/// field are settled with the same strategy in one pass.
#[utoipa::path(
    post,
    path = "/sync/conflicts/{id}/resolve",
    params(("id" = Uuid, Path, description = "Conflict identifier")),
    request_body = ResolveConflictRequest,
    responses(
        (status = 200, description = "Conflict resolved", body = ResolveConflictResponse),
        (status = 400, description = "Unknown strategy or missing manual value"),
        (status = 404, description = "No such conflict"),
        (status = 409, description = "Conflict already settled"),
    ),
    tag = "conflicts"
)]
pub async fn resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveConflictRequest>,
) -> Result<Json<ResolveConflictResponse>, ApiError> {
    let strategy = ResolutionStrategy::parse(&request.strategy).ok_or_else(|| {
        validation_error(
            "Unknown resolution strategy",
            json!({ "strategy": request.strategy }),
        )
    })?;

    let report = state
        .resolver
        .resolve(
            id,
            strategy,
            request.resolved_value.as_ref(),
            request.resolved_by.as_deref(),
            request.apply_to_similar.unwrap_or(false),
        )
        .await?;

    Ok(Json(ResolveConflictResponse {
        conflict: ConflictInfo::from(report.conflict),
        also_resolved: report
            .also_resolved
            .into_iter()
            .map(ConflictInfo::from)
            .collect(),
    }))
}

/// Ignore a conflict
///
/// Marks the conflict as reviewed and deliberately left alone; neither
/// side's value is changed.
#[utoipa::path(
    post,
    path = "/sync/conflicts/{id}/ignore",
    params(("id" = Uuid, Path, description = "Conflict identifier")),
    request_body = IgnoreConflictRequest,
    responses(
        (status = 200, description = "Conflict ignored", body = ConflictInfo),
        (status = 404, description = "No such conflict"),
        (status = 409, description = "Conflict already settled"),
    ),
    tag = "conflicts"
)]
pub async fn ignore_conflict(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<IgnoreConflictRequest>>,
) -> Result<Json<ConflictInfo>, ApiError> {
    let resolved_by = request.and_then(|Json(r)| r.resolved_by);
    let conflict = state.resolver.ignore(id, resolved_by.as_deref()).await?;
    Ok(Json(ConflictInfo::from(conflict)))
}
