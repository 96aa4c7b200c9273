//! # Field Mapping Configuration Handlers
//!
//! Handlers for the field mapping registry that drives the mapper:
//! listing, creating, and deactivating rules. Writes invalidate the
//! mapper's rule cache so the next pass sees the change.

use crate::error::{ApiError, validation_error};
use crate::models::field_mapping;
use crate::repositories::NewFieldMapping;
use crate::server::AppState;
use crate::sync::SyncDirection;
use crate::sync::mapper::TransformKind;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Query parameters for listing field mapping rules
#[derive(Debug, Deserialize)]
pub struct ListFieldMappingsQuery {
    /// Include deactivated rules in the listing
    pub include_inactive: Option<bool>,
}

/// Field mapping rule response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldMappingInfo {
    /// Unique identifier for the rule
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Field name on the source (BRD) side
    #[schema(example = "title")]
    pub source_field: String,
    /// Field name on the target (Jira) side
    #[schema(example = "summary")]
    pub target_field: String,
    /// Direction this rule applies to
    #[schema(example = "bidirectional")]
    pub direction: String,
    /// Whether the Jira side is a custom field
    pub is_custom_field: bool,
    /// Jira custom field identifier when applicable
    #[schema(example = "customfield_10001")]
    pub jira_field_id: Option<String>,
    /// Named transformation applied to the value
    #[schema(example = "direct")]
    pub transform: String,
    /// Whether this rule is currently in force
    pub active: bool,
    /// Timestamp when the rule was created
    #[schema(example = "2021-01-01T00:00:00Z")]
    pub created_at: String,
}

impl From<field_mapping::Model> for FieldMappingInfo {
    fn from(model: field_mapping::Model) -> Self {
        Self {
            id: model.id.to_string(),
            source_field: model.source_field,
            target_field: model.target_field,
            direction: model.direction,
            is_custom_field: model.is_custom_field,
            jira_field_id: model.jira_field_id,
            transform: model
                .transform
                .unwrap_or_else(|| "direct".to_string()),
            active: model.active,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Response payload for the field mapping listing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldMappingsResponse {
    /// Field mapping rules
    pub field_mappings: Vec<FieldMappingInfo>,
}

/// Request body for creating a field mapping rule
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFieldMappingRequest {
    /// Field name on the source (BRD) side
    #[schema(example = "budget")]
    pub source_field: String,
    /// Field name on the target (Jira) side
    #[schema(example = "story_points")]
    pub target_field: String,
    /// Direction this rule applies to; defaults to bidirectional
    #[serde(default)]
    pub direction: Option<String>,
    /// Whether the Jira side is a custom field
    #[serde(default)]
    pub is_custom_field: Option<bool>,
    /// Jira custom field identifier, required for custom fields
    #[serde(default)]
    #[schema(example = "customfield_10016")]
    pub jira_field_id: Option<String>,
    /// Named transformation; defaults to direct
    #[serde(default)]
    #[schema(example = "budget_to_story_points")]
    pub transform: Option<String>,
}

/// List field mapping rules
#[utoipa::path(
    get,
    path = "/sync/field-mappings",
    params(
        ("include_inactive" = Option<bool>, Query, description = "Include deactivated rules"),
    ),
    responses(
        (status = 200, description = "Field mapping rules", body = FieldMappingsResponse),
    ),
    tag = "field-mappings"
)]
pub async fn list_field_mappings(
    State(state): State<AppState>,
    Query(query): Query<ListFieldMappingsQuery>,
) -> Result<Json<FieldMappingsResponse>, ApiError> {
    let rows = if query.include_inactive.unwrap_or(false) {
        state.field_mappings.list_all().await?
    } else {
        state.field_mappings.list_active().await?
    };

    Ok(Json(FieldMappingsResponse {
        field_mappings: rows.into_iter().map(FieldMappingInfo::from).collect(),
    }))
}

/// Create a field mapping rule
///
/// Rejects unknown directions and transforms, non-invertible transforms
/// on bidirectional rules, and custom fields without a Jira field id.
#[utoipa::path(
    post,
    path = "/sync/field-mappings",
    request_body = CreateFieldMappingRequest,
    responses(
        (status = 201, description = "Rule created", body = FieldMappingInfo),
        (status = 400, description = "Invalid rule"),
    ),
    tag = "field-mappings"
)]
pub async fn create_field_mapping(
    State(state): State<AppState>,
    Json(request): Json<CreateFieldMappingRequest>,
) -> Result<(StatusCode, Json<FieldMappingInfo>), ApiError> {
    if request.source_field.trim().is_empty() || request.target_field.trim().is_empty() {
        return Err(validation_error(
            "sourceField and targetField must be non-empty",
            json!({
                "sourceField": request.source_field,
                "targetField": request.target_field,
            }),
        ));
    }

    let direction = match request.direction.as_deref() {
        None => SyncDirection::Bidirectional,
        Some(value) => SyncDirection::parse(value).ok_or_else(|| {
            validation_error("Unknown sync direction", json!({ "direction": value }))
        })?,
    };

    let transform = match request.transform.as_deref() {
        None | Some("") => TransformKind::Direct,
        Some(name) => TransformKind::from_str(name)
            .map_err(|_| validation_error("Unknown transform", json!({ "transform": name })))?,
    };

    if direction == SyncDirection::Bidirectional && !transform.is_self_inverting() {
        return Err(validation_error(
            "Transform is not invertible and cannot be used on a bidirectional rule",
            json!({ "transform": transform.as_str() }),
        ));
    }

    let is_custom_field = request.is_custom_field.unwrap_or(false);
    if is_custom_field && request.jira_field_id.is_none() {
        return Err(validation_error(
            "jiraFieldId is required for custom field rules",
            json!({ "targetField": request.target_field }),
        ));
    }

    let created = state
        .field_mappings
        .create(NewFieldMapping {
            source_field: request.source_field,
            target_field: request.target_field,
            direction: direction.as_str().to_string(),
            is_custom_field,
            jira_field_id: request.jira_field_id,
            transform: transform.as_str().to_string(),
            active: true,
        })
        .await?;

    state.mapper.invalidate().await;
    Ok((StatusCode::CREATED, Json(FieldMappingInfo::from(created))))
}

/// Deactivate a field mapping rule
///
/// Rules are never deleted; deactivation removes them from future passes
/// while keeping the configuration history.
#[utoipa::path(
    delete,
    path = "/sync/field-mappings/{id}",
    params(("id" = Uuid, Path, description = "Rule identifier")),
    responses(
        (status = 200, description = "Rule deactivated", body = FieldMappingInfo),
        (status = 404, description = "No such rule"),
    ),
    tag = "field-mappings"
)]
pub async fn deactivate_field_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FieldMappingInfo>, ApiError> {
    let rule = state.field_mappings.deactivate(id).await?;
    state.mapper.invalidate().await;
    Ok(Json(FieldMappingInfo::from(rule)))
}
