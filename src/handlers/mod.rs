//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Conductor
//! Sync API.

use crate::error::{ApiError, validation_error};
use crate::models::ServiceInfo;
use axum::response::Json;
use serde_json::json;

pub mod conflicts;
pub mod field_mappings;
pub mod jobs;
pub mod mappings;
pub mod sync;
pub mod webhooks;

/// Default page size for list endpoints.
pub(crate) const DEFAULT_LIMIT: u64 = 50;

/// Hard ceiling on page size for list endpoints.
pub(crate) const MAX_LIMIT: u64 = 100;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Validate a requested page size against the shared bounds.
pub(crate) fn page_limit(limit: Option<u32>) -> Result<u64, ApiError> {
    let limit = limit.map(u64::from).unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(validation_error(
            "limit must be between 1 and 100",
            json!({ "limit": limit }),
        ));
    }
    Ok(limit)
}
