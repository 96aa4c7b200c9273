//! # Data Models
//!
//! This module contains all the data models used throughout the Conductor
//! Sync API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod field_mapping;
pub mod sync_conflict;
pub mod sync_job;
pub mod sync_mapping;

pub use field_mapping::Entity as FieldMapping;
pub use sync_conflict::Entity as SyncConflict;
pub use sync_job::Entity as SyncJob;
pub use sync_mapping::Entity as SyncMapping;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "conductor-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
