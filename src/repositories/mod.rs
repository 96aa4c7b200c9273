//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access.

pub mod field_mapping;
pub mod sync_conflict;
pub mod sync_job;
pub mod sync_mapping;

pub use field_mapping::{FieldMappingRepository, NewFieldMapping};
pub use sync_conflict::{ConflictResolution, NewSyncConflict, SyncConflictRepository};
pub use sync_job::{CancelOutcome, NewSyncJob, SyncJobRepository};
pub use sync_mapping::{SyncMappingRepository, SyncedUpdate};
