//! Conflict Resolver
//!
//! Detects conflicts through the three-way merge, records them in the
//! append-only register, and applies resolution strategies. A conflict
//! row is modeled as a tagged [`Conflict`] value: only the `Pending`
//! variant offers resolve/ignore transitions, and both consume the value,
//! so resolving twice is unrepresentable in the domain layer. The
//! conditional updates in the repository enforce the same rule against
//! concurrent writers.

use axum::http::StatusCode;
use chrono::{DateTime, FixedOffset};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use super::merge::{MergeOutcome, ModificationWindow, merge_values, three_way_merge};
use super::{ConflictKind, ConflictStatus, ResolutionStrategy};
use crate::error::ApiError;
use crate::models::{sync_conflict, sync_mapping};
use crate::repositories::{
    ConflictResolution, NewSyncConflict, SyncConflictRepository, SyncMappingRepository,
};

fn conflict_already_resolved(id: Uuid) -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "CONFLICT_ALREADY_RESOLVED",
        &format!("Conflict {} has already been resolved or ignored", id),
    )
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Snapshot fields shared by every conflict state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDetails {
    pub id: Uuid,
    pub mapping_id: Uuid,
    pub field: String,
    pub kind: ConflictKind,
    pub base_value: Option<JsonValue>,
    pub local_value: Option<JsonValue>,
    pub remote_value: Option<JsonValue>,
    pub detected_at: DateTimeWithTimeZone,
}

/// A conflict awaiting a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConflict {
    pub details: ConflictDetails,
}

/// A conflict settled by a resolution strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConflict {
    pub details: ConflictDetails,
    pub strategy: ResolutionStrategy,
    pub resolved_value: Option<JsonValue>,
    pub resolved_by: Option<String>,
    pub resolved_at: DateTimeWithTimeZone,
}

/// A conflict set aside without applying either value.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoredConflict {
    pub details: ConflictDetails,
    pub resolved_by: Option<String>,
    pub resolved_at: DateTimeWithTimeZone,
}

/// Conflict lifecycle as a closed set of states. Settled states carry no
/// transition methods; corrections require a new conflict record.
#[derive(Debug, Clone, PartialEq)]
pub enum Conflict {
    Pending(PendingConflict),
    Resolved(ResolvedConflict),
    Ignored(IgnoredConflict),
}

impl Conflict {
    /// Parse a stored row into its domain state. Unknown vocabulary in
    /// the row is a data error, not a caller error.
    pub fn from_model(model: &sync_conflict::Model) -> Result<Self, ApiError> {
        let data_error = |what: &str, value: &str| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                &format!("Conflict {} has an unknown {}: {}", model.id, what, value),
            )
        };

        let kind = ConflictKind::parse(&model.conflict_type)
            .ok_or_else(|| data_error("conflict type", &model.conflict_type))?;
        let status = ConflictStatus::parse(&model.status)
            .ok_or_else(|| data_error("status", &model.status))?;

        let details = ConflictDetails {
            id: model.id,
            mapping_id: model.mapping_id,
            field: model.field.clone(),
            kind,
            base_value: model.base_value.clone(),
            local_value: model.local_value.clone(),
            remote_value: model.remote_value.clone(),
            detected_at: model.detected_at,
        };

        match status {
            ConflictStatus::Pending => Ok(Conflict::Pending(PendingConflict { details })),
            ConflictStatus::Resolved => {
                let strategy_raw = model.resolution_strategy.as_deref().unwrap_or_default();
                let strategy = ResolutionStrategy::parse(strategy_raw)
                    .ok_or_else(|| data_error("resolution strategy", strategy_raw))?;
                Ok(Conflict::Resolved(ResolvedConflict {
                    details,
                    strategy,
                    resolved_value: model.resolved_value.clone(),
                    resolved_by: model.resolved_by.clone(),
                    resolved_at: model.resolved_at.unwrap_or(model.updated_at),
                }))
            }
            ConflictStatus::Ignored => Ok(Conflict::Ignored(IgnoredConflict {
                details,
                resolved_by: model.resolved_by.clone(),
                resolved_at: model.resolved_at.unwrap_or(model.updated_at),
            })),
        }
    }
}

impl PendingConflict {
    /// Settle this conflict with a strategy, consuming the pending state.
    pub fn resolve(
        self,
        strategy: ResolutionStrategy,
        resolved_value: Option<JsonValue>,
        resolved_by: Option<String>,
        resolved_at: DateTime<FixedOffset>,
    ) -> ResolvedConflict {
        ResolvedConflict {
            details: self.details,
            strategy,
            resolved_value,
            resolved_by,
            resolved_at,
        }
    }

    /// Set this conflict aside, consuming the pending state.
    pub fn ignore(
        self,
        resolved_by: Option<String>,
        resolved_at: DateTime<FixedOffset>,
    ) -> IgnoredConflict {
        IgnoredConflict {
            details: self.details,
            resolved_by,
            resolved_at,
        }
    }
}

/// Compute the value a strategy settles on, from the conflict's own
/// snapshots. `manual` requires a caller-supplied value whose JSON type
/// matches the field's existing values.
pub fn strategy_value(
    strategy: ResolutionStrategy,
    local: Option<&JsonValue>,
    remote: Option<&JsonValue>,
    manual: Option<&JsonValue>,
) -> Result<Option<JsonValue>, ApiError> {
    match strategy {
        ResolutionStrategy::KeepLocal => Ok(local.cloned()),
        ResolutionStrategy::KeepRemote => Ok(remote.cloned()),
        ResolutionStrategy::Merge => {
            if local.is_none() && remote.is_none() {
                Ok(None)
            } else {
                Ok(Some(merge_values(local, remote)))
            }
        }
        ResolutionStrategy::Manual => {
            let value = manual.ok_or_else(|| {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    "manual resolution requires a resolvedValue",
                )
            })?;

            if let Some(reference) = local.or(remote)
                && json_kind(reference) != json_kind(value)
            {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_FAILED",
                    &format!(
                        "resolvedValue must be {} to match the conflicted field, got {}",
                        json_kind(reference),
                        json_kind(value)
                    ),
                ));
            }

            Ok(Some(value.clone()))
        }
    }
}

/// Conflicts recorded by one detection pass, alongside the merge result.
#[derive(Debug, Clone)]
pub struct DetectReport {
    pub outcome: MergeOutcome,
    pub recorded: Vec<sync_conflict::Model>,
}

/// Result of resolving a conflict, possibly with similar records.
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub conflict: sync_conflict::Model,
    pub also_resolved: Vec<sync_conflict::Model>,
}

/// The conflict resolution service.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    conflicts: SyncConflictRepository,
    mappings: SyncMappingRepository,
    window_seconds: i64,
}

impl ConflictResolver {
    pub fn new(
        conflicts: SyncConflictRepository,
        mappings: SyncMappingRepository,
        window_seconds: i64,
    ) -> Self {
        Self {
            conflicts,
            mappings,
            window_seconds,
        }
    }

    /// Run the three-way merge for a mapping and persist any conflicts.
    pub async fn detect_and_record(
        &self,
        mapping: &sync_mapping::Model,
        base: &JsonValue,
        local: &JsonValue,
        remote: &JsonValue,
    ) -> Result<DetectReport, ApiError> {
        let window = ModificationWindow {
            local_modified_at: mapping.last_modified_local,
            remote_modified_at: mapping.last_modified_remote,
            window_seconds: self.window_seconds,
        };

        let outcome = three_way_merge(base, local, remote, &window);

        let new_conflicts: Vec<NewSyncConflict> = outcome
            .conflicts
            .iter()
            .map(|conflict| NewSyncConflict {
                conflict_type: conflict.kind.as_str().to_string(),
                field: conflict.field.clone(),
                base_value: conflict.base.clone(),
                local_value: conflict.local.clone(),
                remote_value: conflict.remote.clone(),
            })
            .collect();

        let recorded = self
            .conflicts
            .record_detected(mapping, new_conflicts)
            .await?;

        if !recorded.is_empty() {
            info!(
                mapping_id = %mapping.id,
                jira_key = %mapping.jira_key,
                conflict_count = recorded.len(),
                "Recorded sync conflicts"
            );
        }

        Ok(DetectReport { outcome, recorded })
    }

    /// Resolve a pending conflict with a strategy. With
    /// `apply_to_similar`, other pending conflicts on the same mapping
    /// and field are settled in the same batch, each with its own
    /// snapshot values.
    pub async fn resolve(
        &self,
        conflict_id: Uuid,
        strategy: ResolutionStrategy,
        manual_value: Option<&JsonValue>,
        resolved_by: Option<&str>,
        apply_to_similar: bool,
    ) -> Result<ResolutionReport, ApiError> {
        let model = self.conflicts.get_required(conflict_id).await?;
        let pending = match Conflict::from_model(&model)? {
            Conflict::Pending(pending) => pending,
            _ => return Err(conflict_already_resolved(conflict_id)),
        };

        let mut batch = vec![self.resolution_for(&pending.details, strategy, manual_value, resolved_by)?];

        let similar = if apply_to_similar {
            self.conflicts
                .similar_pending(pending.details.mapping_id, &pending.details.field, conflict_id)
                .await?
        } else {
            Vec::new()
        };

        for record in &similar {
            let details = match Conflict::from_model(record)? {
                Conflict::Pending(pending) => pending.details,
                _ => continue,
            };
            batch.push(self.resolution_for(&details, strategy, manual_value, resolved_by)?);
        }

        let resolved_count = self.conflicts.resolve_batch(&batch).await?;

        let conflict = self.conflicts.get_required(conflict_id).await?;
        if !matches!(Conflict::from_model(&conflict)?, Conflict::Resolved(_)) {
            // Another caller settled it between our read and the batch.
            return Err(conflict_already_resolved(conflict_id));
        }

        let mut also_resolved = Vec::with_capacity(similar.len());
        for record in similar {
            also_resolved.push(self.conflicts.get_required(record.id).await?);
        }

        debug!(
            conflict_id = %conflict_id,
            strategy = strategy.as_str(),
            resolved = resolved_count,
            apply_to_similar,
            "Resolved conflict"
        );

        Ok(ResolutionReport {
            conflict,
            also_resolved,
        })
    }

    /// Ignore a pending conflict without applying either side.
    pub async fn ignore(
        &self,
        conflict_id: Uuid,
        resolved_by: Option<&str>,
    ) -> Result<sync_conflict::Model, ApiError> {
        let model = self.conflicts.get_required(conflict_id).await?;
        match Conflict::from_model(&model)? {
            Conflict::Pending(_) => {}
            _ => return Err(conflict_already_resolved(conflict_id)),
        }

        if !self.conflicts.ignore(conflict_id, resolved_by).await? {
            return Err(conflict_already_resolved(conflict_id));
        }

        self.conflicts.get_required(conflict_id).await
    }

    /// Resolve every pending conflict on a mapping with one strategy,
    /// each record settling on its own snapshot values. Used by bulk
    /// operations running with auto-resolution.
    pub async fn auto_resolve_mapping(
        &self,
        mapping_id: Uuid,
        strategy: ResolutionStrategy,
        resolved_by: Option<&str>,
    ) -> Result<u64, ApiError> {
        let pending = self.conflicts.pending_for_mapping(mapping_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut batch = Vec::with_capacity(pending.len());
        for record in &pending {
            let details = match Conflict::from_model(record)? {
                Conflict::Pending(pending) => pending.details,
                _ => continue,
            };
            batch.push(self.resolution_for(&details, strategy, None, resolved_by)?);
        }

        let resolved = self.conflicts.resolve_batch(&batch).await?;
        info!(
            mapping_id = %mapping_id,
            strategy = strategy.as_str(),
            resolved,
            "Auto-resolved pending conflicts"
        );

        Ok(resolved)
    }

    /// Access to the mapping repository for callers that already hold the
    /// resolver.
    pub fn mappings(&self) -> &SyncMappingRepository {
        &self.mappings
    }

    fn resolution_for(
        &self,
        details: &ConflictDetails,
        strategy: ResolutionStrategy,
        manual_value: Option<&JsonValue>,
        resolved_by: Option<&str>,
    ) -> Result<ConflictResolution, ApiError> {
        let resolved_value = strategy_value(
            strategy,
            details.local_value.as_ref(),
            details.remote_value.as_ref(),
            manual_value,
        )?;

        Ok(ConflictResolution {
            conflict_id: details.id,
            strategy: strategy.as_str().to_string(),
            resolved_value,
            resolved_by: resolved_by.map(str::to_string),
        })
    }
}
