//! Sync Orchestrator
//!
//! Top-level coordinator for synchronization intents. Every public
//! operation validates synchronously, enqueues a durable job, and returns
//! the job row immediately; execution happens later on a queue worker,
//! which calls back into this type through the [`JobExecutor`] trait.
//! Validation failures never enter the queue.
//!
//! During execution the orchestrator drives the field mapper, the conflict
//! resolver, and the mapping store to completion, updating item-level
//! progress as it goes so bulk jobs are observable mid-flight.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use metrics::counter;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::mapper::FieldMapper;
use super::queue::{JobExecutor, JobOutcome};
use super::resolver::ConflictResolver;
use super::webhook::{JiraWebhookEvent, WebhookDecision, decide};
use super::{JobStatus, OperationKind, ResolutionStrategy, SyncDirection};
use crate::clients::{BrdStore, IssueTracker, SyncError, SyncErrorKind};
use crate::config::SyncConfig;
use crate::error::{ApiError, validation_error};
use crate::models::sync_job::Model as SyncJobModel;
use crate::models::sync_mapping::Model as SyncMappingModel;
use crate::repositories::{
    NewSyncJob, SyncJobRepository, SyncMappingRepository, SyncedUpdate,
};

/// Upper bound on items per bulk job.
pub const MAX_BULK_ITEMS: usize = 100;

/// Caller options for bulk operations.
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Resolve conflicts raised during the bulk pass immediately, instead
    /// of leaving them pending. Applied per item.
    pub auto_resolve_conflicts: bool,
    /// Strategy for auto-resolution; falls back to the configured default.
    pub default_strategy: Option<ResolutionStrategy>,
}

/// What became of a webhook delivery.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// A resync job was enqueued for the mapped issue.
    Enqueued(SyncJobModel),
    /// The event was acknowledged and dropped.
    Dropped(super::webhook::DropReason),
}

/// The orchestrator service. Constructed once at startup and shared.
pub struct SyncOrchestrator {
    config: SyncConfig,
    jobs: SyncJobRepository,
    mappings: SyncMappingRepository,
    resolver: ConflictResolver,
    mapper: Arc<FieldMapper>,
    tracker: Arc<dyn IssueTracker>,
    brds: Arc<dyn BrdStore>,
}

/// Map a storage error met during job execution onto the retry taxonomy.
/// Unique violations and missing rows will not heal by retrying; anything
/// else is assumed to be an infrastructure hiccup.
fn storage_error(err: ApiError) -> SyncError {
    match err.status {
        StatusCode::CONFLICT | StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
            SyncError::permanent(err.message.to_string())
        }
        _ => SyncError::transient(err.message.to_string()),
    }
}

fn error_kind(err: &SyncError) -> &'static str {
    match err.kind {
        SyncErrorKind::Unauthorized => "unauthorized",
        SyncErrorKind::RateLimited { .. } => "rate_limited",
        SyncErrorKind::NotFound => "not_found",
        SyncErrorKind::Transient => "transient",
        SyncErrorKind::Permanent => "permanent",
    }
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SyncConfig,
        jobs: SyncJobRepository,
        mappings: SyncMappingRepository,
        resolver: ConflictResolver,
        mapper: Arc<FieldMapper>,
        tracker: Arc<dyn IssueTracker>,
        brds: Arc<dyn BrdStore>,
    ) -> Self {
        Self {
            config,
            jobs,
            mappings,
            resolver,
            mapper,
            tracker,
            brds,
        }
    }

    // ---- intents -------------------------------------------------------

    /// Import a Jira epic as a new BRD. Fails validation when the key is
    /// already mapped; resync the existing mapping instead.
    #[instrument(skip(self))]
    pub async fn import_epic(
        &self,
        jira_key: &str,
        project_key: &str,
    ) -> Result<SyncJobModel, ApiError> {
        let jira_key = non_empty("jiraKey", jira_key)?;
        let project_key = non_empty("projectKey", project_key)?;

        if let Some(existing) = self.mappings.find_by_jira_key(jira_key).await? {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_MAPPED",
                &format!(
                    "Jira issue {} is already mapped to BRD {}; resync the mapping instead",
                    jira_key, existing.brd_id
                ),
            ));
        }

        self.enqueue(NewSyncJob {
            direction: SyncDirection::JiraToBrd.as_str().to_string(),
            operation: OperationKind::Create.as_str().to_string(),
            mapping_id: None,
            brd_id: None,
            jira_key: Some(jira_key.to_string()),
            project_key: Some(project_key.to_string()),
            payload: None,
            total_items: 1,
            max_retries: self.config.max_retries,
            parent_job_id: None,
        })
        .await
    }

    /// Export a BRD as a new Jira issue in the given project.
    #[instrument(skip(self))]
    pub async fn export_brd(
        &self,
        brd_id: &str,
        project_key: &str,
    ) -> Result<SyncJobModel, ApiError> {
        let brd_id = non_empty("brdId", brd_id)?;
        let project_key = non_empty("projectKey", project_key)?;

        if let Some(existing) = self.enabled_mapping_for_brd(brd_id).await? {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_MAPPED",
                &format!(
                    "BRD {} is already mapped to Jira issue {}; resync the mapping instead",
                    brd_id, existing.jira_key
                ),
            ));
        }

        self.enqueue(NewSyncJob {
            direction: SyncDirection::BrdToJira.as_str().to_string(),
            operation: OperationKind::Create.as_str().to_string(),
            mapping_id: None,
            brd_id: Some(brd_id.to_string()),
            jira_key: None,
            project_key: Some(project_key.to_string()),
            payload: None,
            total_items: 1,
            max_retries: self.config.max_retries,
            parent_job_id: None,
        })
        .await
    }

    /// Import many Jira issues in one job. Items are processed in order;
    /// individual failures do not abort the batch.
    #[instrument(skip(self, jira_keys), fields(item_count = jira_keys.len()))]
    pub async fn bulk_import(
        &self,
        jira_keys: &[String],
        project_key: &str,
        options: BulkOptions,
    ) -> Result<SyncJobModel, ApiError> {
        let project_key = non_empty("projectKey", project_key)?;
        let payload = self.bulk_payload("jiraKeys", jira_keys, &options)?;

        self.enqueue(NewSyncJob {
            direction: SyncDirection::JiraToBrd.as_str().to_string(),
            operation: OperationKind::BulkImport.as_str().to_string(),
            mapping_id: None,
            brd_id: None,
            jira_key: None,
            project_key: Some(project_key.to_string()),
            payload: Some(payload),
            total_items: jira_keys.len() as i32,
            max_retries: self.config.max_retries,
            parent_job_id: None,
        })
        .await
    }

    /// Export many BRDs in one job.
    #[instrument(skip(self, brd_ids), fields(item_count = brd_ids.len()))]
    pub async fn bulk_export(
        &self,
        brd_ids: &[String],
        project_key: &str,
        options: BulkOptions,
    ) -> Result<SyncJobModel, ApiError> {
        let project_key = non_empty("projectKey", project_key)?;
        let payload = self.bulk_payload("brdIds", brd_ids, &options)?;

        self.enqueue(NewSyncJob {
            direction: SyncDirection::BrdToJira.as_str().to_string(),
            operation: OperationKind::BulkExport.as_str().to_string(),
            mapping_id: None,
            brd_id: None,
            jira_key: None,
            project_key: Some(project_key.to_string()),
            payload: Some(payload),
            total_items: brd_ids.len() as i32,
            max_retries: self.config.max_retries,
            parent_job_id: None,
        })
        .await
    }

    /// Resync an existing mapping, three-way against its stored base
    /// snapshot. Requests for a mapping with an in-flight job queue behind
    /// it; runs for one mapping never overlap.
    #[instrument(skip(self))]
    pub async fn resync_mapping(
        &self,
        mapping_id: Uuid,
        direction: SyncDirection,
    ) -> Result<SyncJobModel, ApiError> {
        let mapping = self.mappings.get_required(mapping_id).await?;
        if !mapping.sync_enabled {
            return Err(validation_error(
                "Mapping has sync disabled",
                json!({"mappingId": mapping_id.to_string()}),
            ));
        }

        self.enqueue(NewSyncJob {
            direction: direction.as_str().to_string(),
            operation: OperationKind::MappingSync.as_str().to_string(),
            mapping_id: Some(mapping.id),
            brd_id: Some(mapping.brd_id.clone()),
            jira_key: Some(mapping.jira_key.clone()),
            project_key: mapping.jira_project_key.clone(),
            payload: None,
            total_items: 1,
            max_retries: self.config.max_retries,
            parent_job_id: None,
        })
        .await
    }

    /// Route a verified webhook delivery. Deliveries for unmapped issues
    /// or mappings without auto-sync are acknowledged and dropped.
    #[instrument(skip(self, event), fields(issue_key = %event.issue.key, event = %event.webhook_event))]
    pub async fn handle_webhook(
        &self,
        event: &JiraWebhookEvent,
    ) -> Result<WebhookOutcome, ApiError> {
        let mapping = self.mappings.find_by_jira_key(&event.issue.key).await?;

        match decide(event, mapping.as_ref()) {
            WebhookDecision::Drop(reason) => {
                debug!(reason = reason.as_str(), "Webhook delivery dropped");
                counter!("sync_webhook_dropped_total").increment(1);
                Ok(WebhookOutcome::Dropped(reason))
            }
            WebhookDecision::Resync {
                mapping_id,
                direction,
            } => {
                let Some(mapping) = mapping else {
                    return Ok(WebhookOutcome::Dropped(
                        super::webhook::DropReason::NoMapping,
                    ));
                };
                let job = self
                    .enqueue(NewSyncJob {
                        direction: direction.as_str().to_string(),
                        operation: OperationKind::WebhookSync.as_str().to_string(),
                        mapping_id: Some(mapping_id),
                        brd_id: Some(mapping.brd_id.clone()),
                        jira_key: Some(mapping.jira_key.clone()),
                        project_key: mapping.jira_project_key.clone(),
                        payload: serde_json::to_value(event).ok(),
                        total_items: 1,
                        max_retries: self.config.max_retries,
                        parent_job_id: None,
                    })
                    .await?;
                counter!("sync_webhook_enqueued_total").increment(1);
                Ok(WebhookOutcome::Enqueued(job))
            }
        }
    }

    /// Re-enqueue only the failed subset of a finished bulk job as a fresh
    /// job referencing the original.
    #[instrument(skip(self))]
    pub async fn retry_failed_items(&self, job_id: Uuid) -> Result<SyncJobModel, ApiError> {
        let parent = self.jobs.get_required(job_id).await?;

        let terminal = JobStatus::parse(&parent.status).is_some_and(|s| s.is_terminal());
        if !terminal {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "INVALID_STATE",
                "Only finished jobs can have their failed items retried",
            ));
        }

        let operation = OperationKind::parse(&parent.operation)
            .filter(|op| op.is_bulk())
            .ok_or_else(|| {
                validation_error(
                    "Only bulk jobs support failed-item retry",
                    json!({"operation": parent.operation}),
                )
            })?;

        let failed_items: Vec<String> = parent
            .item_failures
            .as_ref()
            .and_then(|v| v.as_array())
            .map(|failures| {
                failures
                    .iter()
                    .filter_map(|f| f.get("item").and_then(|i| i.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if failed_items.is_empty() {
            return Err(validation_error(
                "Job has no failed items to retry",
                json!({"jobId": job_id.to_string()}),
            ));
        }

        // Carry the parent's auto-resolution settings forward.
        let options = parent
            .payload
            .as_ref()
            .map(parse_bulk_options)
            .unwrap_or_default();
        let items_key = match operation {
            OperationKind::BulkImport => "jiraKeys",
            _ => "brdIds",
        };
        let payload = self.bulk_payload(items_key, &failed_items, &options)?;

        self.enqueue(NewSyncJob {
            direction: parent.direction.clone(),
            operation: parent.operation.clone(),
            mapping_id: None,
            brd_id: None,
            jira_key: None,
            project_key: parent.project_key.clone(),
            payload: Some(payload),
            total_items: failed_items.len() as i32,
            max_retries: self.config.max_retries,
            parent_job_id: Some(parent.id),
        })
        .await
    }

    async fn enqueue(&self, new: NewSyncJob) -> Result<SyncJobModel, ApiError> {
        let job = self.jobs.create(new).await?;
        counter!("sync_jobs_enqueued_total").increment(1);
        info!(
            job_id = %job.id,
            operation = %job.operation,
            direction = %job.direction,
            "Enqueued sync job"
        );
        Ok(job)
    }

    fn bulk_payload(
        &self,
        items_key: &str,
        items: &[String],
        options: &BulkOptions,
    ) -> Result<JsonValue, ApiError> {
        if items.is_empty() {
            return Err(validation_error(
                "At least one item is required",
                json!({items_key: "must not be empty"}),
            ));
        }
        if items.len() > MAX_BULK_ITEMS {
            return Err(validation_error(
                "Too many items for one bulk job",
                json!({items_key: format!("at most {} items", MAX_BULK_ITEMS)}),
            ));
        }
        if items.iter().any(|item| item.trim().is_empty()) {
            return Err(validation_error(
                "Items must not be blank",
                json!({items_key: "contains a blank entry"}),
            ));
        }

        let strategy = options
            .default_strategy
            .unwrap_or_else(|| self.config.default_strategy());
        if options.auto_resolve_conflicts && strategy == ResolutionStrategy::Manual {
            return Err(validation_error(
                "Auto-resolution cannot use the manual strategy",
                json!({"defaultStrategy": "manual requires a caller-supplied value"}),
            ));
        }

        Ok(json!({
            "items": items,
            "auto_resolve_conflicts": options.auto_resolve_conflicts,
            "strategy": strategy.as_str(),
        }))
    }

    async fn enabled_mapping_for_brd(
        &self,
        brd_id: &str,
    ) -> Result<Option<SyncMappingModel>, ApiError> {
        Ok(self
            .mappings
            .find_by_brd(brd_id)
            .await?
            .into_iter()
            .find(|m| m.sync_enabled))
    }

    // ---- execution -----------------------------------------------------

    async fn run_job(&self, job: &SyncJobModel) -> Result<JobOutcome, SyncError> {
        let direction = SyncDirection::parse(&job.direction)
            .ok_or_else(|| SyncError::permanent(format!("unknown direction '{}'", job.direction)))?;
        let operation = OperationKind::parse(&job.operation)
            .ok_or_else(|| SyncError::permanent(format!("unknown operation '{}'", job.operation)))?;

        match operation {
            OperationKind::Create => {
                self.run_single(job, direction).await?;
                self.finish_progress(job, 1, 0, None).await?;
                Ok(JobOutcome::Completed)
            }
            OperationKind::Update => {
                // Updates push changes through an existing pairing.
                let mapping_id = self.mapping_for_update(job).await?;
                self.resync(mapping_id, direction, None).await?;
                self.finish_progress(job, 1, 0, None).await?;
                Ok(JobOutcome::Completed)
            }
            OperationKind::BulkImport | OperationKind::BulkExport => {
                self.run_bulk(job, operation).await
            }
            OperationKind::MappingSync | OperationKind::WebhookSync => {
                let mapping_id = job
                    .mapping_id
                    .ok_or_else(|| SyncError::permanent("resync job has no mapping id"))?;
                self.resync(mapping_id, direction, None).await?;
                self.finish_progress(job, 1, 0, None).await?;
                Ok(JobOutcome::Completed)
            }
        }
    }

    /// Resolve the mapping an update job targets: the explicit id when
    /// set, otherwise the job's Jira key or BRD id.
    async fn mapping_for_update(&self, job: &SyncJobModel) -> Result<Uuid, SyncError> {
        if let Some(id) = job.mapping_id {
            return Ok(id);
        }
        if let Some(jira_key) = job.jira_key.as_deref() {
            if let Some(mapping) = self
                .mappings
                .find_by_jira_key(jira_key)
                .await
                .map_err(storage_error)?
            {
                return Ok(mapping.id);
            }
        }
        if let Some(brd_id) = job.brd_id.as_deref() {
            if let Some(mapping) = self
                .enabled_mapping_for_brd(brd_id)
                .await
                .map_err(storage_error)?
            {
                return Ok(mapping.id);
            }
        }
        Err(SyncError::permanent("update job targets no known mapping"))
    }

    async fn run_single(
        &self,
        job: &SyncJobModel,
        direction: SyncDirection,
    ) -> Result<SyncMappingModel, SyncError> {
        match direction {
            SyncDirection::JiraToBrd => {
                let jira_key = job
                    .jira_key
                    .as_deref()
                    .ok_or_else(|| SyncError::permanent("import job has no jira key"))?;
                self.import_one(jira_key, job.project_key.as_deref()).await
            }
            SyncDirection::BrdToJira => {
                let brd_id = job
                    .brd_id
                    .as_deref()
                    .ok_or_else(|| SyncError::permanent("export job has no brd id"))?;
                let project_key = job
                    .project_key
                    .as_deref()
                    .ok_or_else(|| SyncError::permanent("export job has no project key"))?;
                self.export_one(brd_id, project_key).await
            }
            SyncDirection::Bidirectional => {
                Err(SyncError::permanent("create jobs must name one direction"))
            }
        }
    }

    /// Process a bulk job item by item, sequentially, in submission order.
    /// One item's failure is recorded and the batch proceeds. The
    /// cancellation flag is checked between items.
    async fn run_bulk(
        &self,
        job: &SyncJobModel,
        operation: OperationKind,
    ) -> Result<JobOutcome, SyncError> {
        let payload = job
            .payload
            .as_ref()
            .ok_or_else(|| SyncError::permanent("bulk job has no payload"))?;
        let items: Vec<String> = payload
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if items.is_empty() {
            return Err(SyncError::permanent("bulk job payload has no items"));
        }

        let options = parse_bulk_options(payload);
        let auto_resolve = options
            .auto_resolve_conflicts
            .then(|| {
                options
                    .default_strategy
                    .unwrap_or_else(|| self.config.default_strategy())
            });

        let total = items.len() as i32;
        let mut processed = 0_i32;
        let mut failed = 0_i32;
        let mut failures: Vec<JsonValue> = Vec::new();

        for item in &items {
            if self
                .jobs
                .is_cancel_requested(job.id)
                .await
                .map_err(storage_error)?
            {
                info!(job_id = %job.id, processed, failed, "Bulk job stopping at cancellation checkpoint");
                return Ok(JobOutcome::Cancelled);
            }

            let result = match operation {
                OperationKind::BulkImport => {
                    self.bulk_import_item(item, job.project_key.as_deref(), auto_resolve)
                        .await
                }
                _ => {
                    self.bulk_export_item(item, job.project_key.as_deref(), auto_resolve)
                        .await
                }
            };

            match result {
                Ok(()) => processed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(job_id = %job.id, item = %item, error = %err, "Bulk item failed");
                    failures.push(json!({
                        "item": item,
                        "kind": error_kind(&err),
                        "error": err.to_string(),
                    }));
                }
            }

            let progress = (processed + failed) * 100 / total;
            let failures_json = (!failures.is_empty()).then(|| JsonValue::Array(failures.clone()));
            self.jobs
                .update_progress(job.id, processed, failed, progress, failures_json.as_ref())
                .await
                .map_err(storage_error)?;
        }

        Ok(JobOutcome::Completed)
    }

    /// One bulk-import item: fresh import for unmapped keys, resync for
    /// keys already mapped.
    async fn bulk_import_item(
        &self,
        jira_key: &str,
        project_key: Option<&str>,
        auto_resolve: Option<ResolutionStrategy>,
    ) -> Result<(), SyncError> {
        match self
            .mappings
            .find_by_jira_key(jira_key)
            .await
            .map_err(storage_error)?
        {
            Some(mapping) if mapping.sync_enabled => {
                self.resync(mapping.id, SyncDirection::JiraToBrd, auto_resolve)
                    .await?;
            }
            Some(_) => {
                return Err(SyncError::permanent(format!(
                    "Jira issue {} is mapped but sync is disabled",
                    jira_key
                )));
            }
            None => {
                self.import_one(jira_key, project_key).await?;
            }
        }
        Ok(())
    }

    async fn bulk_export_item(
        &self,
        brd_id: &str,
        project_key: Option<&str>,
        auto_resolve: Option<ResolutionStrategy>,
    ) -> Result<(), SyncError> {
        match self
            .enabled_mapping_for_brd(brd_id)
            .await
            .map_err(storage_error)?
        {
            Some(mapping) => {
                self.resync(mapping.id, SyncDirection::BrdToJira, auto_resolve)
                    .await?;
            }
            None => {
                let project_key = project_key
                    .ok_or_else(|| SyncError::permanent("bulk export job has no project key"))?;
                self.export_one(brd_id, project_key).await?;
            }
        }
        Ok(())
    }

    /// Fetch a Jira issue, map it into BRD vocabulary, create the BRD, and
    /// record the pairing. The base snapshot is the created BRD document,
    /// the ancestor for future three-way merges.
    async fn import_one(
        &self,
        jira_key: &str,
        project_key: Option<&str>,
    ) -> Result<SyncMappingModel, SyncError> {
        if self
            .mappings
            .find_by_jira_key(jira_key)
            .await
            .map_err(storage_error)?
            .is_some()
        {
            return Err(SyncError::permanent(format!(
                "Jira issue {} is already mapped",
                jira_key
            )));
        }

        let issue = self.tracker.fetch_issue(jira_key).await?;
        let mapped = self.mapper.map(&issue.fields, SyncDirection::JiraToBrd).await?;
        for warning in &mapped.warnings {
            warn!(jira_key = %jira_key, warning = %warning, "Field mapping warning");
        }

        let brd_fields = mapped.into_value();
        let brd = self.brds.create_brd(&brd_fields).await?;

        let mapping = self
            .mappings
            .create(
                &brd.id,
                jira_key,
                project_key.or(issue.project_key.as_deref()),
                self.config.auto_sync_default,
                Some(brd_fields),
            )
            .await
            .map_err(storage_error)?;

        counter!("sync_imports_total").increment(1);
        info!(jira_key = %jira_key, brd_id = %brd.id, mapping_id = %mapping.id, "Imported Jira issue as BRD");
        Ok(mapping)
    }

    /// Fetch a BRD, map it into Jira vocabulary, create the issue, and
    /// record the pairing.
    async fn export_one(
        &self,
        brd_id: &str,
        project_key: &str,
    ) -> Result<SyncMappingModel, SyncError> {
        if self
            .enabled_mapping_for_brd(brd_id)
            .await
            .map_err(storage_error)?
            .is_some()
        {
            return Err(SyncError::permanent(format!(
                "BRD {} is already mapped",
                brd_id
            )));
        }

        let brd = self.brds.fetch_brd(brd_id).await?;
        let mapped = self.mapper.map(&brd.fields, SyncDirection::BrdToJira).await?;
        for warning in &mapped.warnings {
            warn!(brd_id = %brd_id, warning = %warning, "Field mapping warning");
        }

        let issue = self
            .tracker
            .create_issue(project_key, &mapped.into_value())
            .await?;

        let mapping = self
            .mappings
            .create(
                brd_id,
                &issue.key,
                Some(project_key),
                self.config.auto_sync_default,
                Some(brd.fields),
            )
            .await
            .map_err(storage_error)?;

        counter!("sync_exports_total").increment(1);
        info!(brd_id = %brd_id, jira_key = %issue.key, mapping_id = %mapping.id, "Exported BRD as Jira issue");
        Ok(mapping)
    }

    /// Three-way resync of an existing mapping against its stored base
    /// snapshot. Non-conflicting changes are applied to the side(s) the
    /// direction names; conflicts are recorded for later resolution (or
    /// settled immediately when an auto-resolve strategy is given). The
    /// merged document becomes the next base snapshot.
    async fn resync(
        &self,
        mapping_id: Uuid,
        direction: SyncDirection,
        auto_resolve: Option<ResolutionStrategy>,
    ) -> Result<(), SyncError> {
        let mapping = self
            .mappings
            .get_required(mapping_id)
            .await
            .map_err(storage_error)?;
        if !mapping.sync_enabled {
            return Err(SyncError::permanent(format!(
                "mapping {} has sync disabled",
                mapping_id
            )));
        }

        let brd = self.brds.fetch_brd(&mapping.brd_id).await?;
        let issue = self.tracker.fetch_issue(&mapping.jira_key).await?;

        // Compare in BRD vocabulary: the remote document is mapped across
        // before the merge so field names line up with the base snapshot.
        let remote_as_brd = self
            .mapper
            .map(&issue.fields, SyncDirection::JiraToBrd)
            .await?
            .into_value();
        let base = mapping.base_snapshot.clone().unwrap_or_else(|| json!({}));

        let report = self
            .resolver
            .detect_and_record(&mapping, &base, &brd.fields, &remote_as_brd)
            .await
            .map_err(storage_error)?;

        let merged = report.outcome.merged_value();

        if matches!(
            direction,
            SyncDirection::JiraToBrd | SyncDirection::Bidirectional
        ) && merged != brd.fields
        {
            self.brds.update_brd(&mapping.brd_id, &merged).await?;
        }

        if matches!(
            direction,
            SyncDirection::BrdToJira | SyncDirection::Bidirectional
        ) {
            let jira_fields = self
                .mapper
                .map(&merged, SyncDirection::BrdToJira)
                .await?
                .into_value();
            if jira_fields.as_object().is_some_and(|o| !o.is_empty()) {
                self.tracker
                    .update_issue(&mapping.jira_key, &jira_fields)
                    .await?;
            }
        }

        if let Some(strategy) = auto_resolve
            && report.outcome.has_conflicts()
        {
            self.resolver
                .auto_resolve_mapping(mapping.id, strategy, Some("auto_resolve_policy"))
                .await
                .map_err(storage_error)?;
        }

        let now = chrono::Utc::now().fixed_offset();
        self.mappings
            .record_synced(
                mapping.id,
                SyncedUpdate {
                    last_modified_local: Some(
                        brd.updated_at.map(|t| t.fixed_offset()).unwrap_or(now),
                    ),
                    last_modified_remote: Some(
                        issue.updated_at.map(|t| t.fixed_offset()).unwrap_or(now),
                    ),
                    base_snapshot: Some(merged),
                },
            )
            .await
            .map_err(storage_error)?;

        counter!("sync_resyncs_total").increment(1);
        info!(
            mapping_id = %mapping.id,
            jira_key = %mapping.jira_key,
            direction = direction.as_str(),
            conflicts = report.recorded.len(),
            remote_applied = report.outcome.remote_applied.len(),
            "Resynced mapping"
        );

        Ok(())
    }

    async fn finish_progress(
        &self,
        job: &SyncJobModel,
        processed: i32,
        failed: i32,
        failures: Option<&JsonValue>,
    ) -> Result<(), SyncError> {
        self.jobs
            .update_progress(job.id, processed, failed, 100, failures)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

fn parse_bulk_options(payload: &JsonValue) -> BulkOptions {
    BulkOptions {
        auto_resolve_conflicts: payload
            .get("auto_resolve_conflicts")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        default_strategy: payload
            .get("strategy")
            .and_then(|v| v.as_str())
            .and_then(ResolutionStrategy::parse),
    }
}

#[async_trait]
impl JobExecutor for SyncOrchestrator {
    async fn execute(&self, job: &SyncJobModel) -> Result<JobOutcome, SyncError> {
        self.run_job(job).await
    }
}

fn non_empty<'a>(name: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation_error(
            &format!("{} must not be empty", name),
            json!({name: "must not be empty"}),
        ));
    }
    Ok(trimmed)
}
