//! Sync Queue
//!
//! Bounded-concurrency worker pool over the durable job table. The queue
//! owns its claim loop and semaphore; it is constructed once at startup
//! and shut down through a [`CancellationToken`]. Each tick claims
//! runnable jobs (FIFO, skipping mappings that already have a run in
//! flight), executes them through the [`JobExecutor`] boundary, and
//! settles the outcome: complete, schedule a retry with exponential
//! backoff, or fail terminally once the retry budget is spent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clients::SyncError;
use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::models::sync_job::Model as SyncJobModel;
use crate::repositories::SyncJobRepository;
use crate::sync::JobStatus;

/// How a job run ended, as reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job ran to the end. Item-level failures may still be recorded
    /// on the row; partial success is a valid completion.
    Completed,
    /// The executor observed the cancellation flag at a checkpoint and
    /// stopped, leaving partial progress recorded.
    Cancelled,
}

/// Boundary between the queue and the code that knows how to run a job.
///
/// The orchestrator implements this; tests substitute scripted executors
/// to exercise the retry and cancellation paths deterministically.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &SyncJobModel) -> Result<JobOutcome, SyncError>;
}

/// Aggregate queue counters for the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct QueueStats {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub retrying: i64,
    pub cancelled: i64,
}

/// The worker pool. One instance per process.
pub struct SyncQueue {
    config: SyncConfig,
    jobs: SyncJobRepository,
    executor: Arc<dyn JobExecutor>,
    semaphore: Arc<Semaphore>,
}

impl SyncQueue {
    pub fn new(config: SyncConfig, jobs: SyncJobRepository, executor: Arc<dyn JobExecutor>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            jobs,
            executor,
            semaphore,
        }
    }

    /// Run the claim loop until the shutdown token fires. In-flight jobs
    /// finish their current run before the loop returns.
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), ApiError> {
        info!(
            concurrency = self.config.max_concurrent_jobs,
            tick_ms = self.config.tick_interval_ms,
            "Starting sync queue"
        );

        // Jobs left in_progress by a previous process re-enter the queue
        // before any worker can claim.
        self.jobs.requeue_orphaned().await?;

        let tick = Duration::from_millis(self.config.tick_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync queue shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Queue tick failed");
                    }
                }
            }
        }

        // Drain: wait for all permits, i.e. for every spawned job to settle.
        let _ = self
            .semaphore
            .acquire_many(self.config.max_concurrent_jobs as u32)
            .await;

        info!("Sync queue stopped");
        Ok(())
    }

    /// Claim as many runnable jobs as there are free workers and spawn
    /// them. Returns the number of jobs dispatched.
    pub async fn tick(self: &Arc<Self>) -> Result<usize, ApiError> {
        let free = self.semaphore.available_permits();
        if free == 0 {
            return Ok(0);
        }

        let claimed = self.jobs.claim_runnable(free as u64).await?;
        if claimed.is_empty() {
            return Ok(0);
        }

        debug!(count = claimed.len(), "Claimed runnable jobs");
        gauge!("sync_queue_claimed_gauge").set(claimed.len() as f64);

        let dispatched = claimed.len();
        for job in claimed {
            let queue = Arc::clone(self);
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| {
                    ApiError::new(
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_SERVER_ERROR",
                        "Worker semaphore closed",
                    )
                })?;

            tokio::spawn(async move {
                let _permit = permit;
                queue.run_job(job).await;
            });
        }

        Ok(dispatched)
    }

    /// Execute one claimed job and settle its row.
    #[instrument(skip_all, fields(job_id = %job.id, operation = %job.operation, retry_count = job.retry_count))]
    async fn run_job(&self, job: SyncJobModel) {
        let started = Instant::now();
        counter!("sync_jobs_started_total").increment(1);

        let result = self.executor.execute(&job).await;
        histogram!("sync_job_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        if let Err(err) = self.settle(&job, result).await {
            error!(error = ?err, job_id = %job.id, "Failed to settle job outcome");
        }
    }

    async fn settle(
        &self,
        job: &SyncJobModel,
        result: Result<JobOutcome, SyncError>,
    ) -> Result<(), ApiError> {
        match result {
            Ok(JobOutcome::Completed) => {
                let settled = self.jobs.mark_completed(job).await?;
                counter!("sync_jobs_completed_total").increment(1);
                info!(
                    job_id = %job.id,
                    processed = settled.processed_items,
                    failed = settled.failed_items,
                    "Job completed"
                );
                Ok(())
            }
            Ok(JobOutcome::Cancelled) => {
                self.jobs.mark_cancelled(job).await?;
                counter!("sync_jobs_cancelled_total").increment(1);
                info!(job_id = %job.id, "Job cancelled at checkpoint");
                Ok(())
            }
            Err(err) => self.settle_failure(job, err).await,
        }
    }

    async fn settle_failure(&self, job: &SyncJobModel, err: SyncError) -> Result<(), ApiError> {
        let mut error_json = serde_json::to_value(&err).unwrap_or_else(|_| {
            serde_json::json!({"type": "permanent", "message": err.to_string()})
        });

        if err.is_retryable() && job.retry_count < job.max_retries {
            let delay = self.next_delay(job, &err);
            // Recorded so the next attempt can floor its own delay on this
            // one, keeping the sequence non-decreasing.
            if let Some(record) = error_json.as_object_mut() {
                record.insert("backoff_seconds".to_string(), serde_json::json!(delay));
            }
            let run_after = Utc::now().fixed_offset()
                + ChronoDuration::milliseconds((delay * 1_000.0) as i64);

            self.jobs.mark_retrying(job, run_after, error_json).await?;
            counter!("sync_jobs_retried_total").increment(1);
            warn!(
                job_id = %job.id,
                attempt = job.retry_count + 1,
                max_retries = job.max_retries,
                delay_seconds = delay,
                error = %err,
                "Transient failure; retry scheduled"
            );
        } else {
            self.jobs.mark_failed(job, error_json).await?;
            counter!("sync_jobs_failed_total").increment(1);
            error!(
                job_id = %job.id,
                retries_spent = job.retry_count,
                error = %err,
                "Job failed terminally"
            );
        }

        Ok(())
    }

    /// Delay before a job's next attempt, floored by the delay recorded on
    /// its previous failure so the sequence never shrinks, even when an
    /// upstream Retry-After hint inflated an earlier delay.
    fn next_delay(&self, job: &SyncJobModel, err: &SyncError) -> f64 {
        let previous = job
            .error
            .as_ref()
            .and_then(|record| record.get("backoff_seconds"))
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);

        self.backoff_seconds(job.retry_count, err).max(previous)
    }

    /// Exponential backoff: `base * 2^attempts` with bounded jitter applied
    /// before the cap, so delays at the cap sit exactly on it and the
    /// schedule is non-decreasing in the attempt count. An upstream
    /// rate-limit hint raises the result when larger.
    fn backoff_seconds(&self, attempts_completed: i32, err: &SyncError) -> f64 {
        let base = self.config.retry_base_seconds as f64;
        let max = self.config.retry_max_seconds as f64;

        let nominal = base * 2_f64.powi(attempts_completed);
        let jitter_bound = self.config.retry_jitter_factor * nominal;
        let jitter = if jitter_bound > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_bound)
        } else {
            0.0
        };

        let mut backoff = (nominal + jitter).min(max);
        if let Some(retry_after) = err.retry_after_secs() {
            backoff = backoff.max(retry_after as f64);
        }
        backoff
    }

    /// Current job counts per status.
    pub async fn stats(&self) -> Result<QueueStats, ApiError> {
        stats_from_counts(self.jobs.count_by_status().await?)
    }
}

/// Fold raw per-status counts into the stats shape. Unknown statuses in
/// storage are a data error.
pub fn stats_from_counts(counts: Vec<(String, i64)>) -> Result<QueueStats, ApiError> {
    let mut stats = QueueStats::default();
    for (status, count) in counts {
        match JobStatus::parse(&status) {
            Some(JobStatus::Pending) => stats.pending = count,
            Some(JobStatus::InProgress) => stats.in_progress = count,
            Some(JobStatus::Completed) => stats.completed = count,
            Some(JobStatus::Failed) => stats.failed = count,
            Some(JobStatus::Retrying) => stats.retrying = count,
            Some(JobStatus::Cancelled) => stats.cancelled = count,
            None => {
                return Err(ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    &format!("Unknown job status in storage: {}", status),
                ));
            }
        }
    }
    Ok(stats)
}
