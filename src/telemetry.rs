//! Tracing and metrics bootstrap for the sync service, plus the
//! request-scoped trace id that ties problem+json responses to log lines.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Correlation id attached to one API request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors that can occur while installing global telemetry.
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global tracing pipeline once: the `log::` bridge for crates
/// that predate tracing (sqlx, sea-orm internals), an env filter seeded
/// from config with upstream HTTP and query noise turned down, and json or
/// pretty output per `log_format`. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // A bridge registered earlier (tests, an embedding binary) serves
        // the same purpose; keep going with it.
        eprintln!(
            "Warning: log tracer bridge not installed: {}. `log::` macros will bypass tracing.",
            err
        );
    }

    // RUST_LOG wins outright; the config level otherwise applies to this
    // crate while sqlx/hyper chatter stays at warn.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},sqlx=warn,hyper=warn", config.log_level))
    });

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: tracing subscriber not installed: {}. Default subscriber remains in effect.",
            err
        );
    }

    describe_sync_metrics();
    Ok(())
}

/// Register descriptions for every metric the sync pipeline emits, so an
/// exporter attached later renders them with units and help text.
fn describe_sync_metrics() {
    describe_counter!("sync_jobs_enqueued_total", "Jobs accepted into the sync queue");
    describe_counter!("sync_jobs_started_total", "Jobs dispatched to a worker");
    describe_counter!("sync_jobs_completed_total", "Jobs that ran to completion");
    describe_counter!("sync_jobs_failed_total", "Jobs that failed terminally");
    describe_counter!(
        "sync_jobs_retried_total",
        "Retries scheduled after transient failures"
    );
    describe_counter!(
        "sync_jobs_cancelled_total",
        "Jobs stopped at a cancellation checkpoint"
    );
    describe_counter!("sync_imports_total", "Import intents accepted");
    describe_counter!("sync_exports_total", "Export intents accepted");
    describe_counter!("sync_resyncs_total", "Resync intents accepted");
    describe_counter!(
        "sync_webhook_enqueued_total",
        "Webhook deliveries that produced a job"
    );
    describe_counter!(
        "sync_webhook_dropped_total",
        "Webhook deliveries acknowledged without a job"
    );
    describe_gauge!(
        "sync_queue_claimed_gauge",
        "Jobs claimed in the most recent queue tick"
    );
    describe_histogram!("sync_job_duration_ms", "Wall-clock duration of one job run");
}

/// Execute `future` with the given trace context available through
/// task-local storage for its whole duration.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// The trace id of the request this task is serving, if any.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_id_is_scoped_to_the_wrapped_future() {
        assert_eq!(current_trace_id(), None);

        let seen = with_trace_context(
            TraceContext {
                trace_id: "req-1234".to_string(),
            },
            async { current_trace_id() },
        )
        .await;
        assert_eq!(seen.as_deref(), Some("req-1234"));

        assert_eq!(current_trace_id(), None);
    }
}
