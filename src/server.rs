//! # Server Configuration
//!
//! Server setup for the Conductor Sync API: shared application state,
//! the route table, OpenAPI documentation, and startup wiring for the
//! worker pool.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::clients::{BrdHttpClient, BrdStore, IssueTracker, JiraHttpClient};
use crate::config::AppConfig;
use crate::handlers;
use crate::repositories::{
    FieldMappingRepository, SyncConflictRepository, SyncJobRepository, SyncMappingRepository,
};
use crate::sync::mapper::FieldMapper;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::queue::SyncQueue;
use crate::sync::resolver::ConflictResolver;
use crate::telemetry::{TraceContext, with_trace_context};
use crate::webhook_verification::webhook_verification_middleware;

/// Give every request a trace id so error responses and log lines can be
/// correlated.
async fn trace_context_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let context = TraceContext {
        trace_id: uuid::Uuid::new_v4().to_string(),
    };
    with_trace_context(context, next.run(request)).await
}

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub jobs: SyncJobRepository,
    pub mappings: SyncMappingRepository,
    pub conflicts: SyncConflictRepository,
    pub field_mappings: FieldMappingRepository,
    pub resolver: ConflictResolver,
    pub mapper: Arc<FieldMapper>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub queue: Arc<SyncQueue>,
}

impl AppState {
    /// Wire up repositories, clients, and services from a configuration
    /// and an established database pool.
    pub fn build(
        config: AppConfig,
        db: DatabaseConnection,
        tracker: Arc<dyn IssueTracker>,
        brds: Arc<dyn BrdStore>,
    ) -> Self {
        let config = Arc::new(config);
        let jobs = SyncJobRepository::new(db.clone());
        let mappings = SyncMappingRepository::new(db.clone());
        let conflicts = SyncConflictRepository::new(db.clone());
        let field_mappings = FieldMappingRepository::new(db.clone());

        let resolver = ConflictResolver::new(
            conflicts.clone(),
            mappings.clone(),
            config.sync.concurrent_window_seconds,
        );
        let mapper = Arc::new(FieldMapper::new(
            field_mappings.clone(),
            Duration::from_secs(config.sync.field_cache_ttl_seconds),
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            config.sync.clone(),
            jobs.clone(),
            mappings.clone(),
            resolver.clone(),
            mapper.clone(),
            tracker,
            brds,
        ));
        let queue = Arc::new(SyncQueue::new(
            config.sync.clone(),
            jobs.clone(),
            orchestrator.clone(),
        ));

        Self {
            db,
            config,
            jobs,
            mappings,
            conflicts,
            field_mappings,
            resolver,
            mapper,
            orchestrator,
            queue,
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/jira", post(handlers::webhooks::jira_webhook))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            webhook_verification_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/sync/import", post(handlers::sync::import))
        .route("/sync/export", post(handlers::sync::export))
        .route("/sync/bulk/import", post(handlers::sync::bulk_import))
        .route("/sync/bulk/export", post(handlers::sync::bulk_export))
        .route("/sync/jobs", get(handlers::jobs::list_jobs))
        .route("/sync/jobs/{id}", get(handlers::jobs::get_job))
        .route("/sync/jobs/{id}/cancel", post(handlers::jobs::cancel_job))
        .route("/sync/jobs/{id}/retry", post(handlers::jobs::retry_job))
        .route("/sync/queue/stats", get(handlers::jobs::queue_stats))
        .route("/sync/mappings", get(handlers::mappings::list_mappings))
        .route("/sync/mappings/{id}", get(handlers::mappings::get_mapping))
        .route(
            "/sync/mappings/{id}/enable",
            post(handlers::mappings::enable_mapping),
        )
        .route(
            "/sync/mappings/{id}/disable",
            post(handlers::mappings::disable_mapping),
        )
        .route(
            "/sync/mappings/{id}/auto-sync",
            post(handlers::mappings::set_auto_sync),
        )
        .route(
            "/sync/mappings/{id}/resync",
            post(handlers::mappings::resync_mapping),
        )
        .route("/sync/conflicts", get(handlers::conflicts::list_conflicts))
        .route(
            "/sync/conflicts/{id}",
            get(handlers::conflicts::get_conflict),
        )
        .route(
            "/sync/conflicts/{id}/resolve",
            post(handlers::conflicts::resolve_conflict),
        )
        .route(
            "/sync/conflicts/{id}/ignore",
            post(handlers::conflicts::ignore_conflict),
        )
        .route(
            "/sync/field-mappings",
            get(handlers::field_mappings::list_field_mappings)
                .post(handlers::field_mappings::create_field_mapping),
        )
        .route(
            "/sync/field-mappings/{id}",
            delete(handlers::field_mappings::deactivate_field_mapping),
        )
        .merge(webhook_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given configuration, running the sync
/// worker pool alongside it until shutdown.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracker: Arc<dyn IssueTracker> = Arc::new(JiraHttpClient::new(&config.jira)?);
    let brds: Arc<dyn BrdStore> = Arc::new(BrdHttpClient::new(&config.brd)?);

    let state = AppState::build(config, db, tracker, brds);
    let queue = state.queue.clone();
    let config = state.config.clone();
    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(queue.run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on: {}", addr);
    println!("Running in profile: {}", config.profile);

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            serve_shutdown.cancel();
        })
        .await?;

    // Let in-flight jobs reach their next checkpoint before exiting.
    shutdown.cancel();
    match worker.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "Worker pool exited with an error"),
        Err(err) => error!(error = %err, "Worker pool task panicked"),
    }

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::sync::import,
        crate::handlers::sync::export,
        crate::handlers::sync::bulk_import,
        crate::handlers::sync::bulk_export,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::cancel_job,
        crate::handlers::jobs::retry_job,
        crate::handlers::jobs::queue_stats,
        crate::handlers::mappings::list_mappings,
        crate::handlers::mappings::get_mapping,
        crate::handlers::mappings::enable_mapping,
        crate::handlers::mappings::disable_mapping,
        crate::handlers::mappings::set_auto_sync,
        crate::handlers::mappings::resync_mapping,
        crate::handlers::conflicts::list_conflicts,
        crate::handlers::conflicts::get_conflict,
        crate::handlers::conflicts::resolve_conflict,
        crate::handlers::conflicts::ignore_conflict,
        crate::handlers::field_mappings::list_field_mappings,
        crate::handlers::field_mappings::create_field_mapping,
        crate::handlers::field_mappings::deactivate_field_mapping,
        crate::handlers::webhooks::jira_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::sync::ImportRequest,
            crate::handlers::sync::ExportRequest,
            crate::handlers::sync::BulkImportRequest,
            crate::handlers::sync::BulkExportRequest,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::jobs::CancelJobResponse,
            crate::handlers::mappings::MappingInfo,
            crate::handlers::mappings::MappingsResponse,
            crate::handlers::mappings::AutoSyncRequest,
            crate::handlers::mappings::ResyncRequest,
            crate::handlers::conflicts::ConflictInfo,
            crate::handlers::conflicts::ConflictsResponse,
            crate::handlers::conflicts::ResolveConflictRequest,
            crate::handlers::conflicts::IgnoreConflictRequest,
            crate::handlers::conflicts::ResolveConflictResponse,
            crate::handlers::field_mappings::FieldMappingInfo,
            crate::handlers::field_mappings::FieldMappingsResponse,
            crate::handlers::field_mappings::CreateFieldMappingRequest,
            crate::handlers::webhooks::WebhookAck,
            crate::sync::queue::QueueStats,
            crate::sync::webhook::JiraWebhookEvent,
            crate::sync::webhook::WebhookIssue,
            crate::sync::webhook::Changelog,
            crate::sync::webhook::ChangelogItem,
            crate::sync::webhook::DropReason,
        )
    ),
    info(
        title = "Conductor Sync API",
        description = "Bi-directional synchronization between BRD requirement documents and Jira issues",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
