//! # Webhook Handlers
//!
//! The Jira webhook endpoint. Signature verification happens in
//! middleware before the body reaches this handler; here the delivery is
//! parsed, routed, and either enqueued as a resync or acknowledged and
//! dropped.

use crate::error::ApiError;
use crate::server::AppState;
use crate::sync::orchestrator::WebhookOutcome;
use crate::sync::webhook::JiraWebhookEvent;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::jobs::JobInfo;

/// Acknowledgement returned for every verified webhook delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// What happened to the delivery: "enqueued" or "dropped"
    #[schema(example = "enqueued")]
    pub status: String,
    /// Why the delivery was dropped, when it was
    #[schema(example = "no_mapping")]
    pub reason: Option<String>,
    /// The resync job, when one was enqueued
    pub job: Option<JobInfo>,
}

/// Receive a Jira webhook delivery
///
/// Deliveries are verified by signature middleware before parsing. Events
/// for mapped, auto-synced issues enqueue a resync (202); everything else
/// is acknowledged without creating a job (200) so Jira does not retry.
#[utoipa::path(
    post,
    path = "/webhooks/jira",
    request_body = JiraWebhookEvent,
    responses(
        (status = 202, description = "Resync job enqueued", body = WebhookAck),
        (status = 200, description = "Delivery acknowledged and dropped", body = WebhookAck),
        (status = 401, description = "Signature verification failed"),
    ),
    tag = "webhooks"
)]
pub async fn jira_webhook(
    State(state): State<AppState>,
    Json(event): Json<JiraWebhookEvent>,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError> {
    match state.orchestrator.handle_webhook(&event).await? {
        WebhookOutcome::Enqueued(job) => {
            info!(issue_key = %event.issue.key, job_id = %job.id, "Webhook delivery enqueued");
            Ok((
                StatusCode::ACCEPTED,
                Json(WebhookAck {
                    status: "enqueued".to_string(),
                    reason: None,
                    job: Some(JobInfo::from(job)),
                }),
            ))
        }
        WebhookOutcome::Dropped(reason) => Ok((
            StatusCode::OK,
            Json(WebhookAck {
                status: "dropped".to_string(),
                reason: Some(reason.as_str().to_string()),
                job: None,
            }),
        )),
    }
}
