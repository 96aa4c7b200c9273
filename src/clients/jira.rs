//! Jira REST client
//!
//! Thin HTTP implementation of [`IssueTracker`] against the Jira Cloud
//! v3 REST API. Authentication is a static bearer token supplied through
//! configuration. Every call carries the configured request timeout;
//! timeouts surface as transient errors so the queue retries them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use super::{IssueTracker, RemoteIssue, RemoteIssueRef, SyncError, classify_failure};
use crate::config::JiraConfig;

const SERVICE: &str = "jira";

/// HTTP client for the Jira issue API.
pub struct JiraHttpClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl JiraHttpClient {
    /// Build a client from configuration. Fails only if the underlying
    /// HTTP client cannot be constructed.
    pub fn new(config: &JiraConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn issue_url(&self, key: &str) -> String {
        format!("{}/rest/api/3/issue/{}", self.base_url, key)
    }
}

/// Parse the timestamp format Jira emits (RFC 3339, or the legacy
/// `+0000`-style offset without a colon).
pub(crate) fn parse_jira_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl IssueTracker for JiraHttpClient {
    async fn fetch_issue(&self, key: &str) -> Result<RemoteIssue, SyncError> {
        debug!(issue_key = %key, "Fetching Jira issue");

        let response = self
            .http
            .get(self.issue_url(key))
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        let body: JsonValue = response.json().await?;
        let fields = body.get("fields").cloned().unwrap_or(JsonValue::Null);
        if !fields.is_object() {
            return Err(SyncError::transient(format!(
                "Malformed issue response for {}: missing fields object",
                key
            )));
        }

        let issue_key = body
            .get("key")
            .and_then(|v| v.as_str())
            .unwrap_or(key)
            .to_string();
        let project_key = fields
            .pointer("/project/key")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let updated_at = fields
            .get("updated")
            .and_then(|v| v.as_str())
            .and_then(parse_jira_timestamp);

        Ok(RemoteIssue {
            key: issue_key,
            project_key,
            fields,
            updated_at,
        })
    }

    async fn create_issue(
        &self,
        project_key: &str,
        fields: &JsonValue,
    ) -> Result<RemoteIssueRef, SyncError> {
        let Some(field_map) = fields.as_object() else {
            return Err(SyncError::permanent(
                "Mapped issue fields must be a JSON object",
            ));
        };

        let mut payload = field_map.clone();
        payload
            .entry("project")
            .or_insert_with(|| serde_json::json!({ "key": project_key }));

        debug!(project_key = %project_key, "Creating Jira issue");

        let response = self
            .http
            .post(format!("{}/rest/api/3/issue", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "fields": payload }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        let body: JsonValue = response.json().await?;
        let key = body
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SyncError::transient("Malformed create response: missing issue key")
            })?
            .to_string();
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(RemoteIssueRef { key, id })
    }

    async fn update_issue(&self, key: &str, fields: &JsonValue) -> Result<(), SyncError> {
        if !fields.is_object() {
            return Err(SyncError::permanent(
                "Mapped issue fields must be a JSON object",
            ));
        }

        debug!(issue_key = %key, "Updating Jira issue");

        let response = self
            .http
            .put(self.issue_url(key))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?;

        // Jira answers 204 on success; anything else is a failure.
        if response.status() != StatusCode::NO_CONTENT && !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let parsed = parse_jira_timestamp("2026-03-01T10:30:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T08:30:00+00:00");
    }

    #[test]
    fn parses_legacy_jira_offset_format() {
        let parsed = parse_jira_timestamp("2026-03-01T10:30:00.000+0000").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T10:30:00+00:00");
    }

    #[test]
    fn rejects_garbage_timestamps() {
        assert!(parse_jira_timestamp("last tuesday").is_none());
        assert!(parse_jira_timestamp("").is_none());
    }
}
