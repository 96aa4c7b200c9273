//! BRD document service client
//!
//! HTTP implementation of [`BrdStore`] against the host application's
//! internal requirements API. The service speaks plain JSON documents:
//! `{ "id": ..., "fields": { ... }, "updatedAt": ... }`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use super::{BrdDocument, BrdRef, BrdStore, SyncError, classify_failure};
use crate::config::BrdConfig;

const SERVICE: &str = "brd";

/// HTTP client for the BRD document service.
pub struct BrdHttpClient {
    http: reqwest::Client,
    base_url: String,
    service_token: Option<String>,
}

impl BrdHttpClient {
    pub fn new(config: &BrdConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_token: config.service_token.clone(),
        })
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/api/v1/brds/{}", self.base_url, id)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn parse_document(body: JsonValue, fallback_id: Option<&str>) -> Result<BrdDocument, SyncError> {
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| fallback_id.map(|s| s.to_string()))
            .ok_or_else(|| SyncError::transient("Malformed BRD response: missing id"))?;

        let fields = body.get("fields").cloned().unwrap_or(JsonValue::Null);
        if !fields.is_object() {
            return Err(SyncError::transient(format!(
                "Malformed BRD response for {}: missing fields object",
                id
            )));
        }

        let updated_at = body
            .get("updatedAt")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(BrdDocument {
            id,
            fields,
            updated_at,
        })
    }
}

#[async_trait]
impl BrdStore for BrdHttpClient {
    async fn fetch_brd(&self, id: &str) -> Result<BrdDocument, SyncError> {
        debug!(brd_id = %id, "Fetching BRD document");

        let response = self
            .with_auth(self.http.get(self.document_url(id)))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        let body: JsonValue = response.json().await?;
        Self::parse_document(body, Some(id))
    }

    async fn create_brd(&self, fields: &JsonValue) -> Result<BrdRef, SyncError> {
        if !fields.is_object() {
            return Err(SyncError::permanent(
                "Mapped BRD fields must be a JSON object",
            ));
        }

        debug!("Creating BRD document");

        let response = self
            .with_auth(self.http.post(format!("{}/api/v1/brds", self.base_url)))
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        let body: JsonValue = response.json().await?;
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::transient("Malformed create response: missing BRD id"))?
            .to_string();

        Ok(BrdRef { id })
    }

    async fn update_brd(&self, id: &str, fields: &JsonValue) -> Result<(), SyncError> {
        if !fields.is_object() {
            return Err(SyncError::permanent(
                "Mapped BRD fields must be a JSON object",
            ));
        }

        debug!(brd_id = %id, "Updating BRD document");

        let response = self
            .with_auth(self.http.put(self.document_url(id)))
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_failure(SERVICE, response).await);
        }

        Ok(())
    }
}
