//! External collaborator clients
//!
//! The sync engine talks to exactly two outside systems: the Jira REST API
//! and the BRD document service of the host application. Both are reached
//! through the traits defined here so the engine stays testable without
//! network access. Errors carry a retry classification that drives the
//! queue's backoff decisions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

pub mod brd;
pub mod jira;

pub use brd::BrdHttpClient;
pub use jira::JiraHttpClient;

/// Sync-specific error for structured handling during sync operations.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncError {
    #[serde(flatten)]
    pub kind: SyncErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Authentication/authorization failure
    Unauthorized,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// The referenced entity does not exist upstream. Kept distinct from
    /// other permanent failures so callers can tell a bad key from a broken
    /// integration.
    NotFound,
    /// Transient/retryable error
    Transient,
    /// Permanent/non-retryable error
    Permanent,
}

impl SyncError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Unauthorized,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: SyncErrorKind::RateLimited { retry_after_secs },
            message: None,
            details: None,
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::NotFound,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Transient,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Permanent,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the queue should schedule another attempt for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SyncErrorKind::Transient | SyncErrorKind::RateLimited { .. }
        )
    }

    /// Rate-limit hint from the upstream, when one was provided.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.kind {
            SyncErrorKind::RateLimited { retry_after_secs } => retry_after_secs,
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SyncErrorKind::Unauthorized => write!(f, "Unauthorized")?,
            SyncErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            SyncErrorKind::NotFound => write!(f, "Not found")?,
            SyncErrorKind::Transient => write!(f, "Transient error")?,
            SyncErrorKind::Permanent => write!(f, "Permanent error")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            SyncError::transient(format!("Network error: {}", err))
        } else if err.is_decode() {
            SyncError::transient(format!("Malformed response: {}", err))
        } else {
            SyncError::transient(format!("Request error: {}", err))
        }
    }
}

/// Snapshot of a Jira issue as a flat field document plus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteIssue {
    /// Issue key (e.g. PROJ-123)
    pub key: String,
    /// Project key portion (e.g. PROJ)
    pub project_key: Option<String>,
    /// Field values keyed by Jira field name
    pub fields: JsonValue,
    /// Upstream last-modified timestamp when reported
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reference to a newly created Jira issue.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteIssueRef {
    pub key: String,
    pub id: Option<String>,
}

/// Snapshot of a BRD document as a flat field document plus identity.
#[derive(Debug, Clone, PartialEq)]
pub struct BrdDocument {
    pub id: String,
    /// Field values keyed by BRD field name
    pub fields: JsonValue,
    /// Last-modified timestamp when reported
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reference to a newly created BRD document.
#[derive(Debug, Clone, PartialEq)]
pub struct BrdRef {
    pub id: String,
}

/// Issue tracker boundary (Jira in production, fakes in tests).
///
/// Implementations must report a missing issue as `SyncErrorKind::NotFound`
/// rather than folding it into a generic failure.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, key: &str) -> Result<RemoteIssue, SyncError>;

    async fn create_issue(
        &self,
        project_key: &str,
        fields: &JsonValue,
    ) -> Result<RemoteIssueRef, SyncError>;

    async fn update_issue(&self, key: &str, fields: &JsonValue) -> Result<(), SyncError>;
}

/// BRD document store boundary (host application service in production,
/// fakes in tests).
#[async_trait]
pub trait BrdStore: Send + Sync {
    async fn fetch_brd(&self, id: &str) -> Result<BrdDocument, SyncError>;

    async fn create_brd(&self, fields: &JsonValue) -> Result<BrdRef, SyncError>;

    async fn update_brd(&self, id: &str, fields: &JsonValue) -> Result<(), SyncError>;
}

/// Classify a non-success HTTP response from an upstream collaborator.
///
/// Consumes the response body for the error message, so call only after
/// status inspection says the request failed.
pub(crate) async fn classify_failure(service: &str, response: reqwest::Response) -> SyncError {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return SyncError::unauthorized(format!("{} rejected credentials ({})", service, status));
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return SyncError::rate_limited(retry_after);
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return SyncError::not_found(format!("{} entity not found", service));
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();

    if status.is_server_error() {
        SyncError::transient(format!("{} returned {}: {}", service, status, snippet))
    } else {
        SyncError::permanent(format!("{} returned {}: {}", service, status, snippet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transient("boom").is_retryable());
        assert!(SyncError::rate_limited(Some(30)).is_retryable());
        assert!(!SyncError::not_found("PROJ-9").is_retryable());
        assert!(!SyncError::permanent("bad payload").is_retryable());
        assert!(!SyncError::unauthorized("expired token").is_retryable());
    }

    #[test]
    fn retry_after_hint_surfaces_only_for_rate_limits() {
        assert_eq!(SyncError::rate_limited(Some(42)).retry_after_secs(), Some(42));
        assert_eq!(SyncError::rate_limited(None).retry_after_secs(), None);
        assert_eq!(SyncError::transient("x").retry_after_secs(), None);
    }

    #[test]
    fn sync_error_serializes_with_type_tag() {
        let err = SyncError::rate_limited(Some(10));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "rate_limited");
        assert_eq!(json["retry_after_secs"], 10);

        let err = SyncError::not_found("PROJ-1 missing");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "not_found");
        assert_eq!(json["message"], "PROJ-1 missing");
    }

    #[test]
    fn sync_error_round_trips_through_json() {
        let original = SyncError::permanent("unmapped transform")
            .with_details(serde_json::json!({"transform": "bogus"}));
        let json = serde_json::to_value(&original).unwrap();
        let back: SyncError = serde_json::from_value(json).unwrap();
        assert_eq!(back, original);
    }
}
