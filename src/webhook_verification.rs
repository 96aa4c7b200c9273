//! # Webhook Signature Verification
//!
//! HMAC-SHA256 verification for Jira webhook deliveries. Jira signs the
//! raw request body and sends the digest in `X-Hub-Signature` with a
//! `sha256=` prefix; comparison is constant-time via the MAC itself.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature on Jira deliveries.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Webhook verification not configured")]
    NotConfigured,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        // Every verification failure is a 401; the body never reaches a
        // handler on any of these paths.
        StatusCode::UNAUTHORIZED
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verify a Jira webhook body signature using HMAC-SHA256.
pub fn verify_jira_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(body_size = body.len(), "Starting Jira signature verification");

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: SIGNATURE_HEADER.to_string(),
        });
    }

    let signature_prefix = "sha256=";
    let provided_hex = signature_header.strip_prefix(signature_prefix).ok_or_else(|| {
        VerificationError::InvalidSignatureFormat {
            header: format!("{} must start with 'sha256='", SIGNATURE_HEADER),
        }
    })?;

    let provided_bytes =
        hex::decode(provided_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: format!("{} contains invalid hex", SIGNATURE_HEADER),
        })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);

    // verify_slice compares in constant time.
    mac.verify_slice(&provided_bytes)
        .map_err(|_| VerificationError::VerificationFailed)
}

/// Verify a delivery against the configured secret. In the `local` and
/// `test` profiles an absent secret skips verification so the endpoint
/// stays usable without Jira credentials; everywhere else an absent
/// secret rejects the delivery.
pub fn verify_webhook_request(
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<()> {
    let Some(secret) = config.webhook_jira_secret.as_deref() else {
        if matches!(config.profile.as_str(), "local" | "test") {
            debug!("Jira webhook secret not configured; skipping verification in dev profile");
            return Ok(());
        }
        warn!("Jira webhook secret not configured; rejecting delivery");
        return Err(VerificationError::NotConfigured);
    };

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    verify_jira_signature(body, signature_header, secret)
}

/// Middleware for webhook signature verification on the public webhook
/// route. Buffers the body, verifies, and replays the request into the
/// handler on success.
pub async fn webhook_verification_middleware(
    State(config): State<std::sync::Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX).await.map_err(|e| {
        error!(error = ?e, "Failed to read request body for webhook verification");
        StatusCode::BAD_REQUEST
    })?;

    match verify_webhook_request(&body_bytes, &parts.headers, &config) {
        Ok(()) => {
            info!(
                body_size = body_bytes.len(),
                "Webhook signature verified successfully"
            );
            let request = Request::from_parts(parts, axum::body::Body::from(body_bytes));
            Ok(next.run(request).await)
        }
        Err(e) => {
            error!(error = %e, "Webhook signature verification failed");
            Err(e.status_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let secret = "test_secret";
        let body = b"{\"webhookEvent\":\"jira:issue_updated\"}";
        let header = sign(body, secret);

        assert!(verify_jira_signature(body, &header, secret).is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = "test_secret";
        let header = sign(b"original body", secret);

        assert!(matches!(
            verify_jira_signature(b"tampered body", &header, secret),
            Err(VerificationError::VerificationFailed)
        ));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = b"payload";
        let header = sign(body, "right_secret");

        assert!(verify_jira_signature(body, &header, "wrong_secret").is_err());
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert!(matches!(
            verify_jira_signature(b"payload", "", "secret"),
            Err(VerificationError::MissingSignature { .. })
        ));
    }

    #[test]
    fn unprefixed_signature_is_rejected() {
        let err = verify_jira_signature(b"payload", "deadbeef", "secret").unwrap_err();
        assert!(matches!(
            err,
            VerificationError::InvalidSignatureFormat { .. }
        ));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let err = verify_jira_signature(b"payload", "sha256=not-hex!", "secret").unwrap_err();
        assert!(matches!(
            err,
            VerificationError::InvalidSignatureFormat { .. }
        ));
    }

    #[test]
    fn request_verification_reads_header() {
        let secret = "test-secret-123";
        let body = b"{}";

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, sign(body, secret).parse().unwrap());

        let config = AppConfig {
            webhook_jira_secret: Some(secret.to_string()),
            ..AppConfig::default()
        };

        assert!(verify_webhook_request(body, &headers, &config).is_ok());
    }

    #[test]
    fn local_profile_without_secret_passes_through() {
        let config = AppConfig::default(); // local profile, no secret
        let headers = HeaderMap::new();

        assert!(verify_webhook_request(b"{}", &headers, &config).is_ok());
    }

    #[test]
    fn production_profile_without_secret_rejects() {
        let config = AppConfig {
            profile: "production".to_string(),
            ..AppConfig::default()
        };
        let headers = HeaderMap::new();

        assert!(matches!(
            verify_webhook_request(b"{}", &headers, &config),
            Err(VerificationError::NotConfigured)
        ));
    }

    #[test]
    fn configured_secret_rejects_unsigned_delivery() {
        let config = AppConfig {
            webhook_jira_secret: Some("secret".to_string()),
            ..AppConfig::default()
        };
        let headers = HeaderMap::new();

        assert!(verify_webhook_request(b"{}", &headers, &config).is_err());
    }

    #[test]
    fn all_verification_errors_map_to_401() {
        let errors = [
            VerificationError::MissingSignature {
                header: SIGNATURE_HEADER.to_string(),
            },
            VerificationError::InvalidSignatureFormat {
                header: "bad".to_string(),
            },
            VerificationError::VerificationFailed,
            VerificationError::NotConfigured,
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }
}
