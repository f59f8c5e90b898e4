//! Upstream failures and their classification into [`ServiceError`].

use audiorelay_core::ServiceError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by a [`Backend`](crate::backend::Backend) call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The asset does not exist (or is invisible to the credential).
    #[error("asset not found: {0}")]
    NotFound(String),

    /// The credential lacks access to the asset.
    #[error("access denied: {0}")]
    PermissionDenied(String),

    /// Connection refused, reset, DNS failure, 5xx, rate limiting.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A bounded wait expired.
    #[error("backend timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The backend answered with something we cannot interpret.
    #[error("unexpected backend response: {0}")]
    Malformed(String),

    /// Any other non-success status.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
}

impl BackendError {
    /// Classify a non-success upstream status. `body` is the (possibly
    /// empty) response payload and only feeds the logged detail.
    pub fn from_status(status: StatusCode, url: &str, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("{} returned {}", url, status)
        } else {
            format!("{} returned {}: {}", url, status, truncate(body, 512))
        };
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => BackendError::NotFound(detail),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                if is_rate_limited(body) {
                    BackendError::Unavailable(detail)
                } else {
                    BackendError::PermissionDenied(detail)
                }
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                BackendError::Unavailable(detail)
            }
            s if s.is_server_error() => BackendError::Unavailable(detail),
            s => BackendError::Http {
                status: s.as_u16(),
                message: detail,
            },
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            BackendError::Timeout { timeout_secs }
        } else if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            // Strip the URL: it may carry query credentials.
            BackendError::Unavailable(err.without_url().to_string())
        }
    }
}

/// Blob-store APIs report quota exhaustion as 403 with a `*RateLimitExceeded`
/// reason in the error payload.
fn is_rate_limited(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("ratelimitexceeded") || lower.contains("quotaexceeded")
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl From<BackendError> for ServiceError {
    fn from(err: BackendError) -> Self {
        let detail = err.to_string();
        match err {
            BackendError::NotFound(_) => ServiceError::NotFound(detail),
            BackendError::PermissionDenied(_) => ServiceError::PermissionDenied(detail),
            BackendError::Unavailable(_) | BackendError::Timeout { .. } => {
                ServiceError::UpstreamUnavailable(detail)
            }
            BackendError::Malformed(_) | BackendError::Http { .. } => ServiceError::Internal(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status: u16, body: &str) -> ServiceError {
        let status = StatusCode::from_u16(status).unwrap();
        BackendError::from_status(status, "http://backend/files/abc", body).into()
    }

    #[test]
    fn status_classification() {
        assert!(matches!(classify(404, ""), ServiceError::NotFound(_)));
        assert!(matches!(classify(410, ""), ServiceError::NotFound(_)));
        assert!(matches!(classify(401, ""), ServiceError::PermissionDenied(_)));
        assert!(matches!(classify(403, "{}"), ServiceError::PermissionDenied(_)));
        assert!(matches!(classify(429, ""), ServiceError::UpstreamUnavailable(_)));
        assert!(matches!(classify(500, ""), ServiceError::UpstreamUnavailable(_)));
        assert!(matches!(classify(503, ""), ServiceError::UpstreamUnavailable(_)));
        assert!(matches!(classify(400, ""), ServiceError::Internal(_)));
        assert!(matches!(classify(418, ""), ServiceError::Internal(_)));
    }

    #[test]
    fn rate_limited_forbidden_is_unavailable() {
        let body = r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}],"code":403}}"#;
        assert!(matches!(classify(403, body), ServiceError::UpstreamUnavailable(_)));
    }

    #[test]
    fn timeout_is_unavailable() {
        let err: ServiceError = BackendError::Timeout { timeout_secs: 3 }.into();
        assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_is_internal() {
        let err: ServiceError = BackendError::Malformed("size missing".into()).into();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[test]
    fn long_bodies_are_truncated_in_detail() {
        let body = "é".repeat(600);
        let err = BackendError::from_status(StatusCode::BAD_GATEWAY, "u", &body);
        assert!(err.to_string().len() < 600 + 64);
    }
}
