use axum::http::header::CONTENT_RANGE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error, warn};

// ── Error kinds ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error kind constants.
///
/// Clients should match on `error` from `{"error": "NotFound", "message": "..."}`.
/// Kinds never change; messages may be reworded.
pub mod error_kind {
    pub const BAD_REQUEST: &str = "BadRequest";
    pub const PERMISSION_DENIED: &str = "PermissionDenied";
    pub const NOT_FOUND: &str = "NotFound";
    pub const RANGE_NOT_SATISFIABLE: &str = "RangeNotSatisfiable";
    pub const UPSTREAM_UNAVAILABLE: &str = "UpstreamUnavailable";
    pub const INTERNAL: &str = "InternalError";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified error type for everything that can end a request before the
/// first body byte is sent.
///
/// Each variant maps to a stable kind (see [`error_kind`]) and an HTTP
/// status code. The JSON response always includes both:
///
/// ```json
/// {"error": "NotFound", "message": "asset not found"}
/// ```
///
/// The `String` payloads are *internal detail*: backend responses, URLs,
/// storage messages. They are logged when the error is rendered and are
/// never written to the response body, except for `BadRequest`, whose
/// detail describes the caller's own input.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed asset id, Range header or request body. HTTP 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backend refused access to the asset. HTTP 403.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The asset does not exist at the backend. HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested range cannot be served for a resource of `total` bytes. HTTP 416.
    #[error("range not satisfiable: {reason} (size {total})")]
    RangeNotSatisfiable { total: u64, reason: String },

    /// Backend network failure, timeout or 5xx. HTTP 502.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Anything unclassified. HTTP 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => error_kind::BAD_REQUEST,
            ServiceError::PermissionDenied(_) => error_kind::PERMISSION_DENIED,
            ServiceError::NotFound(_) => error_kind::NOT_FOUND,
            ServiceError::RangeNotSatisfiable { .. } => error_kind::RANGE_NOT_SATISFIABLE,
            ServiceError::UpstreamUnavailable(_) => error_kind::UPSTREAM_UNAVAILABLE,
            ServiceError::Internal(_) => error_kind::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServiceError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::BadRequest(detail) => detail.clone(),
            ServiceError::PermissionDenied(_) => "access to the asset was denied".to_string(),
            ServiceError::NotFound(_) => "asset not found".to_string(),
            ServiceError::RangeNotSatisfiable { total, .. } => {
                format!("requested range cannot be served for a resource of {} bytes", total)
            }
            ServiceError::UpstreamUnavailable(_) => "storage backend is unavailable".to_string(),
            ServiceError::Internal(_) => "internal server error".to_string(),
        }
    }

    /// Whether a failed call may be retried before any response byte is sent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::UpstreamUnavailable(_))
    }

    fn log(&self) {
        let kind = self.kind();
        match self {
            ServiceError::UpstreamUnavailable(_) | ServiceError::Internal(_) => {
                error!(kind, detail = %self, "request failed")
            }
            ServiceError::PermissionDenied(_) | ServiceError::NotFound(_) => {
                warn!(kind, detail = %self, "request rejected")
            }
            ServiceError::BadRequest(_) | ServiceError::RangeNotSatisfiable { .. } => {
                debug!(kind, detail = %self, "request rejected")
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.public_message(),
        });
        let mut response = (status, axum::Json(body)).into_response();

        if let ServiceError::RangeNotSatisfiable { total, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                response.headers_mut().insert(CONTENT_RANGE, value);
            }
        }
        response
    }
}
