use std::sync::Arc;
use std::time::Duration;

use audiorelay_core::ServiceError;
use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use tracing::{debug, info};

use crate::backend::BackendSet;
use crate::model::{AssetId, AssetMetadata, Credential};
use crate::range::{parse_range, ServeRange};
use crate::service::resolver::MetadataResolver;
use crate::service::selector::BackendSelector;
use crate::service::session::StreamSession;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Tunables for the streaming proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Longest wait for a single upstream read once streaming (default: 30s).
    pub read_idle_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            read_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-request lifecycle. Every request walks these in order; a failure
/// in the first two ends it before any byte is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyState {
    Resolving,
    RangeComputed,
    Streaming,
}

/// The streaming proxy core: metadata, then range, then bytes.
pub struct ProxyService {
    selector: Arc<BackendSelector>,
    backends: BackendSet,
    resolver: MetadataResolver,
    config: ProxyConfig,
}

impl ProxyService {
    pub fn new(selector: Arc<BackendSelector>, backends: BackendSet, config: ProxyConfig) -> Self {
        Self {
            selector,
            backends,
            resolver: MetadataResolver,
            config,
        }
    }

    pub fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    /// Serve `asset_id` honouring an optional `Range` header.
    ///
    /// Errors returned here are rendered before any body byte exists; once
    /// the response is returned, upstream failures can only cut the body short.
    pub async fn serve(
        &self,
        asset_id: &str,
        range_header: Option<&str>,
        credential: Option<Credential>,
    ) -> Result<Response, ServiceError> {
        let asset = AssetId::parse(asset_id)?;

        // The mode is read once; a switch mid-request affects only later requests.
        let mode = self.selector.active_mode();
        let backend = self.backends.get(mode);
        info!(%asset, %mode, range = range_header.unwrap_or("-"), "audio request");

        trace_state(&asset, ProxyState::Resolving);
        let meta = self
            .resolver
            .resolve(&asset, backend.as_ref(), credential.as_ref())
            .await?;

        let range = parse_range(range_header, meta.size_bytes)?;
        trace_state(&asset, ProxyState::RangeComputed);

        let content_length = range.content_length();
        let builder = response_head(&meta, &range);

        if content_length == 0 {
            // Nothing to pull: an empty asset requested without a range.
            return builder
                .body(Body::empty())
                .map_err(|e| ServiceError::Internal(format!("building response: {}", e)));
        }

        let upstream_range = match range {
            ServeRange::Partial(spec) => Some(spec),
            ServeRange::Full { .. } => None,
        };
        let upstream = backend
            .get_stream(&asset, credential.as_ref(), upstream_range)
            .await
            .map_err(ServiceError::from)?;

        trace_state(&asset, ProxyState::Streaming);
        let session = StreamSession::new(
            upstream,
            asset,
            mode,
            content_length,
            self.config.read_idle_timeout,
        );
        builder
            .body(session.into_body())
            .map_err(|e| ServiceError::Internal(format!("building response: {}", e)))
    }
}

fn trace_state(asset: &AssetId, state: ProxyState) {
    debug!(%asset, ?state, "proxy state");
}

/// Status line and headers, all decided before the first body byte.
fn response_head(meta: &AssetMetadata, range: &ServeRange) -> axum::http::response::Builder {
    let content_type = HeaderValue::from_str(&meta.mime_type)
        .ok()
        .filter(|_| !meta.mime_type.trim().is_empty())
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    let disposition = format!("inline; filename=\"{}\"", sanitize_filename(&meta.name));

    let mut builder = Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_DISPOSITION, disposition)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_LENGTH, range.content_length());

    builder = match range {
        ServeRange::Partial(spec) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_RANGE, spec.content_range()),
        ServeRange::Full { .. } => builder.status(StatusCode::OK),
    };
    builder
}

/// Make a name safe inside a quoted `Content-Disposition` filename.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    if cleaned.trim().is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}
