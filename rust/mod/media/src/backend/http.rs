//! HTTP plumbing shared by both backends.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::ByteStream;
use crate::error::BackendError;
use crate::model::{AssetMetadata, Credential};
use crate::range::RangeSpec;

const USER_AGENT: &str = concat!("audiorelay/", env!("CARGO_PKG_VERSION"));

/// Upper bound on how much of an upstream error body is kept for the log.
const ERROR_BODY_LIMIT: usize = 1024;

/// Configuration for one HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Credential used when the request itself carries none.
    pub service_token: Option<Credential>,
    /// Bound on a whole metadata call (default: 10s).
    pub metadata_timeout: Duration,
    /// Bound on connecting and receiving stream response headers (default: 5s).
    pub connect_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_token: None,
            metadata_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Metadata as blob-store APIs return it. `size` is a decimal string in
/// some APIs and a number in others.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteMetadata {
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    size: Option<RemoteSize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteSize {
    Number(u64),
    Text(String),
}

impl RemoteMetadata {
    fn into_metadata(self) -> Result<AssetMetadata, BackendError> {
        let size_bytes = match self.size {
            Some(RemoteSize::Number(n)) => n,
            Some(RemoteSize::Text(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| BackendError::Malformed(format!("size {:?} is not a byte count", s)))?,
            None => {
                return Err(BackendError::Malformed(format!(
                    "metadata for {:?} has no size",
                    self.name
                )))
            }
        };
        Ok(AssetMetadata {
            name: self.name,
            mime_type: self.mime_type.unwrap_or_default(),
            size_bytes,
        })
    }
}

/// reqwest client plus the per-backend settings every call needs.
pub struct UpstreamClient {
    client: Client,
    config: HttpBackendConfig,
}

impl UpstreamClient {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BackendError::Malformed(format!("building HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn authorize(&self, request: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential.or(self.config.service_token.as_ref()) {
            Some(cred) => request.header(AUTHORIZATION, format!("Bearer {}", cred.expose())),
            None => request,
        }
    }

    /// GET `url` and decode blob-store metadata from the JSON body.
    pub async fn fetch_metadata(
        &self,
        url: &str,
        query: &[(&str, &str)],
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, BackendError> {
        let timeout = self.config.metadata_timeout;
        let request = self.authorize(self.client.get(url).query(query), credential);

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(e, timeout.as_secs()))?;
        let response = check_status(response, url).await?;

        let remote: RemoteMetadata = response
            .json()
            .await
            .map_err(|e| BackendError::from_transport(e, timeout.as_secs()))?;
        remote.into_metadata()
    }

    /// GET `url` with an optional `Range` and hand back the body as a stream.
    pub async fn open_stream(
        &self,
        url: &str,
        query: &[(&str, &str)],
        credential: Option<&Credential>,
        range: Option<RangeSpec>,
    ) -> Result<ByteStream, BackendError> {
        let timeout = self.config.connect_timeout;
        let mut request = self.authorize(self.client.get(url).query(query), credential);
        if let Some(spec) = range {
            request = request.header(RANGE, spec.range_header());
        }

        // Only the wait for response headers is bounded here; body reads are
        // bounded by the stream session.
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| BackendError::Timeout {
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| BackendError::from_transport(e, timeout.as_secs()))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(BackendError::Malformed(format!(
                "{} rejected a range computed from its own metadata",
                url
            )));
        }
        let response = check_status(response, url).await?;

        let skip = match (range, response.status()) {
            (Some(spec), StatusCode::PARTIAL_CONTENT) => {
                let served_start = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(content_range_start);
                if served_start != Some(spec.start) {
                    return Err(BackendError::Malformed(format!(
                        "{} served range starting at {:?}, requested {}",
                        url, served_start, spec.start
                    )));
                }
                0
            }
            // Upstream ignored the Range header and sent the whole asset.
            (Some(spec), _) => {
                debug!(url, start = spec.start, "upstream ignored Range; discarding prefix");
                spec.start
            }
            (None, _) => 0,
        };

        let secs = timeout.as_secs();
        let stream: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(move |chunk| chunk.map_err(|e| BackendError::from_transport(e, secs))),
        );
        Ok(discard_prefix(stream, skip))
    }
}

/// Turn a non-success response into a classified error, reading a bounded
/// slice of the body for the log.
async fn check_status(response: Response, url: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_error_body(response).await;
    Err(BackendError::from_status(status, url, &body))
}

/// At most `ERROR_BODY_LIMIT` bytes of an error body, read within 2s.
/// The rest of the body is never pulled.
async fn read_error_body(response: Response) -> String {
    let mut body = Vec::with_capacity(ERROR_BODY_LIMIT);
    let mut chunks = response.bytes_stream();
    let read = async {
        while let Some(Ok(chunk)) = chunks.next().await {
            let room = ERROR_BODY_LIMIT - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= ERROR_BODY_LIMIT {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(2), read).await;
    String::from_utf8_lossy(&body).into_owned()
}

/// Start byte of a `Content-Range: bytes <start>-<end>/<size>` value.
fn content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, _size) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    start.trim().parse().ok()
}

/// Drop the first `skip` bytes of a stream.
pub(crate) fn discard_prefix(stream: ByteStream, skip: u64) -> ByteStream {
    if skip == 0 {
        return stream;
    }
    let mut remaining = skip;
    Box::pin(stream.filter_map(move |item| {
        let out = match item {
            Ok(mut chunk) => {
                let len = chunk.len() as u64;
                if remaining >= len {
                    remaining -= len;
                    None
                } else {
                    let tail = chunk.split_off(remaining as usize);
                    remaining = 0;
                    Some(Ok(tail))
                }
            }
            Err(e) => Some(Err(e)),
        };
        futures_util::future::ready(out)
    }))
}
