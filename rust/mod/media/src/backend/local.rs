use tracing::debug;

use super::http::{HttpBackendConfig, UpstreamClient};
use super::{Backend, ByteStream};
use crate::error::BackendError;
use crate::model::{AssetId, AssetMetadata, BackendMode, Credential};
use crate::range::RangeSpec;

/// Backend for the local mirror.
///
/// Layout:
///   `GET {base}/files/{id}`          → `{"name", "mimeType", "size"}`
///   `GET {base}/files/{id}/content`  → raw bytes, honours `Range`
pub struct LocalBackend {
    upstream: UpstreamClient,
}

impl LocalBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            upstream: UpstreamClient::new(config)?,
        })
    }

    fn file_url(&self, asset: &AssetId) -> String {
        format!("{}/files/{}", self.upstream.base_url(), asset)
    }
}

#[async_trait::async_trait]
impl Backend for LocalBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Local
    }

    async fn get_metadata(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, BackendError> {
        let url = self.file_url(asset);
        debug!(%asset, "local mirror: metadata");
        self.upstream.fetch_metadata(&url, &[], credential).await
    }

    async fn get_stream(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
        range: Option<RangeSpec>,
    ) -> Result<ByteStream, BackendError> {
        let url = format!("{}/content", self.file_url(asset));
        debug!(%asset, ?range, "local mirror: content");
        self.upstream.open_stream(&url, &[], credential, range).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use audiorelay_core::ServiceError;
    use axum::extract::{Path, State};
    use axum::http::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::range::{parse_range, ServeRange};
    use crate::testing::{collect_stream, serve_upstream};

    const DATA: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

    type SeenAuth = Arc<Mutex<Vec<Option<String>>>>;

    /// Mirror whose behaviour is picked by the asset id:
    /// `lazy` ignores Range, `skewed` answers the wrong interval,
    /// `gone` rejects every range, `missing` does not exist,
    /// `noisy` fails with an oversized error body.
    fn mirror(seen: SeenAuth) -> Router {
        Router::new()
            .route("/files/{id}", get(metadata))
            .route("/files/{id}/content", get(content))
            .with_state(seen)
    }

    async fn metadata(
        State(seen): State<SeenAuth>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Response {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        seen.lock().unwrap().push(auth);

        match id.as_str() {
            "missing" => StatusCode::NOT_FOUND.into_response(),
            "noisy" => (StatusCode::SERVICE_UNAVAILABLE, "x".repeat(1 << 20)).into_response(),
            _ => axum::Json(serde_json::json!({
                "name": format!("{}.mp3", id),
                "mimeType": "audio/mpeg",
                "size": DATA.len().to_string(),
            }))
            .into_response(),
        }
    }

    async fn content(Path(id): Path<String>, headers: HeaderMap) -> Response {
        let header = headers.get(RANGE).and_then(|v| v.to_str().ok());
        let spec = match parse_range(header, DATA.len() as u64) {
            Ok(ServeRange::Partial(spec)) => Some(spec),
            Ok(ServeRange::Full { .. }) => None,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        match (id.as_str(), spec) {
            ("gone", _) => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
            ("lazy", _) | (_, None) => (StatusCode::OK, DATA).into_response(),
            ("skewed", Some(s)) => (
                StatusCode::PARTIAL_CONTENT,
                [(CONTENT_RANGE, format!("bytes {}-{}/{}", s.start + 1, s.end, s.total))],
                &DATA[s.start as usize + 1..=s.end as usize],
            )
                .into_response(),
            (_, Some(s)) => (
                StatusCode::PARTIAL_CONTENT,
                [(CONTENT_RANGE, s.content_range())],
                &DATA[s.start as usize..=s.end as usize],
            )
                .into_response(),
        }
    }

    async fn backend(service_token: Option<&str>) -> (LocalBackend, SeenAuth) {
        let seen = SeenAuth::default();
        let base = serve_upstream(mirror(Arc::clone(&seen))).await;
        let mut config = HttpBackendConfig::new(base);
        config.service_token = service_token.map(Credential::new);
        (LocalBackend::new(config).unwrap(), seen)
    }

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    fn range(start: u64, end: u64) -> Option<RangeSpec> {
        Some(RangeSpec { start, end, total: DATA.len() as u64 })
    }

    #[tokio::test]
    async fn metadata_with_string_size() {
        let (local, _) = backend(None).await;
        let meta = local.get_metadata(&id("clip"), None).await.unwrap();
        assert_eq!(meta.name, "clip.mp3");
        assert_eq!(meta.mime_type, "audio/mpeg");
        assert_eq!(meta.size_bytes, 26);
    }

    #[tokio::test]
    async fn forwards_caller_credential_then_service_token() {
        let (local, seen) = backend(Some("svc")).await;
        let user = Credential::new("user-token");
        local.get_metadata(&id("clip"), Some(&user)).await.unwrap();
        local.get_metadata(&id("clip"), None).await.unwrap();

        let (anonymous, seen_anonymous) = backend(None).await;
        anonymous.get_metadata(&id("clip"), None).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("Bearer user-token".to_string()), Some("Bearer svc".to_string())]
        );
        assert_eq!(*seen_anonymous.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn missing_asset_is_not_found() {
        let (local, _) = backend(None).await;
        let err = local.get_metadata(&id("missing"), None).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn oversized_error_body_is_cut_short() {
        let (local, _) = backend(None).await;
        let err = local.get_metadata(&id("noisy"), None).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(err.to_string().len() < 2048);
    }

    #[tokio::test]
    async fn streams_full_and_partial_content() {
        let (local, _) = backend(None).await;

        let full = local.get_stream(&id("clip"), None, None).await.unwrap();
        assert_eq!(collect_stream(full).await, DATA);

        let part = local.get_stream(&id("clip"), None, range(3, 9)).await.unwrap();
        assert_eq!(collect_stream(part).await, &DATA[3..=9]);
    }

    #[tokio::test]
    async fn ignored_range_has_its_prefix_discarded() {
        let (local, _) = backend(None).await;
        let stream = local.get_stream(&id("lazy"), None, range(10, 25)).await.unwrap();
        // The session caps the length; the backend only guarantees the start.
        assert_eq!(collect_stream(stream).await, &DATA[10..]);
    }

    #[tokio::test]
    async fn wrong_partial_start_is_malformed() {
        let (local, _) = backend(None).await;
        let err = local.get_stream(&id("skewed"), None, range(4, 8)).await.err().unwrap();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn upstream_416_is_internal() {
        let (local, _) = backend(None).await;
        let err = local.get_stream(&id("gone"), None, range(0, 4)).await.err().unwrap();
        assert!(matches!(err, BackendError::Malformed(_)));
        assert!(matches!(ServiceError::from(err), ServiceError::Internal(_)));
    }
}
