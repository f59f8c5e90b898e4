use tracing::debug;

use super::http::{HttpBackendConfig, UpstreamClient};
use super::{Backend, ByteStream};
use crate::error::BackendError;
use crate::model::{AssetId, AssetMetadata, BackendMode, Credential};
use crate::range::RangeSpec;

const METADATA_FIELDS: &str = "name,mimeType,size";

/// Backend for the authoritative remote blob-store API.
///
/// Layout (Drive v3 style):
///   `GET {base}/files/{id}?fields=name,mimeType,size`  → metadata JSON
///   `GET {base}/files/{id}?alt=media`                 → raw bytes, honours `Range`
pub struct WebBackend {
    upstream: UpstreamClient,
}

impl WebBackend {
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
impl Backend for WebBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Web
    }

    async fn get_metadata(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, BackendError> {
        let url = self.file_url(asset);
        debug!(%asset, "remote api: metadata");
        let query = [("fields", METADATA_FIELDS), ("supportsAllDrives", "true")];
        self.upstream.fetch_metadata(&url, &query, credential).await
    }

    async fn get_stream(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
        range: Option<RangeSpec>,
    ) -> Result<ByteStream, BackendError> {
        let url = self.file_url(asset);
        debug!(%asset, ?range, "remote api: content");
        let query = [("alt", "media"), ("supportsAllDrives", "true")];
        self.upstream.open_stream(&url, &query, credential, range).await
    }
}
