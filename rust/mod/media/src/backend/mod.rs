//! Backend strategies for reaching the blob store.
//!
//! Two interchangeable implementations satisfy the same contract:
//! [`LocalBackend`] talks to a low-latency mirror, [`WebBackend`] to the
//! authoritative remote API. The proxy picks one per request through
//! [`BackendSet::get`]; nothing else branches on the mode.

mod http;
mod local;
mod web;

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::BackendError;
use crate::model::{AssetId, AssetMetadata, BackendMode, Credential};
use crate::range::RangeSpec;

pub use http::{HttpBackendConfig, UpstreamClient};
pub use local::LocalBackend;
pub use web::WebBackend;

/// Body bytes of one upstream response, in order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// The two-method upstream contract.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Which mode this backend implements.
    fn mode(&self) -> BackendMode;

    /// Fetch `{name, mimeType, sizeBytes}` for an asset.
    async fn get_metadata(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, BackendError>;

    /// Open a byte stream for `range`, or the whole asset when `None`.
    ///
    /// The returned stream yields exactly the requested interval; callers
    /// still cap it to the advertised length.
    async fn get_stream(
        &self,
        asset: &AssetId,
        credential: Option<&Credential>,
        range: Option<RangeSpec>,
    ) -> Result<ByteStream, BackendError>;
}

/// One backend per mode, fixed for the lifetime of the process.
#[derive(Clone)]
pub struct BackendSet {
    local: Arc<dyn Backend>,
    web: Arc<dyn Backend>,
}

impl BackendSet {
    pub fn new(local: Arc<dyn Backend>, web: Arc<dyn Backend>) -> Self {
        Self { local, web }
    }

    pub fn get(&self, mode: BackendMode) -> Arc<dyn Backend> {
        match mode {
            BackendMode::Local => Arc::clone(&self.local),
            BackendMode::Web => Arc::clone(&self.web),
        }
    }
}
