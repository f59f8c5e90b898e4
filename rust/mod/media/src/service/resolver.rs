use audiorelay_core::ServiceError;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::model::{AssetId, AssetMetadata, Credential};

/// Fetches asset metadata from the backend chosen for a request.
///
/// Metadata is never cached. Failures are classified through
/// `From<BackendError> for ServiceError`; an `UpstreamUnavailable` failure
/// is retried once, immediately, since no response byte has been sent yet.
/// The resolver never touches backend health state.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataResolver;

impl MetadataResolver {
    pub async fn resolve(
        &self,
        asset: &AssetId,
        backend: &dyn Backend,
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, ServiceError> {
        let mode = backend.mode();
        let first: ServiceError = match backend.get_metadata(asset, credential).await {
            Ok(meta) => return Ok(meta),
            Err(e) => e.into(),
        };
        if !first.is_retryable() {
            return Err(first);
        }

        warn!(%asset, %mode, error = %first, "metadata fetch failed; retrying once");
        let meta = backend
            .get_metadata(asset, credential)
            .await
            .map_err(ServiceError::from)?;
        debug!(%asset, %mode, "metadata retry succeeded");
        Ok(meta)
    }
}
