pub mod api;
pub mod backend;
pub mod error;
pub mod model;
pub mod range;
pub mod service;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use audiorelay_core::Module;
use axum::Router;
use tokio_util::sync::CancellationToken;

pub use backend::{Backend, BackendSet, ByteStream, HttpBackendConfig, LocalBackend, WebBackend};
pub use error::BackendError;
pub use model::{AssetId, AssetMetadata, BackendDescriptor, BackendMode, Credential};
pub use range::{parse_range, RangeSpec, ServeRange};
pub use service::{
    BackendSelector, HealthMonitor, HealthProbe, HttpHealthProbe, ProxyConfig, ProxyService,
};

/// The media module: range-aware audio streaming plus backend selection.
///
/// Owns the proxy and, when configured, the periodic health refresher.
pub struct MediaModule {
    proxy: Arc<ProxyService>,
    refresher: Option<CancellationToken>,
}

impl MediaModule {
    pub fn new(proxy: Arc<ProxyService>) -> Self {
        Self {
            proxy,
            refresher: None,
        }
    }

    /// Re-probe both backends every `interval` for as long as the module lives.
    /// A zero interval leaves health refresh to explicit checks.
    pub fn with_health_refresh(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            let monitor = Arc::clone(self.proxy.selector().monitor());
            self.refresher = Some(service::start_refresher(monitor, interval));
        }
        self
    }

    pub fn proxy(&self) -> &Arc<ProxyService> {
        &self.proxy
    }
}

impl Drop for MediaModule {
    fn drop(&mut self) {
        if let Some(token) = self.refresher.take() {
            token.cancel();
        }
    }
}

impl Module for MediaModule {
    fn name(&self) -> &str {
        "media"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.proxy))
    }
}
