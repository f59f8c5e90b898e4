mod audio;
mod backend;

use std::sync::Arc;

use axum::Router;

use crate::service::ProxyService;

/// Build the complete media module router.
///
/// Routes:
/// - `GET  /audio/{asset_id}`          stream an asset, honours `Range`
/// - `GET  /backend/mode`              active backend mode
/// - `PUT  /backend/mode`              switch backend mode
/// - `GET  /backend/health/{mode}`     probe one backend
/// - `POST /backend/@auto-select`      pick the best healthy backend
/// - `GET  /backend/servers`           descriptors + active mode
pub fn router(proxy: Arc<ProxyService>) -> Router {
    Router::new()
        .merge(audio::router(Arc::clone(&proxy)))
        .merge(backend::router(Arc::clone(proxy.selector())))
}
