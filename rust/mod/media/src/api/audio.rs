use std::sync::Arc;

use audiorelay_core::ServiceError;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, RANGE};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::model::Credential;
use crate::service::ProxyService;

pub fn router(proxy: Arc<ProxyService>) -> Router {
    Router::new()
        .route("/audio/{asset_id}", get(stream_audio))
        .with_state(proxy)
}

// ---------------------------------------------------------------------------
// GET /audio/{asset_id}
// ---------------------------------------------------------------------------

async fn stream_audio(
    State(proxy): State<Arc<ProxyService>>,
    Path(asset_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let range = match headers.get(RANGE) {
        Some(v) => Some(
            v.to_str()
                .map_err(|_| ServiceError::BadRequest("Range header is not valid ASCII".into()))?,
        ),
        None => None,
    };
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Credential::from_authorization);

    proxy.serve(&asset_id, range, credential).await
}
