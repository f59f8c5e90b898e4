use std::sync::Arc;

use audiorelay_core::ServiceError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::model::BackendMode;
use crate::service::BackendSelector;

type SelectorState = Arc<BackendSelector>;

pub fn router(selector: Arc<BackendSelector>) -> Router {
    Router::new()
        .route("/backend/mode", get(get_mode).put(set_mode))
        .route("/backend/health/{mode}", get(check_health))
        .route("/backend/@auto-select", post(auto_select))
        .route("/backend/servers", get(list_servers))
        .with_state(selector)
}

#[derive(Debug, Deserialize)]
struct SetModeRequest {
    mode: String,
}

// ---------------------------------------------------------------------------
// GET /backend/mode
// ---------------------------------------------------------------------------

async fn get_mode(State(selector): State<SelectorState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "mode": selector.active_mode() }))
}

// ---------------------------------------------------------------------------
// PUT /backend/mode
// ---------------------------------------------------------------------------

async fn set_mode(
    State(selector): State<SelectorState>,
    body: Result<Json<SetModeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let Json(req) = body.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let mode = selector.set_mode(&req.mode)?;
    Ok(Json(serde_json::json!({ "mode": mode })))
}

// ---------------------------------------------------------------------------
// GET /backend/health/{mode}
// ---------------------------------------------------------------------------

async fn check_health(
    State(selector): State<SelectorState>,
    Path(mode): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let mode: BackendMode = mode.parse()?;
    let healthy = selector.check_health(mode).await;
    Ok(Json(serde_json::json!({ "mode": mode, "healthy": healthy })))
}

// ---------------------------------------------------------------------------
// POST /backend/@auto-select
// ---------------------------------------------------------------------------

async fn auto_select(
    State(selector): State<SelectorState>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let mode = selector.auto_select_best_server().await?;
    Ok(Json(serde_json::json!({ "mode": mode })))
}

// ---------------------------------------------------------------------------
// GET /backend/servers
// ---------------------------------------------------------------------------

async fn list_servers(State(selector): State<SelectorState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "active": selector.active_mode(),
        "servers": selector.descriptors(),
    }))
}
