use crate::db::{Advisory, DbHandle, Metadata};
use crate::server::gate::AdmissionGate;
use crate::server::metrics::encode_text;
use crate::server::middleware::{TokenAuth, admit_request, require_token};
use crate::web::{self, WebError};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const DETECT_PATH: &str = "/rpc/detector/v1/detect";
pub const METADATA_PATH: &str = "/rpc/db/v1/metadata";
pub const HEALTH_PATH: &str = "/healthz";
pub const METRICS_PATH: &str = "/metrics";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbHandle>,
    pub registry: Registry,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectRequest {
    pub package: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectResponse {
    pub package: String,
    pub advisories: Vec<Advisory>,
}

async fn detect(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> web::Result<Json<DetectResponse>> {
    if request.package.trim().is_empty() {
        return Err(WebError::Input("package must not be empty".to_string()));
    }
    let advisories = state
        .db
        .lookup(&request.package, request.version.as_deref())
        .await?;
    Ok(Json(DetectResponse {
        package: request.package,
        advisories,
    }))
}

async fn metadata(State(state): State<AppState>) -> web::Result<Json<Metadata>> {
    Ok(Json(state.db.metadata().await?))
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> web::Result<impl IntoResponse> {
    let body = encode_text(&state.registry)?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

/// Builds the router. Every route runs the token check, then the admission
/// gate, then the handler.
pub fn router(state: AppState, gate: AdmissionGate, auth: TokenAuth) -> Router {
    Router::new()
        .route(DETECT_PATH, post(detect))
        .route(METADATA_PATH, get(metadata))
        .route(HEALTH_PATH, get(health))
        .route(METRICS_PATH, get(metrics))
        .with_state(state)
        .layer(middleware::from_fn_with_state(gate, admit_request))
        .layer(middleware::from_fn_with_state(auth, require_token))
        .layer(TraceLayer::new_for_http())
}
