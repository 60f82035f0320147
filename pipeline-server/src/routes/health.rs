//! `GET /health` (SPEC_FULL ambient addition): liveness plus a best-effort
//! probe of both subprocess binaries, so a deploy can tell "server is up"
//! apart from "server can actually extract anything."

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct BinaryHealth {
    pub available: bool,
    pub version: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub extractor: BinaryHealth,
    pub transcoder: BinaryHealth,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (extractor_ok, extractor_version) = state.extractor.probe_extractor().await;
    let (transcoder_ok, transcoder_version) = state.extractor.probe_transcoder().await;
    Json(HealthResponse {
        status: "ok",
        extractor: BinaryHealth { available: extractor_ok, version: extractor_version },
        transcoder: BinaryHealth { available: transcoder_ok, version: transcoder_version },
    })
}
