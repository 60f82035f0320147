//! `POST /analyze`, `POST /analyze/batch` (spec §4.5).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use futures::future::join_all;
use pipeline_core::{url_policy, MediaInfo};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_BATCH: usize = 20;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

pub async fn analyze(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<MediaInfo>, ApiError> {
    if !state.rate_limiters.analyze.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    if !url_policy::is_allowed(&req.url) {
        return Err(ApiError::invalid("Invalid URL format"));
    }
    let info = state.extractor.analyze(&req.url).await?;
    Ok(Json(info))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
}

#[derive(Serialize)]
pub struct BatchItemResult {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

pub async fn analyze_batch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if !state.rate_limiters.analyze.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    if req.urls.is_empty() || req.urls.len() > MAX_BATCH {
        return Err(ApiError::invalid(format!("urls must contain 1..={MAX_BATCH} items")));
    }

    let tasks = req.urls.into_iter().map(|url| {
        let state = state.clone();
        async move {
            if !url_policy::is_allowed(&url) {
                return BatchItemResult { url, success: false, error: Some("Invalid URL format".to_string()), media: None };
            }
            match state.extractor.analyze(&url).await {
                Ok(info) => BatchItemResult { url, success: true, error: None, media: Some(info) },
                Err(e) => BatchItemResult { url, success: false, error: Some(e.to_string()), media: None },
            }
        }
    });

    let results: Vec<BatchItemResult> = join_all(tasks).await;
    let successful = results.iter().filter(|r| r.success).count();
    let failed = results.len() - successful;
    Ok(Json(BatchResponse { total: results.len(), successful, failed, results }))
}
