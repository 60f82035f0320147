//! `GET /proxy/image` (spec §6): relays a remote thumbnail through our own
//! origin so the browser never sends credentials cross-site, subject to the
//! same SSRF policy as every other outbound fetch.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use pipeline_core::url_policy;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

const PROXY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

pub async fn proxy_image(State(state): State<AppState>, Query(q): Query<ProxyQuery>) -> Result<Response, ApiError> {
    if !url_policy::is_allowed(&q.url) {
        return Err(ApiError::invalid("Invalid URL format"));
    }

    let response = state
        .http_client
        .get(&q.url)
        .timeout(PROXY_TIMEOUT)
        .send()
        .await
        .map_err(|e| ApiError::invalid(format!("upstream fetch failed: {e}")))?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.starts_with("image/") {
        return Err(ApiError::invalid("upstream resource is not an image"));
    }

    let bytes = response.bytes().await.map_err(|e| ApiError::invalid(format!("upstream read failed: {e}")))?;

    let mut resp = (StatusCode::OK, Body::from(bytes)).into_response();
    let headers = resp.headers_mut();
    headers.insert("Content-Type", HeaderValue::from_str(&content_type).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")));
    headers.insert("Cache-Control", HeaderValue::from_static("public, max-age=3600"));
    Ok(resp)
}
