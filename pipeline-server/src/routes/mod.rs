//! HTTP surface assembly (spec §6).

pub mod analyze;
pub mod convert;
pub mod download;
pub mod health;
pub mod progress;
pub mod proxy;
pub mod queue;
mod stream;

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::state::AppState;

/// Paths exempt from the global rate limiter: progress polling and queue
/// status are meant to be polled often, and health checks must never 429.
fn is_exempt(path: &str) -> bool {
    path == "/health" || path.starts_with("/progress/") || path.starts_with("/queue")
}

async fn global_rate_limit(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_exempt(req.uri().path()) {
        return Ok(next.run(req).await);
    }
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|c| c.0.ip());
    if let Some(ip) = ip {
        if !state.rate_limiters.global.check(ip) {
            return Err(ApiError::RateLimited);
        }
    }
    Ok(next.run(req).await)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST, Method::OPTIONS]).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

pub fn build(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        .route("/health", get(health::health))
        .route("/analyze", post(analyze::analyze))
        .route("/analyze/batch", post(analyze::analyze_batch))
        .route("/queue/download", post(queue::queue_download))
        .route("/queue/convert", post(queue::queue_convert))
        .route("/queue", get(queue::get_queue))
        .route("/queue/{job_id}", get(queue::get_job))
        .route("/queue/{job_id}/cancel", post(queue::cancel_job))
        .route("/download", get(download::download))
        .route("/convert", post(convert::convert))
        .route("/progress/{download_id}", get(progress::stream))
        .route("/progress/{download_id}/status", get(progress::status))
        .route("/download/{download_id}/cancel", post(progress::cancel))
        .route("/proxy/image", get(proxy::proxy_image))
        .layer(middleware::from_fn_with_state(state.clone(), global_rate_limit))
        .layer(cors)
        .with_state(state)
}
