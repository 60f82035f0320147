//! Maps the pipeline's internal errors onto the HTTP error taxonomy (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::ExtractorError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    NotFound(String),
    Conflict(String),
    RateLimited,
    Extraction(ExtractorError),
    Internal(String),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::InvalidRequest(msg.into())
    }
}

impl From<ExtractorError> for ApiError {
    fn from(err: ExtractorError) -> Self {
        ApiError::Extraction(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_string()),
            ApiError::Extraction(e) => (extractor_status(e), e.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}

fn extractor_status(err: &ExtractorError) -> StatusCode {
    match err {
        ExtractorError::InvalidUrl | ExtractorError::UnknownTargetFormat(_) => StatusCode::BAD_REQUEST,
        ExtractorError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ExtractorError::Unavailable | ExtractorError::Unsupported => StatusCode::BAD_GATEWAY,
        ExtractorError::ExtractorNotFound(_) | ExtractorError::TranscoderNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ExtractorError::ExtractionFailed(_) | ExtractorError::ConversionFailed(_) => StatusCode::BAD_GATEWAY,
        ExtractorError::Io(_) | ExtractorError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
