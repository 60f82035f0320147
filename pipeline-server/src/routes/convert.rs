//! `POST /convert` (spec §6 HTTP surface): same admission and streaming
//! shape as `/download`, but pipes the extractor through the transcoder.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline_core::url_policy;
use serde::Deserialize;

use super::queue::AdmissionResponse;
use super::stream::{self, Admission};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ConvertRequest {
    pub url: Option<String>,
    pub target_format: Option<String>,
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

pub async fn convert(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<ConvertRequest>,
) -> Result<Response, ApiError> {
    if !state.rate_limiters.convert.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }

    let (job_id, explicit_job) = match req.job_id {
        Some(job_id) => (job_id, true),
        None => {
            let url = req.url.ok_or_else(|| ApiError::invalid("url or jobId is required"))?;
            let target_format = req.target_format.ok_or_else(|| ApiError::invalid("target_format is required"))?;
            if !url_policy::is_allowed(&url) {
                return Err(ApiError::invalid("Invalid URL format"));
            }
            let (job_id, _) = state
                .scheduler
                .add_convert_job(Some(url), target_format, None, None)
                .map_err(|e| ApiError::invalid(e.to_string()))?;
            (job_id, false)
        }
    };

    let job = stream::job_or_404(state.scheduler.get_job(&job_id), &job_id)?;
    if job.kind != pipeline_core::JobKind::Convert {
        return Err(ApiError::invalid("job is not a convert job"));
    }

    let source_url = match &job.url {
        Some(url) => url.clone(),
        None => {
            let dep_id = job.depends_on.clone().ok_or_else(|| ApiError::invalid("convert job has neither a url nor a dependency"))?;
            let dep = stream::job_or_404(state.scheduler.get_job(&dep_id), &dep_id)?;
            dep.url.clone().ok_or_else(|| ApiError::Internal("dependency job has no source url".to_string()))?
        }
    };
    let target_format = job.target_format.clone().ok_or_else(|| ApiError::Internal("convert job missing target_format".to_string()))?;

    let download_id = match stream::try_start(&state.scheduler, &job_id) {
        Admission::Started { download_id } => download_id,
        Admission::NotStartable => {
            if explicit_job {
                return Err(ApiError::Conflict("another job is already active".to_string()));
            }
            let body = AdmissionResponse { job_id, can_start: false, message: "job queued behind another active job".to_string() };
            return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
        }
    };

    state.bus.create_session(&source_url, &target_format, Some(download_id.clone()));
    stream::spawn_job_bridge(state.bus.clone(), state.scheduler.clone(), job_id.clone(), download_id.clone());

    let (title, _) = stream::resolve_name_and_ext(&job, &state.extractor).await;
    let headers = stream::download_headers(&title, &target_format, &download_id, &job_id);

    let handle = state.extractor.convert_media(&source_url, &target_format, &download_id, state.bus.clone()).await?;
    let body = Body::from_stream(handle.body);

    Ok((StatusCode::OK, headers, body).into_response())
}
