//! `GET /download` (spec §4.5 step 5): admits a job if needed, streams the
//! extractor's stdout straight through as the response body.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
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
pub struct DownloadQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
    pub url: Option<String>,
    pub format_id: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    if !state.rate_limiters.download.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }

    let (job_id, explicit_job) = match q.job_id {
        Some(job_id) => (job_id, true),
        None => {
            let url = q.url.ok_or_else(|| ApiError::invalid("url or jobId is required"))?;
            let format_id = q.format_id.ok_or_else(|| ApiError::invalid("formatId is required"))?;
            if !url_policy::is_allowed(&url) {
                return Err(ApiError::invalid("Invalid URL format"));
            }
            let (job_id, _) = state.scheduler.add_download_job(url, format_id);
            (job_id, false)
        }
    };

    let job = stream::job_or_404(state.scheduler.get_job(&job_id), &job_id)?;
    if job.kind != pipeline_core::JobKind::Download {
        return Err(ApiError::invalid("job is not a download job"));
    }

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

    let url = job.url.clone().unwrap_or_default();
    let format_id = job.format_id.clone().unwrap_or_default();

    state.bus.create_session(&url, &format_id, Some(download_id.clone()));
    stream::spawn_job_bridge(state.bus.clone(), state.scheduler.clone(), job_id.clone(), download_id.clone());

    let (title, ext) = stream::resolve_name_and_ext(&job, &state.extractor).await;
    let headers = stream::download_headers(&title, &ext, &download_id, &job_id);

    let handle = state.extractor.stream_download(&url, &format_id, &download_id, state.bus.clone()).await?;
    let body = Body::from_stream(handle.body);

    Ok((StatusCode::OK, headers, body).into_response())
}
