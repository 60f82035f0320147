//! `/queue*` endpoints: admission, snapshot, per-job lookup, cancellation.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::Json;
use pipeline_core::{url_policy, Job, QueueState, SchedulerError};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct QueueDownloadRequest {
    pub url: String,
    pub format_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub job_id: String,
    pub can_start: bool,
    pub message: String,
}

pub async fn queue_download(State(state): State<AppState>, Json(req): Json<QueueDownloadRequest>) -> Result<Json<AdmissionResponse>, ApiError> {
    if !url_policy::is_allowed(&req.url) {
        return Err(ApiError::invalid("Invalid URL format"));
    }
    let (job_id, can_start) = state.scheduler.add_download_job(req.url, req.format_id);
    let message = admission_message(can_start);
    Ok(Json(AdmissionResponse { job_id, can_start, message }))
}

#[derive(Deserialize)]
pub struct QueueConvertRequest {
    pub url: Option<String>,
    pub target_format: String,
    pub depends_on: Option<String>,
    pub input_file: Option<String>,
}

pub async fn queue_convert(State(state): State<AppState>, Json(req): Json<QueueConvertRequest>) -> Result<Json<AdmissionResponse>, ApiError> {
    if let Some(url) = &req.url {
        if !url_policy::is_allowed(url) {
            return Err(ApiError::invalid("Invalid URL format"));
        }
    }
    let (job_id, can_start) = state
        .scheduler
        .add_convert_job(req.url, req.target_format, req.depends_on, req.input_file)
        .map_err(scheduler_error_to_api)?;
    let message = admission_message(can_start);
    Ok(Json(AdmissionResponse { job_id, can_start, message }))
}

fn admission_message(can_start: bool) -> String {
    if can_start {
        "job is ready to start".to_string()
    } else {
        "job queued behind another active job".to_string()
    }
}

fn scheduler_error_to_api(err: SchedulerError) -> ApiError {
    match err {
        SchedulerError::UnknownDependency(_) | SchedulerError::DependencyNotDownload(_) => ApiError::invalid(err.to_string()),
        SchedulerError::UnknownJob(_) => ApiError::NotFound(err.to_string()),
    }
}

pub async fn get_queue(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> Result<Json<QueueState>, ApiError> {
    if !state.rate_limiters.queue_status.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    Ok(Json(state.scheduler.get_queue_state()))
}

pub async fn get_job(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    if !state.rate_limiters.queue_status.check(addr.ip()) {
        return Err(ApiError::RateLimited);
    }
    state.scheduler.get_job(&job_id).map(Json).ok_or_else(|| ApiError::NotFound(format!("unknown job: {job_id}")))
}

#[derive(Serialize)]
pub struct Ack {
    pub ok: bool,
}

pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<Ack>, ApiError> {
    let job = state.scheduler.get_job(&job_id).ok_or_else(|| ApiError::NotFound(format!("unknown job: {job_id}")))?;
    if let Some(download_id) = &job.download_id {
        state.bus.cancel(download_id);
    }
    state.scheduler.cancel_job(&job_id).map_err(scheduler_error_to_api)?;
    Ok(Json(Ack { ok: true }))
}
