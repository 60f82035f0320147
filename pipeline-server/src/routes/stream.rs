//! Shared plumbing for the two byte-streaming endpoints (`/download`, `/convert`).

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use pipeline_core::{mime_for_ext, Job, MediaInfo, ProgressBus, Scheduler};
use uuid::Uuid;

use crate::error::ApiError;
use crate::filename;

/// Outcome of attempting to make a job the active one.
pub enum Admission {
    /// Job is the active slot holder; stream now.
    Started { download_id: String },
    /// Not startable; caller decides 202 (legacy) vs 409 (explicit jobId).
    NotStartable,
}

pub fn try_start(scheduler: &Scheduler, job_id: &str) -> Admission {
    let download_id = Uuid::new_v4().to_string();
    if scheduler.start_job(job_id, download_id.clone()) {
        Admission::Started { download_id }
    } else {
        Admission::NotStartable
    }
}

/// Best-effort filename/content-type resolution via a fresh `analyze` call.
/// Falls back to a generic name and `mp4` container on any failure, per the
/// "default-fallback" note in spec §4.5 step 2.
pub async fn resolve_name_and_ext(job: &Job, extractor: &pipeline_core::Extractor) -> (String, String) {
    let fallback = ("download".to_string(), "mp4".to_string());
    let Some(url) = &job.url else { return fallback };
    let Ok(info) = extractor.analyze(url).await else { return fallback };
    ext_and_title_for(&info, job.format_id.as_deref(), job.target_format.as_deref())
}

fn ext_and_title_for(info: &MediaInfo, format_id: Option<&str>, target_format: Option<&str>) -> (String, String) {
    if let Some(target) = target_format {
        return (info.title.clone(), target.to_string());
    }
    let ext = format_id
        .and_then(|id| info.formats.iter().find(|f| f.format_id == id))
        .map(|f| f.container_ext.clone())
        .unwrap_or_else(|| "mp4".to_string());
    (info.title.clone(), ext)
}

pub fn download_headers(title: &str, ext: &str, download_id: &str, job_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let filename = filename::build(title, ext);
    let content_type = mime_for_ext(ext);

    headers.insert("Content-Type", HeaderValue::from_str(content_type).unwrap());
    headers.insert(
        "Content-Disposition",
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")).unwrap(),
    );
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache, no-store, must-revalidate"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert("Expires", HeaderValue::from_static("0"));
    if let Ok(v) = HeaderValue::from_str(download_id) {
        headers.insert("X-Download-Id", v);
    }
    if let Ok(v) = HeaderValue::from_str(job_id) {
        headers.insert("X-Job-Id", v);
    }
    headers
}

/// Bridges terminal progress-bus events for `download_id` back into the
/// scheduler's job record, so `GET /queue/{jobId}` reflects the outcome
/// without the edge needing to poll.
pub fn spawn_job_bridge(bus: Arc<ProgressBus>, scheduler: Arc<Scheduler>, job_id: String, download_id: String) {
    tokio::spawn(async move {
        let Some((mut rx, _replay)) = bus.subscribe(&download_id) else { return };
        loop {
            match rx.recv().await {
                Ok(_event) => {
                    let Some(session) = bus.get_progress(&download_id) else { break };
                    scheduler.sync_from_session(&job_id, &session);
                    if session.status.is_terminal() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

pub fn job_or_404(job: Option<Job>, job_id: &str) -> Result<Job, ApiError> {
    job.ok_or_else(|| ApiError::NotFound(format!("unknown job: {job_id}")))
}
