//! Job entity and its lifecycle enums (spec §3).

use serde::Serialize;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::progress::DownloadSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Download,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Converting,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub kind: JobKind,
    pub url: Option<String>,
    pub format_id: Option<String>,
    pub target_format: Option<String>,
    pub depends_on: Option<String>,
    pub input_file: Option<String>,
    pub status: JobStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub error: Option<String>,
    pub download_id: Option<String>,
    pub progress: Option<DownloadSession>,
    #[serde(skip)]
    pub(super) created_instant: Instant,
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl Job {
    pub fn new_download(job_id: String, url: String, format_id: String) -> Self {
        Self {
            job_id,
            kind: JobKind::Download,
            url: Some(url),
            format_id: Some(format_id),
            target_format: None,
            depends_on: None,
            input_file: None,
            status: JobStatus::Queued,
            created_at: unix_millis(),
            started_at: None,
            completed_at: None,
            error: None,
            download_id: None,
            progress: None,
            created_instant: Instant::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_convert(
        job_id: String,
        url: Option<String>,
        target_format: String,
        depends_on: Option<String>,
        input_file: Option<String>,
    ) -> Self {
        Self {
            job_id,
            kind: JobKind::Convert,
            url,
            format_id: None,
            target_format: Some(target_format),
            depends_on,
            input_file,
            status: JobStatus::Queued,
            created_at: unix_millis(),
            started_at: None,
            completed_at: None,
            error: None,
            download_id: None,
            progress: None,
            created_instant: Instant::now(),
        }
    }

    pub fn start(&mut self, download_id: String) {
        self.status = if self.kind == JobKind::Download { JobStatus::Downloading } else { JobStatus::Converting };
        self.started_at = Some(unix_millis());
        self.download_id = Some(download_id);
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(unix_millis());
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(unix_millis());
    }
}
