//! Per-download session state and the wire-level progress event.

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DownloadStatus::Downloading)
    }
}

/// Snapshot of a single download/convert stream, keyed by `download_id`.
///
/// Mutated only by [`super::bus::ProgressBus`]. Once `status` leaves
/// `Downloading` it never changes again.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSession {
    pub download_id: String,
    pub url: String,
    pub format_id: String,
    pub bytes: u64,
    pub total: Option<u64>,
    pub percentage: Option<u8>,
    pub status: DownloadStatus,
    pub error: Option<String>,
    #[serde(skip)]
    pub created_at: Instant,
}

impl DownloadSession {
    pub fn new(download_id: String, url: String, format_id: String) -> Self {
        Self {
            download_id,
            url,
            format_id,
            bytes: 0,
            total: None,
            percentage: None,
            status: DownloadStatus::Downloading,
            error: None,
            created_at: Instant::now(),
        }
    }
}

/// A single message delivered to progress subscribers (spec §6 wire format).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Connected {
        download_id: String,
    },
    Progress {
        download_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        percentage: Option<u8>,
        status: DownloadStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Heartbeat,
}

impl ProgressEvent {
    pub fn from_session(session: &DownloadSession) -> Self {
        ProgressEvent::Progress {
            download_id: session.download_id.clone(),
            bytes_downloaded: session.bytes,
            total_bytes: session.total,
            percentage: session.percentage,
            status: session.status,
            error: session.error.clone(),
        }
    }
}
