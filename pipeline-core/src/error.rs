//! Error taxonomy for extraction/transcoding and the job scheduler.

use thiserror::Error;

/// Errors surfaced by [`crate::extractor::Extractor`].
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("extractor executable not found: {0}")]
    ExtractorNotFound(String),

    #[error("transcoder executable not found: {0}")]
    TranscoderNotFound(String),

    #[error("url rejected by policy")]
    InvalidUrl,

    #[error("unsupported url")]
    Unsupported,

    #[error("unknown target format: {0}")]
    UnknownTargetFormat(String),

    #[error("media unavailable")]
    Unavailable,

    #[error("extraction timed out")]
    Timeout,

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed extractor output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by [`crate::scheduler::Scheduler`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("dependency job {0} is not a download job")]
    DependencyNotDownload(String),

    #[error("unknown dependency job: {0}")]
    UnknownDependency(String),
}
