//! Job queue, subprocess lifecycle, and progress bus for the media-extraction
//! pipeline. The HTTP edge (`pipeline-server`) binds these components to
//! endpoints; this crate has no knowledge of HTTP.

pub mod config;
pub mod error;
pub mod extractor;
pub mod format;
pub mod progress;
pub mod scheduler;
pub mod url_policy;

pub use config::Config;
pub use error::{ExtractorError, SchedulerError};
pub use extractor::{mime_for_ext, Extractor, StreamHandle};
pub use format::{FormatDescriptor, FormatKind, MediaInfo};
pub use progress::{DownloadSession, DownloadStatus, ProgressBus, ProgressEvent};
pub use scheduler::{Job, JobCounts, JobKind, JobStatus, QueueState, Scheduler};
