//! Progress bus: per-download session state plus event fan-out (component C).

mod bus;
mod session;

pub use bus::ProgressBus;
pub use session::{DownloadSession, DownloadStatus, ProgressEvent};
