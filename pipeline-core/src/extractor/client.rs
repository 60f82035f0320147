//! Extractor/transcoder subprocess client (component B).

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::ExtractorError;
use crate::format::{self, MediaInfo};
use crate::progress::ProgressBus;
use crate::url_policy;

use super::args;
use super::process::{self, NoWindowExt};
use super::stderr;

const ANALYZE_TIMEOUT: Duration = Duration::from_secs(30);
const ANALYZE_BUFFER_CAP: usize = 10 * 1024 * 1024;
const TERMINATION_GRACE: Duration = Duration::from_secs(2);
const PROGRESS_CHUNK: u64 = 64 * 1024;
const CHANNEL_CAPACITY: usize = 8;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The byte stream handed to the HTTP edge for a download/convert response.
pub struct StreamHandle {
    pub body: ReceiverStream<io::Result<Bytes>>,
}

#[derive(Clone)]
pub struct Extractor {
    extractor_path: String,
    transcoder_path: String,
    download_timeout: Duration,
    convert_timeout: Duration,
}

impl Extractor {
    pub fn new(extractor_path: impl Into<String>, transcoder_path: impl Into<String>, download_timeout: Duration, convert_timeout: Duration) -> Self {
        Self {
            extractor_path: extractor_path.into(),
            transcoder_path: transcoder_path.into(),
            download_timeout,
            convert_timeout,
        }
    }

    /// Best-effort availability probe for `/health`: spawns `--version` with
    /// a short timeout and reports whether it ran and what it printed.
    pub async fn probe_extractor(&self) -> (bool, Option<String>) {
        probe(&self.extractor_path, &["--version"]).await
    }

    pub async fn probe_transcoder(&self) -> (bool, Option<String>) {
        probe(&self.transcoder_path, &["-version"]).await
    }

    pub async fn analyze(&self, url: &str) -> Result<MediaInfo, ExtractorError> {
        if !url_policy::is_allowed(url) {
            return Err(ExtractorError::InvalidUrl);
        }

        let mut child = Command::new(&self.extractor_path)
            .args(args::analyze_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .no_window()
            .spawn()
            .map_err(|e| spawn_error(&e, &self.extractor_path, true))?;

        let stdout = child.stdout.take().expect("piped");
        let stderr_pipe = child.stderr.take().expect("piped");

        let read = async {
            tokio::try_join!(
                read_capped(stdout, ANALYZE_BUFFER_CAP),
                read_capped(stderr_pipe, ANALYZE_BUFFER_CAP)
            )
        };

        let (stdout_buf, stderr_buf) = match tokio::time::timeout(ANALYZE_TIMEOUT, read).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                let _ = process::terminate(&mut child, TERMINATION_GRACE).await;
                return Err(ExtractorError::Io(e));
            }
            Err(_) => {
                let _ = process::terminate(&mut child, TERMINATION_GRACE).await;
                return Err(ExtractorError::Timeout);
            }
        };

        let status = child.wait().await?;
        let stderr_text = String::from_utf8_lossy(&stderr_buf);

        if !status.success() {
            return Err(classify_failure(&stderr_text));
        }

        let json: serde_json::Value = serde_json::from_slice(&stdout_buf)?;
        Ok(format::parse_media_info(&json))
    }

    pub async fn stream_download(
        &self,
        url: &str,
        format_id: &str,
        download_id: &str,
        bus: Arc<ProgressBus>,
    ) -> Result<StreamHandle, ExtractorError> {
        if !url_policy::is_allowed(url) {
            return Err(ExtractorError::InvalidUrl);
        }
        let cancel = bus.cancellation_token(download_id).unwrap_or_default();

        let child = Command::new(&self.extractor_path)
            .args(args::stream_args(url, format_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .no_window()
            .spawn()
            .map_err(|e| spawn_error(&e, &self.extractor_path, true))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let download_id = download_id.to_string();
        let timeout = self.download_timeout;
        tokio::spawn(run_download_pipeline(child, tx, bus, download_id, cancel, timeout));

        Ok(StreamHandle { body: ReceiverStream::new(rx) })
    }

    pub async fn convert_media(
        &self,
        url: &str,
        target_format: &str,
        download_id: &str,
        bus: Arc<ProgressBus>,
    ) -> Result<StreamHandle, ExtractorError> {
        if !url_policy::is_allowed(url) {
            return Err(ExtractorError::InvalidUrl);
        }
        let Some(transcoder_args) = args::transcoder_args(target_format) else {
            return Err(ExtractorError::UnknownTargetFormat(target_format.to_string()));
        };
        let cancel = bus.cancellation_token(download_id).unwrap_or_default();

        let extractor_child = Command::new(&self.extractor_path)
            .args(args::convert_source_args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .no_window()
            .spawn()
            .map_err(|e| spawn_error(&e, &self.extractor_path, true))?;

        let transcoder_child = Command::new(&self.transcoder_path)
            .args(transcoder_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .no_window()
            .spawn()
            .map_err(|e| spawn_error(&e, &self.transcoder_path, false))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let download_id = download_id.to_string();
        let timeout = self.convert_timeout;
        tokio::spawn(run_convert_pipeline(extractor_child, transcoder_child, tx, bus, download_id, cancel, timeout));

        Ok(StreamHandle { body: ReceiverStream::new(rx) })
    }
}

fn spawn_error(err: &io::Error, path: &str, is_extractor: bool) -> ExtractorError {
    if process::is_not_found(err) {
        if is_extractor {
            ExtractorError::ExtractorNotFound(path.to_string())
        } else {
            ExtractorError::TranscoderNotFound(path.to_string())
        }
    } else {
        ExtractorError::Io(io::Error::new(err.kind(), err.to_string()))
    }
}

fn classify_failure(stderr_text: &str) -> ExtractorError {
    let lower = stderr_text.to_ascii_lowercase();
    if lower.contains("unsupported url") || lower.contains("no video formats") || lower.contains("unable to extract") {
        ExtractorError::Unsupported
    } else if lower.contains("private video") || lower.contains("video unavailable") || lower.contains("this video is unavailable") {
        ExtractorError::Unavailable
    } else {
        let last_line = stderr_text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("unknown error");
        ExtractorError::ExtractionFailed(last_line.to_string())
    }
}

async fn probe(path: &str, probe_args: &[&str]) -> (bool, Option<String>) {
    let spawned = Command::new(path)
        .args(probe_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .no_window()
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, spawned).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).lines().next().map(str::to_string);
            (true, version)
        }
        _ => (false, None),
    }
}

async fn read_capped(mut reader: impl tokio::io::AsyncRead + Unpin, cap: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 || buf.len() >= cap {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

async fn forward_to_channel(
    mut src: impl tokio::io::AsyncRead + Unpin,
    tx: mpsc::Sender<io::Result<Bytes>>,
    bus: Arc<ProgressBus>,
    download_id: String,
) -> io::Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    let mut since_report = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        since_report += n as u64;
        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"));
        }
        if since_report >= PROGRESS_CHUNK {
            bus.update_progress(&download_id, total, None);
            since_report = 0;
        }
    }
    bus.update_progress(&download_id, total, None);
    Ok(())
}

async fn forward_to_channel_plain(mut src: impl tokio::io::AsyncRead + Unpin, tx: mpsc::Sender<io::Result<Bytes>>) -> io::Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"));
        }
    }
    Ok(())
}

async fn copy_with_progress(
    mut src: impl tokio::io::AsyncRead + Unpin,
    mut dst: impl tokio::io::AsyncWrite + Unpin,
    bus: &ProgressBus,
    download_id: &str,
) -> io::Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    let mut since_report = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        total += n as u64;
        since_report += n as u64;
        if since_report >= PROGRESS_CHUNK {
            bus.update_progress(download_id, total, None);
            since_report = 0;
        }
    }
    dst.flush().await?;
    bus.update_progress(download_id, total, None);
    Ok(())
}

/// Consumes the extractor's stderr, feeding total-size updates to the bus
/// and logging the rest (minus suppressed warnings).
async fn drain_stderr_progress(stderr_pipe: ChildStderr, bus: Arc<ProgressBus>, download_id: String) {
    let mut lines = BufReader::new(stderr_pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(total) = stderr::parse_total_bytes(&line) {
            bus.set_total(&download_id, total);
        } else if !line.to_ascii_uppercase().contains("WARNING") {
            log::debug!("extractor[{download_id}]: {line}");
        }
    }
}

async fn drain_stderr_logging(stderr_pipe: ChildStderr, label: &'static str) {
    let mut lines = BufReader::new(stderr_pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("{label}: {line}");
    }
}

async fn run_download_pipeline(
    mut child: Child,
    tx: mpsc::Sender<io::Result<Bytes>>,
    bus: Arc<ProgressBus>,
    download_id: String,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let stdout = child.stdout.take().expect("piped");
    let stderr_pipe = child.stderr.take().expect("piped");
    let stderr_task = tokio::spawn(drain_stderr_progress(stderr_pipe, bus.clone(), download_id.clone()));

    tokio::select! {
        result = forward_to_channel(stdout, tx.clone(), bus.clone(), download_id.clone()) => {
            match result {
                Ok(()) => match child.wait().await {
                    Ok(status) if status.success() => bus.mark_completed(&download_id),
                    Ok(status) => {
                        let msg = format!("extractor exited with {status}");
                        let _ = tx.send(Err(io::Error::other(msg.clone()))).await;
                        bus.mark_error(&download_id, msg);
                    }
                    Err(e) => bus.mark_error(&download_id, e.to_string()),
                },
                Err(e) => {
                    bus.mark_error(&download_id, e.to_string());
                    let _ = process::terminate(&mut child, TERMINATION_GRACE).await;
                }
            }
        }
        _ = cancel.cancelled() => {
            let _ = process::terminate(&mut child, TERMINATION_GRACE).await;
        }
        _ = tokio::time::sleep(timeout) => {
            bus.mark_error(&download_id, "Timeout".to_string());
            let _ = tx.send(Err(io::Error::new(io::ErrorKind::TimedOut, "extraction timed out"))).await;
            let _ = process::terminate(&mut child, TERMINATION_GRACE).await;
        }
    }
    stderr_task.abort();
}

async fn run_convert_pipeline(
    mut extractor_child: Child,
    mut transcoder_child: Child,
    tx: mpsc::Sender<io::Result<Bytes>>,
    bus: Arc<ProgressBus>,
    download_id: String,
    cancel: CancellationToken,
    timeout: Duration,
) {
    let ext_stdout = extractor_child.stdout.take().expect("piped");
    let ext_stderr = extractor_child.stderr.take().expect("piped");
    let mut trans_stdin = transcoder_child.stdin.take().expect("piped");
    let trans_stdout = transcoder_child.stdout.take().expect("piped");
    let trans_stderr = transcoder_child.stderr.take().expect("piped");

    let stderr_task = tokio::spawn(drain_stderr_progress(ext_stderr, bus.clone(), download_id.clone()));
    let trans_stderr_task = tokio::spawn(drain_stderr_logging(trans_stderr, "transcoder"));

    let bus_for_copy = bus.clone();
    let id_for_copy = download_id.clone();
    let copy_in = async move {
        let res = copy_with_progress(ext_stdout, &mut trans_stdin, &bus_for_copy, &id_for_copy).await;
        drop(trans_stdin);
        res
    };
    let copy_out = forward_to_channel_plain(trans_stdout, tx.clone());

    let pipeline = async {
        let (in_res, out_res) = tokio::join!(copy_in, copy_out);
        in_res?;
        out_res
    };

    tokio::select! {
        result = pipeline => {
            match result {
                Ok(()) => {
                    let ext_ok = extractor_child.wait().await.map(|s| s.success()).unwrap_or(false);
                    let trans_status = transcoder_child.wait().await;
                    // exit code 255 from the transcoder is a known-benign
                    // result of this invocation shape.
                    let trans_ok = matches!(&trans_status, Ok(s) if s.success() || s.code() == Some(255));
                    if ext_ok && trans_ok {
                        bus.mark_completed(&download_id);
                    } else {
                        let msg = "conversion failed".to_string();
                        let _ = tx.send(Err(io::Error::other(msg.clone()))).await;
                        bus.mark_error(&download_id, msg);
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                    bus.mark_error(&download_id, e.to_string());
                }
            }
        }
        _ = cancel.cancelled() => {
            let _ = process::terminate(&mut extractor_child, TERMINATION_GRACE).await;
            let _ = process::terminate(&mut transcoder_child, TERMINATION_GRACE).await;
        }
        _ = tokio::time::sleep(timeout) => {
            bus.mark_error(&download_id, "Timeout".to_string());
            let _ = tx.send(Err(io::Error::new(io::ErrorKind::TimedOut, "conversion timed out"))).await;
            let _ = process::terminate(&mut extractor_child, TERMINATION_GRACE).await;
            let _ = process::terminate(&mut transcoder_child, TERMINATION_GRACE).await;
        }
    }
    stderr_task.abort();
    trans_stderr_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unsupported_and_unavailable() {
        assert!(matches!(classify_failure("ERROR: Unsupported URL: foo"), ExtractorError::Unsupported));
        assert!(matches!(classify_failure("ERROR: Private video"), ExtractorError::Unavailable));
        assert!(matches!(classify_failure("ERROR: some other failure"), ExtractorError::ExtractionFailed(_)));
    }
}
