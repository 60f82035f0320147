//! Process-wide session registry and event fan-out (component C).
//!
//! Generalizes the teacher's single-subscriber `watch`-channel bridge
//! (`rdm_server/src/sse_observer.rs`) into a multi-subscriber broadcast
//! channel with last-value replay, per the event-emitter redesign note.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::session::{DownloadSession, DownloadStatus, ProgressEvent};

const BROADCAST_CAPACITY: usize = 64;
const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct SessionEntry {
    session: DownloadSession,
    tx: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
}

/// Registry of in-flight and recently-terminal download sessions.
pub struct ProgressBus {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Idempotent on an existing id: returns it unchanged without resetting state.
    pub fn create_session(&self, url: &str, format_id: &str, id: Option<String>) -> String {
        let mut sessions = self.sessions.lock().unwrap();
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if sessions.contains_key(&id) {
            return id;
        }
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        sessions.insert(
            id.clone(),
            SessionEntry {
                session: DownloadSession::new(id.clone(), url.to_string(), format_id.to_string()),
                tx,
                cancel: CancellationToken::new(),
            },
        );
        id
    }

    /// `bytes` must be monotonically non-decreasing for a given id; callers
    /// (the byte-counting pass-through) are responsible for that invariant.
    pub fn update_progress(&self, id: &str, bytes: u64, total: Option<u64>) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(entry) = sessions.get_mut(id) else { return };
        if entry.session.status.is_terminal() {
            return;
        }
        entry.session.bytes = bytes;
        if total.is_some() {
            entry.session.total = total;
        }
        if let Some(total) = entry.session.total {
            entry.session.percentage = Some(percentage(bytes, total));
        }
        let event = ProgressEvent::from_session(&entry.session);
        let _ = entry.tx.send(event);
    }

    /// Updates only the known total (e.g. learned later from a stderr
    /// progress line), recomputing `percentage` against the current byte
    /// count.
    pub fn set_total(&self, id: &str, total: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(entry) = sessions.get_mut(id) else { return };
        if entry.session.status.is_terminal() {
            return;
        }
        entry.session.total = Some(total);
        entry.session.percentage = Some(percentage(entry.session.bytes, total));
        let event = ProgressEvent::from_session(&entry.session);
        let _ = entry.tx.send(event);
    }

    pub fn mark_completed(&self, id: &str) {
        self.mark_terminal(id, DownloadStatus::Completed, None);
    }

    pub fn mark_error(&self, id: &str, message: String) {
        self.mark_terminal(id, DownloadStatus::Error, Some(message));
    }

    /// Attempts graceful-then-hard termination of the registered process (via
    /// the session's cancellation token), marks the session cancelled, and
    /// schedules it for GC. No-op if the id is unknown or already terminal.
    pub fn cancel(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(entry) = sessions.get_mut(id) else { return false };
        if entry.session.status.is_terminal() {
            return false;
        }
        entry.cancel.cancel();
        entry.session.status = DownloadStatus::Cancelled;
        entry.session.error = Some("Cancelled by user".to_string());
        let event = ProgressEvent::from_session(&entry.session);
        let _ = entry.tx.send(event);
        true
    }

    fn mark_terminal(&self, id: &str, status: DownloadStatus, error: Option<String>) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(entry) = sessions.get_mut(id) else { return };
        // Idempotent: a second terminal mark (e.g. both "exit" and "close"
        // firing for the same child) is a no-op.
        if entry.session.status.is_terminal() {
            return;
        }
        entry.session.status = status;
        entry.session.error = error;
        if status == DownloadStatus::Completed {
            entry.session.percentage = Some(100);
        }
        let event = ProgressEvent::from_session(&entry.session);
        let _ = entry.tx.send(event);
    }

    pub fn get_progress(&self, id: &str) -> Option<DownloadSession> {
        self.sessions.lock().unwrap().get(id).map(|e| e.session.clone())
    }

    /// Cooperative-cancellation handle for the process(es) behind this
    /// session; the extractor client selects on this token during I/O.
    pub fn cancellation_token(&self, id: &str) -> Option<CancellationToken> {
        self.sessions.lock().unwrap().get(id).map(|e| e.cancel.clone())
    }

    /// Subscribes to live events plus, if a session already exists, its
    /// current snapshot as an immediate replay (late-subscriber contract).
    pub fn subscribe(&self, id: &str) -> Option<(broadcast::Receiver<ProgressEvent>, Option<ProgressEvent>)> {
        let sessions = self.sessions.lock().unwrap();
        let entry = sessions.get(id)?;
        let replay = Some(ProgressEvent::from_session(&entry.session));
        Some((entry.tx.subscribe(), replay))
    }

    /// Removes terminal sessions older than [`SESSION_TTL`]. Active sessions
    /// are never collected.
    fn gc_once(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        let now = Instant::now();
        sessions.retain(|_, entry| {
            !entry.session.status.is_terminal() || now.duration_since(entry.session.created_at) < SESSION_TTL
        });
    }

    /// Spawns the periodic GC task. Intended to be called once at startup.
    pub fn spawn_gc(self: std::sync::Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GC_INTERVAL);
            loop {
                interval.tick().await;
                self.gc_once();
            }
        });
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

fn percentage(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (bytes as f64 / total as f64) * 100.0;
    pct.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_is_idempotent() {
        let bus = ProgressBus::new();
        let id = bus.create_session("u", "22", None);
        bus.update_progress(&id, 50, Some(100));
        let again = bus.create_session("u", "22", Some(id.clone()));
        assert_eq!(again, id);
        // did not reset
        assert_eq!(bus.get_progress(&id).unwrap().bytes, 50);
    }

    #[test]
    fn update_progress_computes_percentage() {
        let bus = ProgressBus::new();
        let id = bus.create_session("u", "22", None);
        bus.update_progress(&id, 50, Some(200));
        let snap = bus.get_progress(&id).unwrap();
        assert_eq!(snap.percentage, Some(25));
    }

    #[test]
    fn mark_completed_is_terminal_and_idempotent() {
        let bus = ProgressBus::new();
        let id = bus.create_session("u", "22", None);
        bus.mark_completed(&id);
        bus.update_progress(&id, 999, Some(1000));
        let snap = bus.get_progress(&id).unwrap();
        assert_eq!(snap.status, DownloadStatus::Completed);
        assert_eq!(snap.bytes, 0, "update after terminal must be ignored");

        // second terminal mark is a no-op
        bus.mark_error(&id, "late".to_string());
        assert_eq!(bus.get_progress(&id).unwrap().status, DownloadStatus::Completed);
    }

    #[test]
    fn cancel_unknown_session_returns_false() {
        let bus = ProgressBus::new();
        assert!(!bus.cancel("missing"));
    }

    #[test]
    fn cancel_sets_cancelled_and_triggers_token() {
        let bus = ProgressBus::new();
        let id = bus.create_session("u", "22", None);
        let token = bus.cancellation_token(&id).unwrap();
        assert!(bus.cancel(&id));
        assert!(token.is_cancelled());
        assert_eq!(bus.get_progress(&id).unwrap().status, DownloadStatus::Cancelled);
    }

    #[test]
    fn subscribe_replays_current_snapshot() {
        let bus = ProgressBus::new();
        let id = bus.create_session("u", "22", None);
        bus.update_progress(&id, 10, Some(100));
        let (_, replay) = bus.subscribe(&id).unwrap();
        match replay {
            Some(ProgressEvent::Progress { bytes_downloaded, .. }) => assert_eq!(bytes_downloaded, 10),
            other => panic!("unexpected replay: {other:?}"),
        }
    }

    #[test]
    fn gc_removes_old_terminal_sessions_only() {
        let bus = ProgressBus::new();
        let active = bus.create_session("u", "22", None);
        let terminal = bus.create_session("u", "23", None);
        bus.mark_completed(&terminal);
        {
            let mut sessions = bus.sessions.lock().unwrap();
            sessions.get_mut(&terminal).unwrap().session.created_at =
                Instant::now() - Duration::from_secs(31 * 60);
        }
        bus.gc_once();
        assert!(bus.get_progress(&active).is_some());
        assert!(bus.get_progress(&terminal).is_none());
    }
}
