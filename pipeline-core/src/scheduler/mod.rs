//! Job queue / scheduler (component D, spec §4.4). The densest component:
//! admits jobs, enforces the single-active-job invariant, resolves
//! cross-job dependencies, and always drains the queue on terminal
//! transitions.

mod job;

pub use job::{Job, JobKind, JobStatus};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::progress::DownloadSession;

const JOB_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub downloading: usize,
    pub converting: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub jobs: Vec<Job>,
    pub queue: Vec<String>,
    pub processing: Option<String>,
    pub counts: JobCounts,
}

struct SchedulerState {
    jobs: HashMap<String, Job>,
    queue: VecDeque<String>,
    active_job: Option<String>,
}

impl SchedulerState {
    fn new() -> Self {
        Self { jobs: HashMap::new(), queue: VecDeque::new(), active_job: None }
    }
}

/// Runs [`process_queue`] unconditionally when dropped, making the "always
/// drain after a terminal transition" invariant mechanical rather than
/// conventional (spec §9, "scheduler as actor").
struct DrainOnDrop<'a> {
    state: &'a mut SchedulerState,
}

impl Drop for DrainOnDrop<'_> {
    fn drop(&mut self) {
        process_queue(self.state);
    }
}

/// Pops stale queue entries and leaves a dependency-blocked head in place.
/// The actual transition out of `queued` happens when the caller drives
/// [`Scheduler::start_job`]; this routine only keeps the queue consistent.
fn process_queue(state: &mut SchedulerState) {
    loop {
        if state.active_job.is_some() {
            return;
        }
        let Some(head_id) = state.queue.front().cloned() else {
            return;
        };
        if !state.jobs.contains_key(&head_id) {
            state.queue.pop_front();
            continue;
        }
        return;
    }
}

pub struct Scheduler {
    inner: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { inner: Mutex::new(SchedulerState::new()) }
    }

    pub fn add_download_job(&self, url: String, format_id: String) -> (String, bool) {
        let mut state = self.inner.lock().unwrap();
        let drain = DrainOnDrop { state: &mut state };
        let state = &mut *drain.state;
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new_download(job_id.clone(), url, format_id);
        state.jobs.insert(job_id.clone(), job);
        state.queue.push_back(job_id.clone());
        let can_start = state.active_job.is_none() && state.queue.front() == Some(&job_id);
        (job_id, can_start)
    }

    pub fn add_convert_job(
        &self,
        url: Option<String>,
        target_format: String,
        depends_on: Option<String>,
        input_file: Option<String>,
    ) -> Result<(String, bool), SchedulerError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(dep) = &depends_on {
            match state.jobs.get(dep) {
                None => return Err(SchedulerError::UnknownDependency(dep.clone())),
                Some(d) if d.kind != JobKind::Download => return Err(SchedulerError::DependencyNotDownload(dep.clone())),
                Some(_) => {}
            }
        }
        let drain = DrainOnDrop { state: &mut state };
        let state = &mut *drain.state;
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new_convert(job_id.clone(), url, target_format, depends_on, input_file);
        state.jobs.insert(job_id.clone(), job);
        state.queue.push_back(job_id.clone());
        let can_start = state.active_job.is_none() && state.queue.front() == Some(&job_id);
        Ok((job_id, can_start))
    }

    /// Atomically checks that no job is active, this job is the queue head,
    /// and (for a convert job) its dependency is completed. On success,
    /// pops the head and transitions it; otherwise makes no change.
    pub fn start_job(&self, job_id: &str, download_id: String) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.active_job.is_some() {
            return false;
        }
        if state.queue.front().map(String::as_str) != Some(job_id) {
            return false;
        }
        if let Some(job) = state.jobs.get(job_id) {
            if let Some(dep) = job.depends_on.clone() {
                match state.jobs.get(&dep) {
                    Some(d) if d.status == JobStatus::Completed => {}
                    _ => return false,
                }
            }
        } else {
            return false;
        }
        state.queue.pop_front();
        state.active_job = Some(job_id.to_string());
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.start(download_id);
        }
        true
    }

    pub fn complete_job(&self, job_id: &str) {
        let mut state = self.inner.lock().unwrap();
        let _drain = DrainOnDrop { state: &mut state };
        let state = &mut *_drain.state;
        let Some(job) = state.jobs.get_mut(job_id) else { return };
        if job.status.is_terminal() {
            return;
        }
        job.complete();
        if state.active_job.as_deref() == Some(job_id) {
            state.active_job = None;
        }
    }

    pub fn fail_job(&self, job_id: &str, error: String) {
        let mut state = self.inner.lock().unwrap();
        let _drain = DrainOnDrop { state: &mut state };
        let state = &mut *_drain.state;
        let Some(job) = state.jobs.get_mut(job_id) else { return };
        if job.status.is_terminal() {
            return;
        }
        job.fail(error.clone());
        if state.active_job.as_deref() == Some(job_id) {
            state.active_job = None;
        }
        cascade_fail_dependents(state, job_id, &error);
    }

    pub fn cancel_job(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.inner.lock().unwrap();
        let _drain = DrainOnDrop { state: &mut state };
        let state = &mut *_drain.state;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return Err(SchedulerError::UnknownJob(job_id.to_string()));
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        job.fail("Cancelled by user".to_string());
        state.queue.retain(|id| id != job_id);
        if state.active_job.as_deref() == Some(job_id) {
            state.active_job = None;
        }
        Ok(())
    }

    /// Mirrors a progress-bus snapshot into the owning job, triggering a
    /// terminal transition when the underlying session completes or errors.
    pub fn sync_from_session(&self, job_id: &str, session: &DownloadSession) {
        use crate::progress::DownloadStatus;
        let terminal = match session.status {
            DownloadStatus::Completed => Some(true),
            DownloadStatus::Error | DownloadStatus::Cancelled => Some(false),
            DownloadStatus::Downloading => None,
        };
        {
            let mut state = self.inner.lock().unwrap();
            if let Some(job) = state.jobs.get_mut(job_id) {
                if !job.status.is_terminal() {
                    job.progress = Some(session.clone());
                }
            }
        }
        match terminal {
            Some(true) => self.complete_job(job_id),
            Some(false) => {
                let msg = session.error.clone().unwrap_or_else(|| "stream error".to_string());
                self.fail_job(job_id, msg);
            }
            None => {}
        }
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.inner.lock().unwrap().jobs.get(job_id).cloned()
    }

    pub fn get_queue_state(&self) -> QueueState {
        let state = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        let counts = JobCounts {
            queued: jobs.iter().filter(|j| j.status == JobStatus::Queued).count(),
            downloading: jobs.iter().filter(|j| j.status == JobStatus::Downloading).count(),
            converting: jobs.iter().filter(|j| j.status == JobStatus::Converting).count(),
            completed: jobs.iter().filter(|j| j.status == JobStatus::Completed).count(),
            failed: jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
        };
        QueueState {
            jobs,
            queue: state.queue.iter().cloned().collect(),
            processing: state.active_job.clone(),
            counts,
        }
    }

    /// Removes terminal jobs older than [`JOB_TTL`].
    pub fn gc(&self) {
        let mut state = self.inner.lock().unwrap();
        let now = Instant::now();
        state.jobs.retain(|_, j| !j.status.is_terminal() || now.duration_since(j.created_instant) < JOB_TTL);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn cascade_fail_dependents(state: &mut SchedulerState, failed_job_id: &str, upstream_error: &str) {
    let dependents: Vec<String> = state
        .jobs
        .values()
        .filter(|j| j.depends_on.as_deref() == Some(failed_job_id) && !j.status.is_terminal())
        .map(|j| j.job_id.clone())
        .collect();

    for dep_id in dependents {
        state.queue.retain(|id| id != &dep_id);
        if let Some(job) = state.jobs.get_mut(&dep_id) {
            job.fail(format!("Dependency failed: {upstream_error}"));
        }
        if state.active_job.as_deref() == Some(dep_id.as_str()) {
            state.active_job = None;
        }
        cascade_fail_dependents(state, &dep_id, upstream_error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_first_job_as_startable() {
        let s = Scheduler::new();
        let (id, can_start) = s.add_download_job("u".into(), "22".into());
        assert!(can_start);
        assert_eq!(s.get_queue_state().queue, vec![id]);
    }

    #[test]
    fn second_job_cannot_start_while_first_active() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        assert!(s.start_job(&j1, "dl-1".into()));
        let (_, can_start) = s.add_download_job("u2".into(), "22".into());
        assert!(!can_start);
    }

    #[test]
    fn start_job_requires_queue_head() {
        let s = Scheduler::new();
        let (_j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, _) = s.add_download_job("u2".into(), "22".into());
        assert!(!s.start_job(&j2, "dl".into()));
    }

    #[test]
    fn complete_clears_active_and_drains() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        s.start_job(&j1, "dl-1".into());
        let (j2, can_start_before) = s.add_download_job("u2".into(), "22".into());
        assert!(!can_start_before);
        s.complete_job(&j1);
        let state = s.get_queue_state();
        assert!(state.processing.is_none());
        assert_eq!(state.queue, vec![j2.clone()]);
        assert!(s.start_job(&j2, "dl-2".into()));
    }

    #[test]
    fn convert_job_blocks_on_unmet_dependency() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, can_start) = s.add_convert_job(None, "mp3".into(), Some(j1.clone()), None).unwrap();
        assert!(!can_start);
        // j1 is head, not j2: starting j1 first.
        assert!(s.start_job(&j1, "dl-1".into()));
        assert!(!s.start_job(&j2, "dl-2".into()), "dependency not yet completed");
        s.complete_job(&j1);
        assert!(s.start_job(&j2, "dl-2".into()));
    }

    #[test]
    fn dependency_failure_cascades() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, _) = s.add_convert_job(None, "mp3".into(), Some(j1.clone()), None).unwrap();
        s.start_job(&j1, "dl-1".into());
        s.fail_job(&j1, "boom".into());
        let job2 = s.get_job(&j2).unwrap();
        assert_eq!(job2.status, JobStatus::Failed);
        assert!(job2.error.unwrap().contains("Dependency failed"));
        assert!(!s.get_queue_state().queue.contains(&j2));
    }

    #[test]
    fn convert_job_rejects_unknown_dependency() {
        let s = Scheduler::new();
        let err = s.add_convert_job(None, "mp3".into(), Some("missing".into()), None).unwrap_err();
        assert_eq!(err, SchedulerError::UnknownDependency("missing".into()));
    }

    #[test]
    fn convert_job_rejects_non_download_dependency() {
        let s = Scheduler::new();
        let (j1, _) = s.add_convert_job(None, "mp3".into(), None, None).unwrap();
        let err = s.add_convert_job(None, "mp3".into(), Some(j1), None).unwrap_err();
        assert!(matches!(err, SchedulerError::DependencyNotDownload(_)));
    }

    #[test]
    fn cancel_queued_job_removes_from_queue() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, _) = s.add_download_job("u2".into(), "22".into());
        s.start_job(&j1, "dl-1".into());
        s.cancel_job(&j2).unwrap();
        let job2 = s.get_job(&j2).unwrap();
        assert_eq!(job2.status, JobStatus::Failed);
        assert_eq!(job2.error.unwrap(), "Cancelled by user");
        assert!(!s.get_queue_state().queue.contains(&j2));
    }

    #[test]
    fn cancel_active_job_clears_slot_and_drains() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, _) = s.add_download_job("u2".into(), "22".into());
        s.start_job(&j1, "dl-1".into());
        s.cancel_job(&j1).unwrap();
        assert!(s.get_queue_state().processing.is_none());
        assert!(s.start_job(&j2, "dl-2".into()));
    }

    #[test]
    fn cancel_unknown_job_is_an_error() {
        let s = Scheduler::new();
        assert_eq!(s.cancel_job("missing").unwrap_err(), SchedulerError::UnknownJob("missing".into()));
    }

    #[test]
    fn single_active_job_invariant_holds_across_mixed_operations() {
        let s = Scheduler::new();
        let (j1, _) = s.add_download_job("u1".into(), "22".into());
        let (j2, _) = s.add_download_job("u2".into(), "22".into());
        let (j3, _) = s.add_download_job("u3".into(), "22".into());
        assert!(s.start_job(&j1, "dl-1".into()));
        assert!(!s.start_job(&j2, "dl-2".into()));
        s.fail_job(&j1, "x".into());
        assert!(s.start_job(&j2, "dl-2".into()));
        assert!(!s.start_job(&j3, "dl-3".into()));
        let state = s.get_queue_state();
        assert_eq!(state.processing.as_deref(), Some(j2.as_str()));
    }
}
