//! Single-flight background job management.
//!
//! The [`Coordinator`] tracks, per session, at most one running job and at
//! most one completed-but-unapplied [`PendingResult`]. Both maps live behind
//! one lock, so "nothing in flight and nothing pending" is checked and the
//! new job registered in the same critical section.
//!
//! ```text
//! idle ──launch──▶ running ──ok──▶ pending ──take_pending──▶ idle
//!                     │
//!                     └──err──▶ idle
//! ```
//!
//! Jobs are plain tokio tasks. A job's only side effect on the coordinator
//! is its completion: it removes its own in-flight entry and, on success,
//! stores its result. Dropping the coordinator detaches still-running tasks
//! rather than cancelling them; each one runs to completion or failure and
//! its result is dropped with the shared state.

use super::job::JobOutcome;
use crate::compress::CondenseOutcome;
use crate::error::MemoryError;
use crate::memory::SessionMemory;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A completed job's result, waiting for the next turn to apply it.
///
/// Created once by a successful job and consumed exactly once, either by
/// being applied or by being discarded as stale.
#[derive(Debug, Clone)]
pub struct PendingResult {
    /// Full replacement memory for the session.
    pub new_memory: SessionMemory,
    /// First index of the captured range in the live sequence.
    pub range_start: usize,
    /// Number of messages captured.
    pub range_length: usize,
    /// Set when the job ran condensation.
    pub condensation: Option<CondenseOutcome>,
    pub completed_at: DateTime<Utc>,
}

impl PendingResult {
    /// One past the last captured index.
    pub fn range_end(&self) -> usize {
        self.range_start + self.range_length
    }

    /// Whether the captured range still fits a live sequence of `current_len`.
    ///
    /// Only bounds are compared. A sequence rewritten in place to the same
    /// length is not detected.
    pub fn validate(&self, current_len: usize) -> Result<(), MemoryError> {
        if self.range_end() > current_len {
            return Err(MemoryError::Stale {
                range_start: self.range_start,
                range_end: self.range_end(),
                current_len,
            });
        }
        Ok(())
    }
}

enum JobState {
    Running(JoinHandle<JobOutcome>),
    /// The handle was taken by [`Coordinator::wait_for`].
    Awaited,
}

struct InFlight {
    job_id: u64,
    state: JobState,
    started_at: Instant,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: HashMap<String, InFlight>,
    pending: HashMap<String, PendingResult>,
}

impl CoordinatorState {
    /// Drop an in-flight entry whose task ended without clearing it (panic or
    /// abort). A task that completes normally removes its own entry first.
    fn reap(&mut self, session_id: &str) {
        let finished = self
            .in_flight
            .get(session_id)
            .is_some_and(|f| matches!(&f.state, JobState::Running(h) if h.is_finished()));
        if finished {
            warn!("[{session_id}] reaping background job that ended abnormally");
            self.in_flight.remove(session_id);
        }
    }
}

pub struct Coordinator {
    state: Arc<Mutex<CoordinatorState>>,
    next_id: AtomicU64,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a job for `session_id` unless one is in flight or a result is
    /// pending.
    ///
    /// `make_job` receives the assigned job id and is only called when the
    /// launch goes ahead. Returns `Ok(Some(job_id))` on launch, `Ok(None)`
    /// when the session is busy, and [`MemoryError::NoRuntime`] outside a
    /// tokio runtime.
    pub fn launch<F, Fut>(&self, session_id: &str, make_job: F) -> Result<Option<u64>, MemoryError>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<PendingResult, MemoryError>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MemoryError::NoRuntime)?;

        let mut state = self.lock();
        state.reap(session_id);
        if state.in_flight.contains_key(session_id) || state.pending.contains_key(session_id) {
            debug!("[{session_id}] launch skipped: job in flight or result pending");
            return Ok(None);
        }

        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = make_job(job_id);
        let shared = Arc::clone(&self.state);
        let session = session_id.to_string();

        // The task needs the lock to finish, so it cannot complete before
        // its in-flight entry is registered below.
        let handle = runtime.spawn(async move {
            let result = job.await;
            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
            if state
                .in_flight
                .get(&session)
                .is_some_and(|f| f.job_id == job_id)
            {
                state.in_flight.remove(&session);
            }
            match result {
                Ok(pending) => {
                    state.pending.insert(session, pending);
                    JobOutcome::Succeeded
                }
                Err(e) => JobOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        });

        state.in_flight.insert(
            session_id.to_string(),
            InFlight {
                job_id,
                state: JobState::Running(handle),
                started_at: Instant::now(),
            },
        );
        Ok(Some(job_id))
    }

    /// Remove and return the session's pending result.
    pub fn take_pending(&self, session_id: &str) -> Option<PendingResult> {
        self.lock().pending.remove(session_id)
    }

    pub fn has_pending(&self, session_id: &str) -> bool {
        self.lock().pending.contains_key(session_id)
    }

    pub fn is_in_flight(&self, session_id: &str) -> bool {
        let mut state = self.lock();
        state.reap(session_id);
        state.in_flight.contains_key(session_id)
    }

    /// In flight or pending: a launch would be a no-op.
    pub fn is_busy(&self, session_id: &str) -> bool {
        let mut state = self.lock();
        state.reap(session_id);
        state.in_flight.contains_key(session_id) || state.pending.contains_key(session_id)
    }

    /// Await the session's running job.
    ///
    /// Returns `None` when no job is in flight or another caller is already
    /// waiting on it.
    pub async fn wait_for(&self, session_id: &str) -> Option<JobOutcome> {
        let (job_id, handle) = {
            let mut state = self.lock();
            let entry = state.in_flight.get_mut(session_id)?;
            match std::mem::replace(&mut entry.state, JobState::Awaited) {
                JobState::Running(h) => (entry.job_id, h),
                JobState::Awaited => return None,
            }
        };
        // Lock released before awaiting.

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(join_err) => {
                let mut state = self.lock();
                if state
                    .in_flight
                    .get(session_id)
                    .is_some_and(|f| f.job_id == job_id)
                {
                    state.in_flight.remove(session_id);
                }
                Some(JobOutcome::Failed {
                    reason: format!("job #{job_id} did not complete: {join_err}"),
                })
            }
        }
    }

    /// Await every running job. Returns `(session_id, outcome)` pairs.
    pub async fn wait_all(&self) -> Vec<(String, JobOutcome)> {
        let sessions: Vec<String> = self.lock().in_flight.keys().cloned().collect();
        let waits = sessions.iter().map(|s| self.wait_for(s));
        let outcomes = futures::future::join_all(waits).await;
        sessions
            .into_iter()
            .zip(outcomes)
            .filter_map(|(s, o)| o.map(|o| (s, o)))
            .collect()
    }

    /// One line per tracked session.
    pub fn status_summary(&self) -> String {
        let state = self.lock();
        if state.in_flight.is_empty() && state.pending.is_empty() {
            return "No background jobs.".into();
        }
        let mut lines = Vec::new();
        for (session, entry) in &state.in_flight {
            let status = match &entry.state {
                JobState::Running(h) if h.is_finished() => "finished",
                JobState::Running(_) => "running",
                JobState::Awaited => "running (awaited)",
            };
            let elapsed = entry.started_at.elapsed().as_secs_f64();
            lines.push(format!(
                "  {session}: job #{} {status} ({elapsed:.1}s)",
                entry.job_id
            ));
        }
        for (session, pending) in &state.pending {
            lines.push(format!(
                "  {session}: result pending for messages {}..{}",
                pending.range_start,
                pending.range_end()
            ));
        }
        lines.sort();
        lines.join("\n")
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let state = self.lock();
        let running = state
            .in_flight
            .values()
            .filter(|f| matches!(&f.state, JobState::Running(h) if !h.is_finished()))
            .count();
        if running > 0 {
            debug!("Coordinator dropped; detaching {running} running job(s)");
        }
    }
}
