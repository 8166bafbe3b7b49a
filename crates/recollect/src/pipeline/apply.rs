//! The apply engine: the per-turn entry point.
//!
//! [`Observer::on_turn()`] runs synchronously once per turn. It measures the
//! messages not yet folded into the observation log and then does at most
//! one of:
//!
//! 1. **Apply.** A pending result exists and the unobserved estimate reached
//!    the primary threshold. The captured range is replaced by a single
//!    continuity message and the session memory is replaced wholesale.
//! 2. **Launch.** The estimate reached the prefetch threshold and the
//!    session is idle. A background job is spawned on the current runtime.
//! 3. **Nothing.**
//!
//! A pending result whose range no longer fits the sequence is discarded and
//! the turn falls through to the launch check.
//!
//! # Index bookkeeping
//!
//! `last_observed_index` points at the continuity message inserted by the
//! last apply. Messages after it are unobserved. The next captured range
//! starts *at* the continuity message, so the next apply replaces it and the
//! sequence never carries more than one. Leading system messages are never
//! captured.

use super::coordinator::{Coordinator, PendingResult};
use super::events::{EventHandler, LoggingHandler, ObserverEvent};
use super::job::{JobContext, JobInput, run_observation_job};
use crate::compress::Compressor;
use crate::config::ObserverConfig;
use crate::context::{Thresholds, TurnUsage, UsageLevel, estimate_log, estimate_messages};
use crate::error::MemoryError;
use crate::memory::{MemoryStore, SessionMemory, render_observations};
use crate::{Message, MessageRole};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What [`Observer::on_turn()`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Below every threshold, or waiting on a job.
    Idle,
    /// A background job was spawned.
    Launched { job_id: u64 },
    /// A pending result was spliced in.
    Applied { removed: usize, new_index: usize },
    /// A pending result was stale and dropped. `relaunched` is set when the
    /// same turn launched a replacement job.
    StaleDiscarded { relaunched: Option<u64> },
    /// An internal fault was reported; messages and memory are unchanged.
    Skipped,
}

/// Observational memory for any number of sessions.
///
/// ```ignore
/// let observer = Observer::new(config, Arc::new(store), Arc::new(compressor))
///     .with_event_handler(Arc::new(CompositeEventHandler::new().with(LoggingHandler)));
///
/// loop {
///     observer.on_turn(&session_id, &mut messages);
///     let reply = call_model(&messages).await?;
///     messages.push(reply);
/// }
/// ```
pub struct Observer {
    config: Arc<ObserverConfig>,
    store: Arc<dyn MemoryStore>,
    compressor: Arc<dyn Compressor>,
    coordinator: Arc<Coordinator>,
    events: Arc<dyn EventHandler>,
    sessions: Mutex<HashMap<String, SessionMemory>>,
}

impl Observer {
    pub fn new(
        config: ObserverConfig,
        store: Arc<dyn MemoryStore>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            compressor,
            coordinator: Arc::new(Coordinator::new()),
            events: Arc::new(LoggingHandler),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the default [`LoggingHandler`].
    pub fn with_event_handler(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Share a coordinator with other observers.
    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_config(&self.config)
    }

    /// The session's memory, loading it from the store on first access.
    ///
    /// The cache lock is not held across the load. If another turn cached
    /// the session meanwhile, its copy wins.
    pub fn memory(&self, session_id: &str) -> Result<SessionMemory, MemoryError> {
        if let Some(memory) = self.lock_sessions().get(session_id) {
            return Ok(memory.clone());
        }
        let loaded = self.store.load(session_id)?;
        Ok(self
            .lock_sessions()
            .entry(session_id.to_string())
            .or_insert(loaded)
            .clone())
    }

    /// Rendered observation log for the host's system prompt, or `None`
    /// when nothing has been observed. A load failure is reported as
    /// [`ObserverEvent::Fault`].
    pub fn observations_prompt(&self, session_id: &str) -> Option<String> {
        let memory = match self.memory(session_id) {
            Ok(memory) => memory,
            Err(error) => {
                self.events.on_event(&ObserverEvent::Fault {
                    session_id,
                    error: &error,
                });
                return None;
            }
        };
        if memory.observation_log.is_empty() {
            return None;
        }
        Some(format!(
            "<observations>\n{}</observations>",
            render_observations(&memory.observation_log)
        ))
    }

    /// Sizing of the sequence against the session's memory.
    pub fn usage(&self, session_id: &str, messages: &[Message]) -> Result<TurnUsage, MemoryError> {
        let memory = self.memory(session_id)?;
        Ok(self.usage_for(&memory, messages))
    }

    fn usage_for(&self, memory: &SessionMemory, messages: &[Message]) -> TurnUsage {
        let boundary = observed_boundary(memory, messages);
        let unobserved = estimate_messages(messages.get(boundary..).unwrap_or_default());
        self.thresholds()
            .evaluate(unobserved, estimate_log(&memory.observation_log))
    }

    /// Run the apply engine for one turn. Never blocks and never fails.
    pub fn on_turn(&self, session_id: &str, messages: &mut Vec<Message>) -> TurnOutcome {
        match self.process_turn(session_id, messages) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.events.on_event(&ObserverEvent::Fault {
                    session_id,
                    error: &error,
                });
                TurnOutcome::Skipped
            }
        }
    }

    fn process_turn(
        &self,
        session_id: &str,
        messages: &mut Vec<Message>,
    ) -> Result<TurnOutcome, MemoryError> {
        let memory = self.memory(session_id)?;
        let usage = self.usage_for(&memory, messages);
        debug!("[{session_id}] {}", usage.to_log_string());

        let mut discarded = false;
        if usage.level == UsageLevel::Primary
            && let Some(pending) = self.coordinator.take_pending(session_id)
        {
            match pending.validate(messages.len()) {
                Ok(()) => return Ok(self.apply(session_id, &memory, pending, messages)),
                Err(_) => {
                    self.events.on_event(&ObserverEvent::StaleResultDiscarded {
                        session_id,
                        range_start: pending.range_start,
                        range_end: pending.range_end(),
                        current_len: messages.len(),
                    });
                    discarded = true;
                }
            }
        }

        let launched = if usage.level >= UsageLevel::Prefetch && usage.unobserved_tokens > 0 {
            self.launch(session_id, &memory, messages, usage.unobserved_tokens)?
        } else {
            None
        };

        Ok(match (discarded, launched) {
            (true, relaunched) => TurnOutcome::StaleDiscarded { relaunched },
            (false, Some(job_id)) => TurnOutcome::Launched { job_id },
            (false, None) => TurnOutcome::Idle,
        })
    }

    fn launch(
        &self,
        session_id: &str,
        memory: &SessionMemory,
        messages: &[Message],
        unobserved_tokens: usize,
    ) -> Result<Option<u64>, MemoryError> {
        if self.coordinator.is_busy(session_id) {
            return Ok(None);
        }

        let range_start = capture_start(memory, messages);
        let input = JobInput {
            session_id: session_id.to_string(),
            messages: messages.get(range_start..).unwrap_or_default().to_vec(),
            memory: memory.clone(),
            range_start,
            unobserved_tokens,
        };
        let ctx = JobContext {
            config: Arc::clone(&self.config),
            compressor: Arc::clone(&self.compressor),
            events: Arc::clone(&self.events),
        };
        self.coordinator
            .launch(session_id, move |job_id| run_observation_job(ctx, input, job_id))
    }

    fn apply(
        &self,
        session_id: &str,
        current: &SessionMemory,
        pending: PendingResult,
        messages: &mut Vec<Message>,
    ) -> TurnOutcome {
        let range_start = pending.range_start;
        let range_end = pending.range_end();
        let overtaken = range_end < messages.len();

        let mut memory = pending.new_memory;
        memory.last_observed_index = current
            .last_observed_index
            .max(Some(range_start));
        if overtaken {
            memory.suggested_response_hint = None;
        }

        let continuity = Message::continuity(continuity_text(&memory, overtaken));
        let removed = messages
            .splice(range_start..range_end, std::iter::once(continuity))
            .count();
        let new_index = memory.last_observed_index.unwrap_or(range_start);

        if let Err(error) = self.store.save(session_id, &memory) {
            self.events.on_event(&ObserverEvent::Fault {
                session_id,
                error: &error,
            });
        }
        self.lock_sessions().insert(session_id.to_string(), memory);

        self.events.on_event(&ObserverEvent::ResultApplied {
            session_id,
            removed,
            new_index,
            overtaken,
        });
        TurnOutcome::Applied { removed, new_index }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionMemory>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn leading_system_count(messages: &[Message]) -> usize {
    messages
        .iter()
        .take_while(|m| m.role == MessageRole::System && !m.continuity)
        .count()
}

/// First index whose message is not yet represented by the observation log.
fn observed_boundary(memory: &SessionMemory, messages: &[Message]) -> usize {
    match memory.last_observed_index {
        None => leading_system_count(messages),
        Some(k) => (k + 1).min(messages.len()),
    }
}

/// First index a new job captures. Includes the previous continuity message
/// so the next apply replaces it.
fn capture_start(memory: &SessionMemory, messages: &[Message]) -> usize {
    match memory.last_observed_index {
        None => leading_system_count(messages),
        Some(k) if messages.get(k).is_some_and(|m| m.continuity) => k,
        Some(k) => (k + 1).min(messages.len()),
    }
}

fn continuity_text(memory: &SessionMemory, overtaken: bool) -> String {
    let mut text = String::from(
        "Earlier messages in this conversation were condensed into observations. \
         Continue naturally from where the conversation left off.",
    );
    if let Some(task) = &memory.current_task_hint {
        text.push_str("\n\nCurrent task");
        if overtaken {
            text.push_str(" (possibly outdated, newer messages follow)");
        }
        text.push_str(": ");
        text.push_str(task);
    }
    if let Some(suggested) = &memory.suggested_response_hint {
        text.push_str("\n\nSuggested next response: ");
        text.push_str(suggested);
    }
    text
}
