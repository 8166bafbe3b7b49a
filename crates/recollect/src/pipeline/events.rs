//! Observability for the compression pipeline.
//!
//! Nothing the pipeline does is ever surfaced to the end user. Instead, every
//! lifecycle step and every internal fault is reported as an
//! [`ObserverEvent`] to the configured [`EventHandler`].
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests, or hosts that only want `tracing` output from the modules themselves |
//! | [`LoggingHandler`] | Structured logging via `tracing` (the default) |
//! | [`FnEventHandler`] | Quick closures, e.g. metrics counters |
//! | [`CompositeEventHandler`] | Several handlers in order |

use crate::compress::{CondenseOutcome, FallbackReason};
use crate::error::MemoryError;
use tracing::{debug, info, warn};

/// Events emitted by the [`Observer`](super::Observer) and its background jobs.
#[derive(Debug)]
pub enum ObserverEvent<'a> {
    /// A background job was spawned for a captured message range.
    JobLaunched {
        session_id: &'a str,
        job_id: u64,
        range_start: usize,
        range_length: usize,
        unobserved_tokens: usize,
    },
    /// A background job stored a pending result.
    JobSucceeded {
        session_id: &'a str,
        job_id: u64,
        entries: usize,
        log_tokens: usize,
    },
    /// A background job ended without a result. Memory is unchanged.
    JobFailed {
        session_id: &'a str,
        job_id: u64,
        error: &'a MemoryError,
    },
    /// A pending result was spliced into the live sequence.
    ResultApplied {
        session_id: &'a str,
        removed: usize,
        new_index: usize,
        /// Messages arrived after the captured range, so the continuity
        /// hints were softened.
        overtaken: bool,
    },
    /// A pending result no longer fit the live sequence and was dropped.
    StaleResultDiscarded {
        session_id: &'a str,
        range_start: usize,
        range_end: usize,
        current_len: usize,
    },
    /// The observation log crossed the reflection threshold and was condensed.
    Condensed {
        session_id: &'a str,
        outcome: &'a CondenseOutcome,
        input_tokens: usize,
        output_tokens: usize,
    },
    /// Condensation output could not be trusted; the original log was kept.
    DegenerateFallback {
        session_id: &'a str,
        reason: FallbackReason,
    },
    /// An internal error. The turn proceeds with memory and messages unchanged.
    Fault {
        session_id: &'a str,
        error: &'a MemoryError,
    },
}

impl ObserverEvent<'_> {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            ObserverEvent::JobLaunched { session_id, .. }
            | ObserverEvent::JobSucceeded { session_id, .. }
            | ObserverEvent::JobFailed { session_id, .. }
            | ObserverEvent::ResultApplied { session_id, .. }
            | ObserverEvent::StaleResultDiscarded { session_id, .. }
            | ObserverEvent::Condensed { session_id, .. }
            | ObserverEvent::DegenerateFallback { session_id, .. }
            | ObserverEvent::Fault { session_id, .. } => session_id,
        }
    }
}

/// Receives pipeline events. Called synchronously, sometimes from background
/// tasks, so implementations must be cheap and must not block.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ObserverEvent<'_>) {
        let _ = event;
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let applied = Arc::new(AtomicUsize::new(0));
/// let counter = applied.clone();
/// let handler = FnEventHandler::new(move |event| {
///     if let ObserverEvent::ResultApplied { .. } = event {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ObserverEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ObserverEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ObserverEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ObserverEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to several handlers in registration order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ObserverEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ObserverEvent<'_>) {
        match event {
            ObserverEvent::JobLaunched {
                session_id,
                job_id,
                range_start,
                range_length,
                unobserved_tokens,
            } => {
                info!(
                    "[{session_id}] job #{job_id} launched: messages {range_start}..{} (~{unobserved_tokens} unobserved tokens)",
                    range_start + range_length
                );
            }
            ObserverEvent::JobSucceeded {
                session_id,
                job_id,
                entries,
                log_tokens,
            } => {
                info!(
                    "[{session_id}] job #{job_id} finished: {entries} observation(s), ~{log_tokens} tokens"
                );
            }
            ObserverEvent::JobFailed {
                session_id,
                job_id,
                error,
            } => {
                warn!("[{session_id}] job #{job_id} failed: {error}");
            }
            ObserverEvent::ResultApplied {
                session_id,
                removed,
                new_index,
                overtaken,
            } => {
                info!(
                    "[{session_id}] applied observations: removed {removed} message(s), observed through #{new_index}{}",
                    if *overtaken { " (newer messages kept)" } else { "" }
                );
            }
            ObserverEvent::StaleResultDiscarded {
                session_id,
                range_start,
                range_end,
                current_len,
            } => {
                warn!(
                    "[{session_id}] discarded stale result for messages {range_start}..{range_end} (sequence now has {current_len})"
                );
            }
            ObserverEvent::Condensed {
                session_id,
                outcome,
                input_tokens,
                output_tokens,
            } => {
                info!(
                    "[{session_id}] condensed observation log: ~{input_tokens} -> ~{output_tokens} tokens ({outcome:?})"
                );
            }
            ObserverEvent::DegenerateFallback { session_id, reason } => {
                warn!("[{session_id}] condensation fell back to the original log: {reason}");
            }
            ObserverEvent::Fault { session_id, error } => match error {
                MemoryError::StructurallyEmpty => {
                    warn!("[{session_id}] compression skipped: {error}")
                }
                _ => debug!("[{session_id}] compression skipped this turn: {error}"),
            },
        }
    }
}
