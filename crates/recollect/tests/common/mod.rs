//! Shared helpers for the integration tests.

#![allow(dead_code)]

use recollect::compress::{
    CompressFuture, Compressor, CondensationOutput, CondensationRequest, ExtractionOutput,
    ExtractionRequest,
};
use recollect::config::ObserverConfig;
use recollect::memory::{ObservationEntry, ObservationGroup, Priority};
use recollect::Message;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every extraction with one fresh observation, unless told to fail.
/// Condensation keeps only the first entry.
#[derive(Default)]
pub struct ScriptedCompressor {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` extraction calls with a capability error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn extraction_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Compressor for ScriptedCompressor {
    fn extract(&self, request: ExtractionRequest) -> CompressFuture<'_, ExtractionOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.prompt);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        Box::pin(async move {
            if fail {
                return Err("HTTP 503 Service Unavailable".to_string());
            }
            Ok(Some(ExtractionOutput {
                observations: vec![ObservationGroup::new(
                    "Mar 1, 2026",
                    vec![ObservationEntry::new(
                        Priority::Medium,
                        "10:00",
                        format!("observation number {n}"),
                    )],
                )],
                current_task: Some(format!("Task as of call {n}")),
                suggested_response: Some("Keep going".to_string()),
            }))
        })
    }

    fn condense(&self, request: CondensationRequest) -> CompressFuture<'_, CondensationOutput> {
        let _ = request;
        Box::pin(async move {
            Ok(Some(CondensationOutput {
                observations: vec![ObservationGroup::new(
                    "Mar 1, 2026",
                    vec![ObservationEntry::new(Priority::High, "", "condensed")],
                )],
            }))
        })
    }
}

/// Primary 1,000 tokens with the default 0.2 prefetch fraction (200).
pub fn small_config() -> ObserverConfig {
    ObserverConfig::default()
        .with_primary_threshold(1_000)
        .with_prefetch_fraction(0.2)
}

/// A user message estimated at exactly `tokens` tokens.
pub fn sized(tokens: usize) -> Message {
    Message::user("x".repeat(tokens * 4))
}

pub fn continuity_count(messages: &[Message]) -> usize {
    messages.iter().filter(|m| m.continuity).count()
}
