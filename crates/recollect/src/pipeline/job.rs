//! The background observation job.
//!
//! Everything a job reads is captured into a [`JobInput`] on the turn that
//! launches it. The job itself only suspends on capability calls and never
//! touches the live message sequence or the session cache.

use super::coordinator::PendingResult;
use super::events::{EventHandler, ObserverEvent};
use crate::compress::prompts::extraction_request;
use crate::compress::{
    Compressor, CondenseOutcome, condense_with_escalation, extract_observations,
};
use crate::config::ObserverConfig;
use crate::context::{Thresholds, estimate_log};
use crate::error::MemoryError;
use crate::memory::{SessionMemory, is_structurally_empty, merge};
use crate::Message;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a background job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// A [`PendingResult`] was stored.
    Succeeded,
    /// Nothing was stored.
    Failed { reason: String },
}

/// Snapshot taken synchronously at launch.
pub(crate) struct JobInput {
    pub session_id: String,
    /// Live messages from `range_start` to the end of the sequence.
    pub messages: Vec<Message>,
    pub memory: SessionMemory,
    pub range_start: usize,
    pub unobserved_tokens: usize,
}

/// Shared collaborators a job needs.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub config: Arc<ObserverConfig>,
    pub compressor: Arc<dyn Compressor>,
    pub events: Arc<dyn EventHandler>,
}

/// Extract, merge, condense if needed, and build the replacement memory.
pub(crate) async fn run_observation_job(
    ctx: JobContext,
    input: JobInput,
    job_id: u64,
) -> Result<PendingResult, MemoryError> {
    let session_id = input.session_id.as_str();
    let range_length = input.messages.len();
    ctx.events.on_event(&ObserverEvent::JobLaunched {
        session_id,
        job_id,
        range_start: input.range_start,
        range_length,
        unobserved_tokens: input.unobserved_tokens,
    });

    match build_result(&ctx, &input, range_length).await {
        Ok(pending) => {
            ctx.events.on_event(&ObserverEvent::JobSucceeded {
                session_id,
                job_id,
                entries: pending.new_memory.entry_count(),
                log_tokens: estimate_log(&pending.new_memory.observation_log),
            });
            Ok(pending)
        }
        Err(error) => {
            ctx.events.on_event(&ObserverEvent::JobFailed {
                session_id,
                job_id,
                error: &error,
            });
            Err(error)
        }
    }
}

async fn build_result(
    ctx: &JobContext,
    input: &JobInput,
    range_length: usize,
) -> Result<PendingResult, MemoryError> {
    let config = ctx.config.as_ref();
    let session_id = input.session_id.as_str();

    let request = extraction_request(&input.memory.observation_log, &input.messages, config);
    if config.debug {
        debug!("[{session_id}] extraction prompt:\n{}", request.prompt);
    }

    let extracted =
        extract_observations(ctx.compressor.as_ref(), &request, config.extraction_retries).await?;

    let mut log = merge(&input.memory.observation_log, &extracted.observations);
    let mut condensation = None;
    let mut last_reflected_at = input.memory.last_reflected_at;

    let thresholds = Thresholds::from_config(config);
    let merged_tokens = estimate_log(&log);
    if thresholds.needs_reflection(merged_tokens) {
        debug!(
            "[{session_id}] observation log at ~{merged_tokens} tokens, reflection threshold {}",
            thresholds.reflection
        );
        let result = condense_with_escalation(ctx.compressor.as_ref(), &log, config).await;
        ctx.events.on_event(&ObserverEvent::Condensed {
            session_id,
            outcome: &result.outcome,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
        });
        if let CondenseOutcome::FellBack { reason, .. } = result.outcome {
            ctx.events.on_event(&ObserverEvent::DegenerateFallback { session_id, reason });
        }
        last_reflected_at = Some(Utc::now());
        condensation = Some(result.outcome);
        log = result.observations;
    }

    if is_structurally_empty(&log) {
        warn!("[{session_id}] job produced a structurally empty log; not storing it");
        return Err(MemoryError::StructurallyEmpty);
    }

    let now = Utc::now();
    let new_memory = SessionMemory {
        observation_log: log,
        last_observed_index: Some(input.range_start),
        last_observed_token_count: input.unobserved_tokens,
        last_observed_at: Some(now),
        last_reflected_at,
        current_task_hint: extracted
            .current_task
            .filter(|t| !t.trim().is_empty())
            .or_else(|| input.memory.current_task_hint.clone()),
        suggested_response_hint: extracted
            .suggested_response
            .filter(|s| !s.trim().is_empty()),
    };

    Ok(PendingResult {
        new_memory,
        range_start: input.range_start,
        range_length,
        condensation,
        completed_at: now,
    })
}
