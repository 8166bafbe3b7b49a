//! Prompt text for extraction and condensation.
//!
//! Both prompts ask for JSON matching the output schema; the schema itself is
//! attached by the adapter (`response_format`), so the prompts only describe
//! content rules.

use super::capability::{CondensationRequest, ExtractionRequest};
use crate::Message;
use crate::config::ObserverConfig;
use crate::memory::{ObservationGroup, render_observations, render_transcript};

/// Highest condensation escalation level.
pub const MAX_LEVEL: u8 = 3;

const EXTRACTION_PROMPT: &str = "\
You maintain the long-term memory of an AI assistant. Read the conversation \
transcript and record what is worth remembering as observations.

Each observation has:
- priority: \"high\" for goals, decisions, constraints, user preferences and \
  unresolved problems; \"medium\" for useful context and intermediate results; \
  \"low\" for minor details.
- time: the HH:MM time the fact was established, taken from the transcript.
- text: one self-contained sentence.
- children: optional supporting details (file paths, values, error messages), \
  copied verbatim.

Group observations under the date they happened, written like \"Mar 1, 2026\".

Rules:
- Only record facts stated in the transcript. Do not infer or extrapolate.
- Do not repeat anything already listed under EXISTING OBSERVATIONS.
- Preserve file paths, identifiers, numbers and error messages exactly.
- Also report current_task (what the user is working on right now) and \
  suggested_response (how the assistant should continue) as short sentences.";

const CONDENSATION_PROMPT: &str = "\
You maintain the long-term memory of an AI assistant. The observation log \
below has grown too large. Rewrite it as a smaller log that keeps everything \
the assistant needs to continue the work.

Rules:
- Keep every date group that still has relevant observations, in the same order.
- Keep the original priority of each observation you keep.
- Merge related observations into one; drop superseded and trivial ones.
- Preserve file paths, identifiers, numbers and error messages exactly.
- Return the complete replacement log, not a diff.";

/// Extra guidance appended at each escalation level.
pub fn guidance(level: u8) -> &'static str {
    match level.min(MAX_LEVEL) {
        0 => "Aim for a log noticeably shorter than the input.",
        1 => {
            "The previous attempt did not shrink the log. Merge aggressively and \
             drop low-priority observations that are no longer relevant."
        }
        2 => {
            "The log is still too large. Keep only high and medium priority \
             observations, collapse children into their parent sentence, and \
             summarize each day in a few entries."
        }
        _ => {
            "Final attempt. Produce the smallest log that still lets the assistant \
             continue: high priority observations only, at most a handful per date, \
             no children."
        }
    }
}

fn system_prompt(base: &str, config: &ObserverConfig) -> String {
    match config.instructions.as_deref().map(str::trim) {
        Some(extra) if !extra.is_empty() => format!("{base}\n\nAdditional instructions:\n{extra}"),
        _ => base.to_string(),
    }
}

/// Build the extraction request for a captured transcript slice.
pub fn extraction_request(
    existing: &[ObservationGroup],
    messages: &[Message],
    config: &ObserverConfig,
) -> ExtractionRequest {
    let mut prompt = String::new();
    if !existing.is_empty() {
        prompt.push_str("=== EXISTING OBSERVATIONS ===\n");
        prompt.push_str(&render_observations(existing));
        prompt.push('\n');
    }
    prompt.push_str("=== NEW TRANSCRIPT ===\n");
    prompt.push_str(&render_transcript(messages));

    ExtractionRequest {
        system: system_prompt(EXTRACTION_PROMPT, config),
        prompt,
        model: config.model.clone(),
    }
}

/// Build the condensation request for one escalation level.
pub fn condensation_request(
    log: &[ObservationGroup],
    level: u8,
    config: &ObserverConfig,
) -> CondensationRequest {
    let level = level.min(MAX_LEVEL);
    let prompt = format!(
        "=== OBSERVATION LOG ===\n{}\n=== GUIDANCE (level {level}) ===\n{}\n",
        render_observations(log),
        guidance(level)
    );
    CondensationRequest {
        system: system_prompt(CONDENSATION_PROMPT, config),
        prompt,
        level,
        model: config.model.clone(),
    }
}
