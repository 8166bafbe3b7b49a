//! Character-based token estimates.
//!
//! Every threshold decision in the pipeline compares against these numbers,
//! so they only need to be stable and monotone in content length, not
//! tokenizer-exact.

use crate::memory::{ObservationGroup, render_observations};
use crate::{ContentPart, Message};

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// `ceil(chars / 4)`. Counts Unicode scalar values, not bytes.
pub fn estimate_text(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate for one content part. Tool parts count their input, output and
/// error text; unknown parts count nothing.
pub fn estimate_part(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } => estimate_text(text),
        ContentPart::Tool {
            input,
            output,
            error,
            ..
        } => {
            let input_tokens = match input {
                serde_json::Value::Null => 0,
                serde_json::Value::String(s) => estimate_text(s),
                other => estimate_text(&other.to_string()),
            };
            input_tokens
                + output.as_deref().map_or(0, estimate_text)
                + error.as_deref().map_or(0, estimate_text)
        }
        ContentPart::Unknown => 0,
    }
}

pub fn estimate_message(message: &Message) -> usize {
    message.parts.iter().map(estimate_part).sum()
}

/// Sum over a message slice. Empty input yields 0.
pub fn estimate_messages(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}

/// Estimate of an observation log in its rendered text form.
pub fn estimate_log(groups: &[ObservationGroup]) -> usize {
    if groups.is_empty() {
        return 0;
    }
    estimate_text(&render_observations(groups))
}
