//! Everything that talks to the compression capability.
//!
//! - [`capability`]: the [`Compressor`] trait and its request/output types.
//! - [`prompts`]: extraction and condensation prompt text, escalation guidance.
//! - [`extract`]: extraction with bounded retry and output checks.
//! - [`escalation`]: the condensation escalation controller.
//! - [`retry`]: classifying adapter failures and backing off on them.
//! - [`openrouter`]: [`OpenRouterCompressor`], the bundled HTTP adapter.

pub mod capability;
pub mod escalation;
pub mod extract;
pub mod openrouter;
pub mod prompts;
pub mod retry;

pub use capability::{
    CompressFuture, Compressor, CondensationOutput, CondensationRequest, ExtractionOutput,
    ExtractionRequest,
};
pub use escalation::{Condensation, CondenseOutcome, FallbackReason, condense_with_escalation};
pub use extract::extract_observations;
pub use openrouter::OpenRouterCompressor;
pub use retry::{Failure, RetryConfig};
