//! The compression capability seam.
//!
//! A [`Compressor`] turns a prompt into a structured observation result. The
//! pipeline never talks to an LLM directly; it only sees this trait, so tests
//! script it and deployments plug in [`OpenRouterCompressor`](super::OpenRouterCompressor)
//! or their own adapter.
//!
//! Both calls follow the same contract: `Ok(Some(_))` is a parsed result,
//! `Ok(None)` means the capability answered but produced nothing usable, and
//! `Err(_)` is a failure the caller may retry.

use crate::memory::ObservationGroup;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Compressor`] methods.
pub type CompressFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Option<T>, String>> + Send + 'a>>;

/// Structured output of an extraction call.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
pub struct ExtractionOutput {
    /// New observations, grouped by date label.
    pub observations: Vec<ObservationGroup>,
    /// What the user is working on right now, in one sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// What the assistant should say or do next to continue seamlessly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_response: Option<String>,
}

/// Structured output of a condensation call.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
pub struct CondensationOutput {
    /// The complete replacement observation log.
    pub observations: Vec<ObservationGroup>,
}

/// Fold a transcript slice into new observations.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub system: String,
    pub prompt: String,
    pub model: Option<String>,
}

/// Rewrite an observation log into a smaller one.
#[derive(Debug, Clone)]
pub struct CondensationRequest {
    pub system: String,
    pub prompt: String,
    /// Escalation level, `0..=3`. Higher levels carry more aggressive guidance.
    pub level: u8,
    pub model: Option<String>,
}

/// The external text-generation capability.
pub trait Compressor: Send + Sync {
    fn extract(&self, request: ExtractionRequest) -> CompressFuture<'_, ExtractionOutput>;

    fn condense(&self, request: CondensationRequest) -> CompressFuture<'_, CondensationOutput>;
}
