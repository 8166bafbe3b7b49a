//! Error taxonomy for the compression pipeline.
//!
//! None of these ever reach the end user. The apply engine reports them to
//! the [`EventHandler`](crate::pipeline::EventHandler) and skips compression
//! for the turn; background jobs report them and store nothing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The compression capability returned an error (HTTP failure, timeout,
    /// malformed response envelope).
    #[error("compression capability failed: {0}")]
    Capability(String),

    /// The capability answered with null or with output that did not match
    /// the requested shape.
    #[error("compression capability returned no usable result")]
    NoResult,

    /// Output tripped the repetition-loop detector.
    #[error("compression output looks degenerate (repetition loop)")]
    Degenerate,

    /// Output contained zero observation entries.
    #[error("compression output contains no observations")]
    StructurallyEmpty,

    /// A pending result no longer fits the live message sequence.
    #[error(
        "pending result covers messages {range_start}..{range_end} but the live sequence has {current_len}"
    )]
    Stale {
        range_start: usize,
        range_end: usize,
        current_len: usize,
    },

    #[error("no tokio runtime available to launch a background job")]
    NoRuntime,

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Whether a fresh attempt could plausibly succeed. Used by the
    /// extraction retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoryError::Capability(_)
                | MemoryError::NoResult
                | MemoryError::Degenerate
                | MemoryError::StructurallyEmpty
        )
    }
}
