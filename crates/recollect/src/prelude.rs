//! Convenience re-exports for common `recollect` types.
//!
//! ```ignore
//! use recollect::prelude::*;
//! ```
//!
//! Covers wiring an [`Observer`] into a host loop: configuration, storage,
//! the compression capability, and event handlers. Lower-level pieces
//! (escalation, legacy parsing, token estimates) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ContentPart, Message, MessageRole, ToolStatus, json_schema_for};
pub use crate::config::ObserverConfig;
pub use crate::error::MemoryError;

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::pipeline::{
    CompositeEventHandler, Coordinator, EventHandler, FnEventHandler, JobOutcome, LoggingHandler,
    NoopHandler, Observer, ObserverEvent, TurnOutcome,
};

// ── Memory ──────────────────────────────────────────────────────────
pub use crate::memory::{
    FileStore, InMemoryStore, MemoryStore, ObservationEntry, ObservationGroup, Priority,
    SessionMemory, render_observations,
};

// ── Compression ─────────────────────────────────────────────────────
pub use crate::compress::{
    CompressFuture, Compressor, CondensationOutput, CondensationRequest, ExtractionOutput,
    ExtractionRequest, OpenRouterCompressor, RetryConfig,
};
