//! Sizing and sanity checks for everything the pipeline decides on.
//!
//! 1. **[`tokens`]**: character-based token estimates for text, messages and
//!    observation logs. Deterministic, never panics.
//!
//! 2. **[`budget`]**: [`Thresholds`] derived from
//!    [`ObserverConfig`](crate::config::ObserverConfig) and the per-turn
//!    [`TurnUsage`] snapshot the apply engine acts on.
//!
//! 3. **[`degenerate`]**: statistical repetition-loop detector applied to
//!    every piece of compression output before it is trusted.

pub mod budget;
pub mod degenerate;
pub mod tokens;

pub use budget::{Thresholds, TurnUsage, UsageLevel};
pub use degenerate::is_degenerate;
pub use tokens::{CHARS_PER_TOKEN, estimate_log, estimate_messages, estimate_text};
