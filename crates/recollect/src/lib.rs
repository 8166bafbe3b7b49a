//! Background observational memory for long-running LLM conversations.
//!
//! `recollect` keeps an assistant's input context bounded while the
//! conversation itself is open-ended. Raw messages are folded into a
//! structured, date-grouped observation log by a background job, and the
//! folded range is spliced out of the live message sequence on a later turn.
//! The assistant keeps behaving as if it remembers everything; the context
//! window never grows without bound.
//!
//! The core abstraction is the [`Observer`](pipeline::Observer). Call
//! [`Observer::on_turn()`](pipeline::Observer::on_turn) once per turn with the
//! live message sequence. It never blocks and never fails the turn: it either
//! applies a finished background result, launches a new background job, or
//! does nothing.
//!
//! # Getting started
//!
//! ```ignore
//! use recollect::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = ObserverConfig::from_env();
//!     let store = FileStore::new(&config.storage_dir).map_err(|e| e.to_string())?;
//!     let compressor = OpenRouterCompressor::from_env()?;
//!
//!     let observer = Observer::new(config, Arc::new(store), Arc::new(compressor));
//!
//!     let mut messages = vec![Message::user("Help me plan the migration.")];
//!     // ... on every turn:
//!     match observer.on_turn("session-1", &mut messages) {
//!         TurnOutcome::Applied { removed, .. } => println!("folded {removed} messages"),
//!         other => println!("{other:?}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Per-turn entry point:** [`pipeline::Observer`] and [`pipeline::TurnOutcome`].
//! - **Single-flight background jobs:** [`pipeline::Coordinator`] and
//!   [`pipeline::PendingResult`].
//! - **Observability:** implement [`pipeline::EventHandler`] to receive
//!   [`pipeline::ObserverEvent`]s, or use [`pipeline::LoggingHandler`].
//! - **Thresholds and token estimates:** [`context::tokens`] and
//!   [`context::budget`].
//! - **Observation log model and merge:** [`memory`].
//! - **Talking to an LLM:** the [`compress::Compressor`] trait, with
//!   [`compress::OpenRouterCompressor`] as the bundled implementation.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Apply engine, background coordinator, job runner, events |
//! | [`compress`] | Compression capability trait, extraction retry, escalation controller, OpenRouter adapter |
//! | [`memory`] | Session memory model, merge, rendering, legacy upgrade, persistence |
//! | [`context`] | Token estimator, thresholds, degenerate output detector |
//! | [`config`] | [`ObserverConfig`](config::ObserverConfig) |

pub mod compress;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod prelude;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::MemoryError;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used to describe the output shape requested from
/// the compression capability.
///
/// # Example
///
/// ```
/// use recollect::json_schema_for;
/// use recollect::compress::ExtractionOutput;
///
/// let schema = json_schema_for::<ExtractionOutput>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Lifecycle status of a tool invocation part.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Pending => write!(f, "pending"),
            ToolStatus::Running => write!(f, "running"),
            ToolStatus::Completed => write!(f, "completed"),
            ToolStatus::Error => write!(f, "error"),
        }
    }
}

/// One typed piece of message content.
///
/// Part types this crate does not know about deserialize to
/// [`ContentPart::Unknown`] and are skipped everywhere.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Tool {
        name: String,
        #[serde(default)]
        call_id: String,
        status: ToolStatus,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// A message in the live conversation sequence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub parts: Vec<ContentPart>,
    /// Set on the synthetic message inserted where an observed range was
    /// removed. Continuity messages are never fed back into extraction.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continuity: bool,
}

impl Message {
    fn with_parts(role: MessageRole, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            timestamp: Utc::now(),
            parts,
            continuity: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_parts(
            MessageRole::System,
            vec![ContentPart::Text {
                text: content.into(),
            }],
        )
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_parts(
            MessageRole::User,
            vec![ContentPart::Text {
                text: content.into(),
            }],
        )
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::with_parts(
            MessageRole::Assistant,
            vec![ContentPart::Text {
                text: content.into(),
            }],
        )
    }

    /// An assistant message carrying a single tool invocation.
    pub fn tool_call(
        name: impl Into<String>,
        call_id: impl Into<String>,
        input: serde_json::Value,
        output: Option<String>,
        status: ToolStatus,
    ) -> Self {
        Self::with_parts(
            MessageRole::Assistant,
            vec![ContentPart::Tool {
                name: name.into(),
                call_id: call_id.into(),
                status,
                input,
                output,
                error: None,
            }],
        )
    }

    /// The synthetic message inserted at a removal point.
    pub fn continuity(content: impl Into<String>) -> Self {
        Self {
            continuity: true,
            ..Self::user(content)
        }
    }

    /// Override the timestamp (builder style).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// All text parts joined with newlines. Tool and unknown parts are skipped.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.text(), "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert!(!user.continuity);

        let cont = Message::continuity("carry on");
        assert!(cont.continuity);
        assert_eq!(cont.role, MessageRole::User);
    }

    #[test]
    fn unknown_parts_deserialize_to_unknown() {
        let json = r#"{
            "role": "assistant",
            "timestamp": "2026-03-01T10:00:00Z",
            "parts": [
                {"type": "text", "text": "hi"},
                {"type": "reasoning", "text": "hmm"},
                {"type": "tool", "name": "bash", "status": "error", "error": "exit 1"}
            ]
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.parts[1], ContentPart::Unknown);
        assert_eq!(msg.text(), "hi");
        assert!(!msg.continuity);
    }

    #[test]
    fn continuity_flag_skipped_when_false() {
        let json = serde_json::to_value(Message::user("x")).unwrap();
        assert!(json.get("continuity").is_none());
        let json = serde_json::to_value(Message::continuity("x")).unwrap();
        assert_eq!(json["continuity"], true);
    }
}
