//! Session memory data model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Importance of an observation. Assigned once by the compression capability
/// and never changed afterwards.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Marker used in the rendered text form.
    pub fn marker(self) -> &'static str {
        match self {
            Priority::High => "🔴",
            Priority::Medium => "🟡",
            Priority::Low => "🟢",
        }
    }

    /// Inverse of [`marker()`](Self::marker).
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "🔴" => Some(Priority::High),
            "🟡" => Some(Priority::Medium),
            "🟢" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One observed fact.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct ObservationEntry {
    pub priority: Priority,
    /// Display label such as `"14:05"`. Never parsed or sorted on.
    pub time: String,
    pub text: String,
    /// Supporting detail lines, append-only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl ObservationEntry {
    pub fn new(priority: Priority, time: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            priority,
            time: time.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: impl Into<String>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// All entries observed under one date label.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct ObservationGroup {
    /// Display label such as `"Mar 1, 2026"`. The merge key, compared by
    /// string equality only.
    pub date: String,
    pub entries: Vec<ObservationEntry>,
}

impl ObservationGroup {
    pub fn new(date: impl Into<String>, entries: Vec<ObservationEntry>) -> Self {
        Self {
            date: date.into(),
            entries,
        }
    }
}

/// Total entries across all groups.
pub fn entry_count(groups: &[ObservationGroup]) -> usize {
    groups.iter().map(|g| g.entries.len()).sum()
}

/// Zero entries across all groups. Empty groups do not count.
pub fn is_structurally_empty(groups: &[ObservationGroup]) -> bool {
    entry_count(groups) == 0
}

/// Everything remembered about one session.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionMemory {
    /// One group per distinct date, in first-appearance order.
    #[serde(default)]
    pub observation_log: Vec<ObservationGroup>,
    /// Index into the live message sequence. Messages at or before it are
    /// represented by `observation_log`. `None` until the first apply.
    #[serde(default)]
    pub last_observed_index: Option<usize>,
    #[serde(default)]
    pub last_observed_token_count: usize,
    #[serde(default)]
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reflected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_response_hint: Option<String>,
}

impl SessionMemory {
    pub fn entry_count(&self) -> usize {
        entry_count(&self.observation_log)
    }

    /// Nothing has been observed yet.
    pub fn is_fresh(&self) -> bool {
        self.last_observed_index.is_none() && self.observation_log.is_empty()
    }
}
