//! Canonical text forms.
//!
//! [`render_observations`] is the single text rendering of an observation
//! log. Prompt input, size estimates, degenerate checks, host-side prompt
//! injection and the CLI all go through it, so the numbers they see agree.
//!
//! ```text
//! Date: Mar 1, 2026
//! * 🔴 (09:15) User is migrating the billing service to Postgres
//!   * target cutover is Friday
//! * 🟡 (10:02) Agreed to keep the legacy API for one release
//! ```

use super::types::ObservationGroup;
use crate::{ContentPart, Message};
use std::fmt::Write;

/// Render an observation log. Groups are separated by a blank line.
pub fn render_observations(groups: &[ObservationGroup]) -> String {
    let mut out = String::new();
    for (i, group) in groups.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "Date: {}", group.date);
        for entry in &group.entries {
            if entry.time.is_empty() {
                let _ = writeln!(out, "* {} {}", entry.priority.marker(), entry.text);
            } else {
                let _ = writeln!(
                    out,
                    "* {} ({}) {}",
                    entry.priority.marker(),
                    entry.time,
                    entry.text
                );
            }
            for child in &entry.children {
                let _ = writeln!(out, "  * {child}");
            }
        }
    }
    out
}

/// Render a captured message slice for the extraction prompt.
///
/// Continuity messages are skipped (their content is already in the log).
/// Tool parts are summarised with their status; unknown parts are dropped.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages.iter().filter(|m| !m.continuity) {
        let mut body = String::new();
        for part in &msg.parts {
            match part {
                ContentPart::Text { text } if !text.trim().is_empty() => {
                    let _ = writeln!(body, "{}", text.trim_end());
                }
                ContentPart::Tool {
                    name,
                    status,
                    input,
                    output,
                    error,
                    ..
                } => {
                    let _ = write!(body, "[tool {name} ({status})]");
                    match input {
                        serde_json::Value::Null => {}
                        serde_json::Value::String(s) => {
                            let _ = write!(body, " input: {s}");
                        }
                        other => {
                            let _ = write!(body, " input: {other}");
                        }
                    }
                    body.push('\n');
                    if let Some(output) = output.as_deref().filter(|s| !s.is_empty()) {
                        let _ = writeln!(body, "{}", output.trim_end());
                    }
                    if let Some(error) = error.as_deref().filter(|s| !s.is_empty()) {
                        let _ = writeln!(body, "error: {}", error.trim_end());
                    }
                }
                _ => {}
            }
        }
        if body.is_empty() {
            continue;
        }
        let _ = writeln!(
            out,
            "[{} @ {}]",
            msg.role,
            msg.timestamp.format("%Y-%m-%d %H:%M")
        );
        out.push_str(&body);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolStatus;
    use crate::memory::types::{ObservationEntry, Priority};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn renders_groups_entries_and_children() {
        let groups = vec![
            ObservationGroup::new(
                "Mar 1, 2026",
                vec![
                    ObservationEntry::new(Priority::High, "09:15", "Migrating billing")
                        .with_child("cutover Friday"),
                    ObservationEntry::new(Priority::Medium, "", "No time label"),
                ],
            ),
            ObservationGroup::new(
                "Mar 2, 2026",
                vec![ObservationEntry::new(Priority::Low, "08:00", "Coffee")],
            ),
        ];
        let text = render_observations(&groups);
        assert_eq!(
            text,
            "Date: Mar 1, 2026\n\
             * 🔴 (09:15) Migrating billing\n\
             \x20\x20* cutover Friday\n\
             * 🟡 No time label\n\
             \n\
             Date: Mar 2, 2026\n\
             * 🟢 (08:00) Coffee\n"
        );
    }

    #[test]
    fn empty_log_renders_empty() {
        assert_eq!(render_observations(&[]), "");
    }

    #[test]
    fn transcript_skips_continuity_and_unknown_parts() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();
        let mut assistant = Message::assistant_text("Sure.").at(ts);
        assistant.parts.push(ContentPart::Unknown);
        let messages = vec![
            Message::continuity("Earlier context").at(ts),
            Message::user("Plan the migration").at(ts),
            assistant,
        ];

        let text = render_transcript(&messages);
        assert!(!text.contains("Earlier context"));
        assert!(text.contains("[user @ 2026-03-01 10:30]\nPlan the migration\n"));
        assert!(text.contains("[assistant @ 2026-03-01 10:30]\nSure.\n"));
    }

    #[test]
    fn transcript_summarises_tool_parts() {
        let mut msg = Message::tool_call(
            "bash",
            "call_1",
            json!("cargo fmt"),
            None,
            ToolStatus::Error,
        );
        if let ContentPart::Tool { error, .. } = &mut msg.parts[0] {
            *error = Some("exit status 1".into());
        }
        let pending = Message::tool_call("read", "c2", json!({"path": "a.rs"}), None, ToolStatus::Pending);

        let text = render_transcript(&[msg, pending]);
        assert!(text.contains("[tool bash (error)] input: cargo fmt"));
        assert!(text.contains("error: exit status 1"));
        assert!(text.contains("[tool read (pending)] input: {\"path\":\"a.rs\"}"));
    }

    #[test]
    fn messages_without_content_are_omitted() {
        let msg = Message::user("   ");
        assert_eq!(render_transcript(&[msg]), "");
    }
}
