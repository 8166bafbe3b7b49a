//! Best-effort reparse of the older plain-text memory format.
//!
//! Older session files stored the observation log as a single markdown-ish
//! string:
//!
//! ```text
//! Date: Mar 1, 2026
//! - 🔴 09:15 User is migrating the billing service
//!   - target cutover is Friday
//! - 🟡 10:02 Agreed to keep the legacy API
//! ```
//!
//! Lines that do not fit the shape are kept verbatim as high-priority entries
//! rather than dropped. Entries that appear before any `Date:` heading land in
//! an `"Undated"` group.

use super::types::{ObservationEntry, ObservationGroup, Priority};

/// Group label for entries that precede every `Date:` heading.
pub const UNDATED: &str = "Undated";

/// Parse a legacy plain-text observation log.
pub fn parse_legacy_log(text: &str) -> Vec<ObservationGroup> {
    let mut groups: Vec<ObservationGroup> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(date) = trimmed.strip_prefix("Date:") {
            groups.push(ObservationGroup::new(date.trim(), Vec::new()));
            continue;
        }

        let indented = line.len() != trimmed.len();
        let bullet = strip_bullet(trimmed);

        if indented
            && let Some(child) = bullet
            && let Some(last) = groups.last_mut().and_then(|g| g.entries.last_mut())
        {
            last.children.push(child.to_string());
            continue;
        }

        let entry = bullet
            .and_then(parse_entry)
            .unwrap_or_else(|| ObservationEntry::new(Priority::High, "", bullet.unwrap_or(trimmed)));
        current_group(&mut groups).entries.push(entry);
    }

    groups
}

fn current_group(groups: &mut Vec<ObservationGroup>) -> &mut ObservationGroup {
    if groups.is_empty() {
        groups.push(ObservationGroup::new(UNDATED, Vec::new()));
    }
    let last = groups.len() - 1;
    &mut groups[last]
}

fn strip_bullet(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim_start)
}

/// `🔴 09:15 text`, `🔴 (09:15) text` or `🔴 text`.
fn parse_entry(body: &str) -> Option<ObservationEntry> {
    let (marker, rest) = body.split_once(' ').unwrap_or((body, ""));
    let priority = Priority::from_marker(marker)?;
    let rest = rest.trim_start();

    let (first, after) = rest.split_once(' ').unwrap_or((rest, ""));
    let label = first
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(first);
    let (time, text) = if is_time_label(label) {
        (label, after.trim_start())
    } else {
        ("", rest)
    };

    if text.is_empty() {
        return None;
    }
    Some(ObservationEntry::new(priority, time, text))
}

/// `H:MM` or `HH:MM`.
fn is_time_label(s: &str) -> bool {
    let Some((hours, minutes)) = s.split_once(':') else {
        return false;
    };
    (1..=2).contains(&hours.len())
        && minutes.len() == 2
        && hours.chars().all(|c| c.is_ascii_digit())
        && minutes.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dates_entries_and_children() {
        let text = "\
Date: Mar 1, 2026
- 🔴 09:15 Migrating billing
  - cutover Friday
  - keep old API
- 🟡 (10:02) Agreed on rollout

Date: Mar 2, 2026
- 🟢 Coffee chat
";
        let groups = parse_legacy_log(text);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, "Mar 1, 2026");
        assert_eq!(groups[0].entries.len(), 2);

        let first = &groups[0].entries[0];
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.time, "09:15");
        assert_eq!(first.text, "Migrating billing");
        assert_eq!(first.children, vec!["cutover Friday", "keep old API"]);

        assert_eq!(groups[0].entries[1].time, "10:02");
        assert_eq!(groups[0].entries[1].priority, Priority::Medium);

        let last = &groups[1].entries[0];
        assert_eq!(last.priority, Priority::Low);
        assert_eq!(last.time, "");
        assert_eq!(last.text, "Coffee chat");
    }

    #[test]
    fn misparsed_lines_become_high_priority_entries() {
        let text = "\
Date: Mar 1, 2026
User prefers tabs
- no marker here
- 🔴
";
        let groups = parse_legacy_log(text);
        let entries = &groups[0].entries;
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.priority == Priority::High));
        assert_eq!(entries[0].text, "User prefers tabs");
        assert_eq!(entries[1].text, "no marker here");
        assert_eq!(entries[2].text, "🔴");
    }

    #[test]
    fn entries_before_any_heading_are_undated() {
        let groups = parse_legacy_log("- 🟡 08:00 Early note\nDate: Mar 3, 2026\n- 🟢 Later");
        assert_eq!(groups[0].date, UNDATED);
        assert_eq!(groups[0].entries[0].text, "Early note");
        assert_eq!(groups[1].date, "Mar 3, 2026");
    }

    #[test]
    fn orphan_child_becomes_entry() {
        let groups = parse_legacy_log("Date: Mar 1, 2026\n  - dangling detail");
        assert_eq!(groups[0].entries.len(), 1);
        assert_eq!(groups[0].entries[0].text, "dangling detail");
        assert_eq!(groups[0].entries[0].priority, Priority::High);
    }

    #[test]
    fn empty_input() {
        assert!(parse_legacy_log("").is_empty());
        assert!(parse_legacy_log("\n\n  \n").is_empty());
    }

    #[test]
    fn time_labels() {
        assert!(is_time_label("9:05"));
        assert!(is_time_label("23:59"));
        assert!(!is_time_label("123:00"));
        assert!(!is_time_label("ab:cd"));
        assert!(!is_time_label("Deploy"));
    }
}
