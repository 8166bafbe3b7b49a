//! Date-keyed merge of observation logs.
//!
//! Groups are matched by exact `date` label. Within a date, existing entries
//! come first and incoming entries follow in their own order. Dates are
//! ordered by first appearance, scanning `existing` and then `incoming`.
//! Nothing is dropped, deduplicated or re-sorted, which makes the merge
//! associative: folding three batches in one step or two gives the same log.

use super::types::ObservationGroup;
use std::collections::HashMap;

/// Combine two observation logs.
pub fn merge(
    existing: &[ObservationGroup],
    incoming: &[ObservationGroup],
) -> Vec<ObservationGroup> {
    let mut merged: Vec<ObservationGroup> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for group in existing.iter().chain(incoming) {
        match index.get(&group.date) {
            Some(&slot) => merged[slot].entries.extend(group.entries.iter().cloned()),
            None => {
                index.insert(group.date.clone(), merged.len());
                merged.push(group.clone());
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ObservationEntry, Priority, entry_count};

    fn entry(text: &str) -> ObservationEntry {
        ObservationEntry::new(Priority::Medium, "12:00", text)
    }

    fn group(date: &str, texts: &[&str]) -> ObservationGroup {
        ObservationGroup::new(date, texts.iter().map(|t| entry(t)).collect())
    }

    fn texts(group: &ObservationGroup) -> Vec<&str> {
        group.entries.iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn same_date_concatenates_existing_then_incoming() {
        let existing = vec![group("Mar 1, 2026", &["a", "b"])];
        let incoming = vec![group("Mar 1, 2026", &["c"])];

        let merged = merge(&existing, &incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].date, "Mar 1, 2026");
        assert_eq!(texts(&merged[0]), vec!["a", "b", "c"]);
    }

    #[test]
    fn dates_ordered_by_first_appearance() {
        let existing = vec![group("Mar 2, 2026", &["x"]), group("Mar 1, 2026", &["y"])];
        let incoming = vec![group("Mar 3, 2026", &["z"]), group("Mar 1, 2026", &["w"])];

        let merged = merge(&existing, &incoming);
        let dates: Vec<&str> = merged.iter().map(|g| g.date.as_str()).collect();
        assert_eq!(dates, vec!["Mar 2, 2026", "Mar 1, 2026", "Mar 3, 2026"]);
        assert_eq!(texts(&merged[1]), vec!["y", "w"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let existing = vec![group("Today", &["same"])];
        let incoming = vec![group("Today", &["same"])];
        let merged = merge(&existing, &incoming);
        assert_eq!(texts(&merged[0]), vec!["same", "same"]);
    }

    #[test]
    fn empty_sides() {
        let log = vec![group("Mar 1, 2026", &["a"])];
        assert_eq!(merge(&log, &[]), log);
        assert_eq!(merge(&[], &log), log);
        assert!(merge(&[], &[]).is_empty());
    }

    #[test]
    fn priorities_and_children_survive() {
        let existing = vec![ObservationGroup::new(
            "Mar 1, 2026",
            vec![ObservationEntry::new(Priority::High, "09:00", "Deploy").with_child("rollback plan")],
        )];
        let incoming = vec![ObservationGroup::new(
            "Mar 1, 2026",
            vec![ObservationEntry::new(Priority::Low, "09:30", "Lunch")],
        )];
        let merged = merge(&existing, &incoming);
        assert_eq!(merged[0].entries[0].priority, Priority::High);
        assert_eq!(merged[0].entries[0].children, vec!["rollback plan"]);
        assert_eq!(merged[0].entries[1].priority, Priority::Low);
    }

    /// Small deterministic generator so the property loop needs no extra crate.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 33) % bound
        }

        fn log(&mut self, tag: &str) -> Vec<ObservationGroup> {
            let groups = self.next(4);
            (0..groups)
                .map(|g| {
                    let date = format!("Mar {}, 2026", self.next(3) + 1);
                    let entries = (0..self.next(3))
                        .map(|e| entry(&format!("{tag}-{g}-{e}")))
                        .collect();
                    ObservationGroup::new(date, entries)
                })
                .collect()
        }
    }

    #[test]
    fn merge_is_associative_and_lossless() {
        let mut rng = Lcg(7);
        for round in 0..200 {
            let a = rng.log("a");
            let b = rng.log("b");
            let c = rng.log("c");

            let left = merge(&merge(&a, &b), &c);
            let right = merge(&a, &merge(&b, &c));
            assert_eq!(left, right, "round {round}");
            assert_eq!(
                entry_count(&left),
                entry_count(&a) + entry_count(&b) + entry_count(&c)
            );
        }
    }
}
