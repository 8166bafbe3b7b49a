//! Repetition-loop detector for compression output.
//!
//! Language models occasionally fall into a loop and emit the same span over
//! and over until they hit their output limit. Output like that must never
//! replace a real observation log. The check is a heuristic: short text always
//! passes, a single enormous line always fails, and everything else is judged
//! by how many evenly spaced samples are exact duplicates of each other.

use std::collections::HashSet;

/// Text shorter than this (in chars) is never degenerate.
pub const MIN_CHARS: usize = 2_000;

/// A single line at least this long (in chars) is always degenerate.
pub const MAX_LINE_CHARS: usize = 50_000;

/// Width of each sampled window, in chars.
pub const WINDOW_CHARS: usize = 200;

/// Fewer samples than this are not enough to judge.
pub const MIN_SAMPLES: usize = 6;

/// Duplicate-sample fraction above which text is degenerate.
pub const DUPLICATE_RATIO: f64 = 0.4;

/// Whether `text` looks like a repetition loop.
pub fn is_degenerate(text: &str) -> bool {
    let len = text.chars().count();
    if len < MIN_CHARS {
        return false;
    }

    if text
        .lines()
        .any(|line| line.chars().count() >= MAX_LINE_CHARS)
    {
        return true;
    }

    duplicate_ratio(text, len).is_some_and(|ratio| ratio > DUPLICATE_RATIO)
}

/// Fraction of sampled windows that repeat an earlier sample, or `None` when
/// there are too few samples.
fn duplicate_ratio(text: &str, len: usize) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let stride = (len / 50).max(1);

    let mut seen: HashSet<&[char]> = HashSet::new();
    let mut samples = 0usize;
    let mut duplicates = 0usize;
    let mut start = 0usize;
    while start + WINDOW_CHARS <= chars.len() {
        samples += 1;
        if !seen.insert(&chars[start..start + WINDOW_CHARS]) {
            duplicates += 1;
        }
        start += stride;
    }

    if samples < MIN_SAMPLES {
        return None;
    }
    Some(duplicates as f64 / samples as f64)
}
