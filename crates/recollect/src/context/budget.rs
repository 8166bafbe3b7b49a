//! Threshold evaluation for the apply engine.
//!
//! Two numbers drive each turn: the token estimate of messages not yet folded
//! into the observation log, and the three thresholds derived from
//! [`ObserverConfig`]. The apply engine builds a [`TurnUsage`] snapshot, acts
//! on its [`UsageLevel`], and logs [`TurnUsage::to_log_string()`].
//!
//! # Example
//!
//! ```
//! use recollect::config::ObserverConfig;
//! use recollect::context::{Thresholds, UsageLevel};
//!
//! let config = ObserverConfig::default().with_primary_threshold(1_000);
//! let thresholds = Thresholds::from_config(&config);
//! assert_eq!(thresholds.prefetch, 200);
//!
//! let usage = thresholds.evaluate(250, 0);
//! assert_eq!(usage.level, UsageLevel::Prefetch);
//! ```

use crate::config::ObserverConfig;

/// Token thresholds for one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Unobserved tokens at which a pending result is applied.
    pub primary: usize,
    /// Observation-log tokens at which condensation runs.
    pub reflection: usize,
    /// Unobserved tokens at which a background job is launched.
    pub prefetch: usize,
}

impl Thresholds {
    pub fn from_config(config: &ObserverConfig) -> Self {
        Self {
            primary: config.primary_threshold,
            reflection: config.reflection_threshold,
            prefetch: config.prefetch_threshold(),
        }
    }

    /// Classify a turn by its unobserved-token estimate.
    pub fn evaluate(&self, unobserved_tokens: usize, log_tokens: usize) -> TurnUsage {
        let level = if unobserved_tokens >= self.primary {
            UsageLevel::Primary
        } else if unobserved_tokens >= self.prefetch {
            UsageLevel::Prefetch
        } else {
            UsageLevel::Below
        };
        TurnUsage {
            unobserved_tokens,
            log_tokens,
            level,
            thresholds: *self,
        }
    }

    /// Whether an observation log of this size should be condensed.
    pub fn needs_reflection(&self, log_tokens: usize) -> bool {
        log_tokens >= self.reflection
    }
}

/// Which threshold the unobserved-token estimate has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UsageLevel {
    /// Under the prefetch threshold: nothing to do.
    Below,
    /// At or above prefetch: a background job may be launched.
    Prefetch,
    /// At or above primary: a pending result may be applied.
    Primary,
}

/// Snapshot of one turn's sizing.
#[derive(Debug, Clone, Copy)]
pub struct TurnUsage {
    pub unobserved_tokens: usize,
    pub log_tokens: usize,
    pub level: UsageLevel,
    pub thresholds: Thresholds,
}

impl TurnUsage {
    /// Short log-friendly form.
    pub fn to_log_string(&self) -> String {
        let pct = if self.thresholds.primary > 0 {
            self.unobserved_tokens as f64 / self.thresholds.primary as f64 * 100.0
        } else {
            100.0
        };
        format!(
            "unobserved: ~{} tokens ({:.0}% of {}), log: ~{} tokens, level: {:?}",
            self.unobserved_tokens, pct, self.thresholds.primary, self.log_tokens, self.level,
        )
    }
}
