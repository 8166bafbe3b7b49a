//! Escalating condensation of an oversized observation log.
//!
//! Each attempt asks the capability to rewrite the log with the guidance for
//! the current level. A result estimated smaller than the input is accepted
//! immediately. Otherwise the level goes up (capped at
//! [`MAX_LEVEL`](super::prompts::MAX_LEVEL)) and the call is repeated, for
//! `1 + condensation_retries` attempts in total.
//!
//! When the budget runs out, the last attempt decides:
//!
//! | Last attempt | Result |
//! |---|---|
//! | valid but not smaller | accepted as is ([`CondenseOutcome::Grew`]) |
//! | degenerate | original log kept ([`FallbackReason::Degenerate`]) |
//! | zero entries | original log kept ([`FallbackReason::StructurallyEmpty`]) |
//! | error or null | original log kept ([`FallbackReason::NoResult`]) |
//!
//! The returned log is therefore never empty unless the input was.

use super::capability::Compressor;
use super::prompts::{MAX_LEVEL, condensation_request};
use crate::config::ObserverConfig;
use crate::context::{estimate_log, is_degenerate};
use crate::memory::{ObservationGroup, is_structurally_empty, render_observations};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Degenerate,
    StructurallyEmpty,
    NoResult,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Degenerate => write!(f, "degenerate output"),
            FallbackReason::StructurallyEmpty => write!(f, "structurally empty output"),
            FallbackReason::NoResult => write!(f, "no result"),
        }
    }
}

/// How a condensation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondenseOutcome {
    /// Output was smaller than the input.
    Shrunk { level: u8, attempts: u32 },
    /// Budget exhausted; the last valid output was accepted without shrinking.
    Grew { level: u8, attempts: u32 },
    /// Budget exhausted; the original log was kept.
    FellBack {
        reason: FallbackReason,
        attempts: u32,
    },
    /// Empty input, nothing to do.
    Skipped,
}

impl CondenseOutcome {
    /// The original log was kept because the output could not be trusted.
    pub fn is_fallback(&self) -> bool {
        matches!(self, CondenseOutcome::FellBack { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            CondenseOutcome::Shrunk { attempts, .. }
            | CondenseOutcome::Grew { attempts, .. }
            | CondenseOutcome::FellBack { attempts, .. } => *attempts,
            CondenseOutcome::Skipped => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Condensation {
    pub observations: Vec<ObservationGroup>,
    pub outcome: CondenseOutcome,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

enum Attempt {
    Valid(Vec<ObservationGroup>, usize),
    Rejected(FallbackReason),
}

/// Condense `log`, escalating guidance until the output shrinks.
pub async fn condense_with_escalation(
    compressor: &dyn Compressor,
    log: &[ObservationGroup],
    config: &ObserverConfig,
) -> Condensation {
    let input_tokens = estimate_log(log);
    if is_structurally_empty(log) {
        return Condensation {
            observations: log.to_vec(),
            outcome: CondenseOutcome::Skipped,
            input_tokens,
            output_tokens: input_tokens,
        };
    }

    let max_attempts = config.condensation_retries + 1;
    let mut level: u8 = 0;
    let mut last = Attempt::Rejected(FallbackReason::NoResult);
    let mut last_level = level;

    for attempt in 1..=max_attempts {
        let request = condensation_request(log, level, config);
        if config.debug {
            debug!("Condensation prompt (level {level}):\n{}", request.prompt);
        }

        last_level = level;
        last = match compressor.condense(request).await {
            Ok(Some(output)) => {
                let rendered = render_observations(&output.observations);
                if is_structurally_empty(&output.observations) {
                    Attempt::Rejected(FallbackReason::StructurallyEmpty)
                } else if is_degenerate(&rendered) {
                    Attempt::Rejected(FallbackReason::Degenerate)
                } else {
                    let tokens = estimate_log(&output.observations);
                    if tokens < input_tokens {
                        info!(
                            "Condensed observation log at level {level}: ~{input_tokens} -> ~{tokens} tokens ({attempt} attempt(s))"
                        );
                        return Condensation {
                            observations: output.observations,
                            outcome: CondenseOutcome::Shrunk {
                                level,
                                attempts: attempt,
                            },
                            input_tokens,
                            output_tokens: tokens,
                        };
                    }
                    debug!(
                        "Condensation level {level} did not shrink the log (~{tokens} >= ~{input_tokens} tokens)"
                    );
                    Attempt::Valid(output.observations, tokens)
                }
            }
            Ok(None) => Attempt::Rejected(FallbackReason::NoResult),
            Err(e) => {
                warn!("Condensation attempt {attempt}/{max_attempts} failed: {e}");
                Attempt::Rejected(FallbackReason::NoResult)
            }
        };

        if let Attempt::Rejected(reason) = &last {
            warn!("Condensation attempt {attempt}/{max_attempts} rejected: {reason}");
        }
        level = (level + 1).min(MAX_LEVEL);
    }

    match last {
        Attempt::Valid(observations, tokens) => {
            info!(
                "Condensation budget exhausted; accepting level {last_level} output (~{tokens} tokens, input ~{input_tokens})"
            );
            Condensation {
                observations,
                outcome: CondenseOutcome::Grew {
                    level: last_level,
                    attempts: max_attempts,
                },
                input_tokens,
                output_tokens: tokens,
            }
        }
        Attempt::Rejected(reason) => {
            warn!("Condensation budget exhausted ({reason}); keeping the original log");
            Condensation {
                observations: log.to_vec(),
                outcome: CondenseOutcome::FellBack {
                    reason,
                    attempts: max_attempts,
                },
                input_tokens,
                output_tokens: input_tokens,
            }
        }
    }
}
