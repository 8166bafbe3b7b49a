//! Configuration for the [`Observer`](crate::pipeline::Observer).
//!
//! Every field has a working default; override through struct fields or the
//! builder methods.
//!
//! ```ignore
//! let config = ObserverConfig::default()
//!     .with_primary_threshold(20_000)
//!     .with_prefetch_fraction(0.25)
//!     .with_model("google/gemini-2.5-flash");
//! ```
//!
//! [`ObserverConfig::from_env()`] overlays `RECOLLECT_*` environment variables
//! on the defaults. Malformed values are logged and ignored.

use std::path::PathBuf;
use tracing::warn;

/// Token estimate at which raw messages must be folded into observations.
pub const DEFAULT_PRIMARY_THRESHOLD: usize = 30_000;

/// Token estimate at which the observation log itself is condensed.
pub const DEFAULT_REFLECTION_THRESHOLD: usize = 40_000;

/// Fraction of the primary threshold at which a background job starts early.
pub const DEFAULT_PREFETCH_FRACTION: f64 = 0.2;

/// Retries after the first extraction attempt.
pub const DEFAULT_EXTRACTION_RETRIES: u32 = 2;

/// Retries after the first condensation attempt (4 attempts total).
pub const DEFAULT_CONDENSATION_RETRIES: u32 = 3;

const DEFAULT_STORAGE_DIR: &str = ".recollect/sessions";

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Unobserved-token estimate at which a finished background result is
    /// spliced into the live sequence. Default: `30_000`.
    pub primary_threshold: usize,
    /// Observation-log token estimate at which condensation runs.
    /// Default: `40_000`.
    pub reflection_threshold: usize,
    /// Fraction of `primary_threshold` that launches a background job.
    /// Default: `0.2`.
    pub prefetch_fraction: f64,
    /// Model override for the compression capability. `None` lets the
    /// capability pick its own default.
    pub model: Option<String>,
    /// Extra instruction text appended to every compression system prompt.
    pub instructions: Option<String>,
    /// Directory holding one JSON file per session.
    pub storage_dir: PathBuf,
    /// Log full prompts and raw capability output at DEBUG level.
    pub debug: bool,
    /// Retries after the first extraction attempt. Default: `2`.
    pub extraction_retries: u32,
    /// Retries after the first condensation attempt. Default: `3`.
    pub condensation_retries: u32,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            primary_threshold: DEFAULT_PRIMARY_THRESHOLD,
            reflection_threshold: DEFAULT_REFLECTION_THRESHOLD,
            prefetch_fraction: DEFAULT_PREFETCH_FRACTION,
            model: None,
            instructions: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            debug: false,
            extraction_retries: DEFAULT_EXTRACTION_RETRIES,
            condensation_retries: DEFAULT_CONDENSATION_RETRIES,
        }
    }
}

impl ObserverConfig {
    pub fn with_primary_threshold(mut self, tokens: usize) -> Self {
        self.primary_threshold = tokens;
        self
    }

    pub fn with_reflection_threshold(mut self, tokens: usize) -> Self {
        self.reflection_threshold = tokens;
        self
    }

    pub fn with_prefetch_fraction(mut self, fraction: f64) -> Self {
        self.prefetch_fraction = fraction;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Token estimate at which a background job is launched.
    ///
    /// `ceil(primary_threshold × prefetch_fraction)`, with the fraction
    /// clamped to `0.0..=1.0`.
    pub fn prefetch_threshold(&self) -> usize {
        let fraction = if self.prefetch_fraction.is_finite() {
            self.prefetch_fraction.clamp(0.0, 1.0)
        } else {
            DEFAULT_PREFETCH_FRACTION
        };
        (self.primary_threshold as f64 * fraction).ceil() as usize
    }

    /// Defaults overlaid with `RECOLLECT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    ///
    /// Recognized keys: `RECOLLECT_PRIMARY_THRESHOLD`,
    /// `RECOLLECT_REFLECTION_THRESHOLD`, `RECOLLECT_PREFETCH_FRACTION`,
    /// `RECOLLECT_MODEL`, `RECOLLECT_INSTRUCTIONS`, `RECOLLECT_STORAGE_DIR`,
    /// `RECOLLECT_DEBUG`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "RECOLLECT_PRIMARY_THRESHOLD") {
            config.primary_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RECOLLECT_REFLECTION_THRESHOLD") {
            config.reflection_threshold = v;
        }
        if let Some(v) = parse_var::<f64>(&lookup, "RECOLLECT_PREFETCH_FRACTION") {
            config.prefetch_fraction = v;
        }
        if let Some(v) = lookup("RECOLLECT_MODEL").filter(|s| !s.trim().is_empty()) {
            config.model = Some(v);
        }
        if let Some(v) = lookup("RECOLLECT_INSTRUCTIONS").filter(|s| !s.trim().is_empty()) {
            config.instructions = Some(v);
        }
        if let Some(v) = lookup("RECOLLECT_STORAGE_DIR").filter(|s| !s.trim().is_empty()) {
            config.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECOLLECT_DEBUG") {
            config.debug = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring malformed {key}={raw:?}");
            None
        }
    }
}
