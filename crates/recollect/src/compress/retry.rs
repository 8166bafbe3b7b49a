//! Backoff for compression calls that fail for reasons worth waiting out.
//!
//! [`OpenRouterCompressor`](super::OpenRouterCompressor) reports failures as
//! strings built from the prefixes below. [`classify`] reads them back: an
//! HTTP status is judged by its code, a transport failure by its cause, and
//! an error object in a 200 body by its message. Rate limits wait the full
//! [`RetryConfig::max_delay`] since the provider asked us to back off.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Non-2xx reply: `"{HTTP_ERROR_PREFIX}{status}: {body}"`.
pub(crate) const HTTP_ERROR_PREFIX: &str = "OpenRouter API HTTP ";
/// Error object inside a 2xx reply: `"{API_ERROR_PREFIX}{message}"`.
pub(crate) const API_ERROR_PREFIX: &str = "OpenRouter API error: ";
/// The request never got a reply: `"{REQUEST_FAILED_PREFIX}{cause}"`.
pub(crate) const REQUEST_FAILED_PREFIX: &str = "request failed: ";

/// How a failed compression call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// 429, or the provider said so in the body.
    RateLimited,
    /// Timeouts, dropped connections, 408 and 5xx.
    Transient,
    /// Anything else, including bad keys, unknown models and parse failures.
    Permanent,
}

/// Read a compressor error string back into a [`Failure`].
pub fn classify(error: &str) -> Failure {
    if let Some(status) = http_status(error) {
        return match status {
            429 => Failure::RateLimited,
            408 | 500..=599 => Failure::Transient,
            _ => Failure::Permanent,
        };
    }

    if let Some(cause) = error.strip_prefix(REQUEST_FAILED_PREFIX) {
        let cause = cause.to_lowercase();
        let transient = ["timed out", "timeout", "connection", "broken pipe", "dns"]
            .iter()
            .any(|p| cause.contains(p));
        return if transient {
            Failure::Transient
        } else {
            Failure::Permanent
        };
    }

    if let Some(message) = error.strip_prefix(API_ERROR_PREFIX) {
        let message = message.to_lowercase();
        if message.contains("rate limit") {
            return Failure::RateLimited;
        }
        if message.contains("overloaded") || message.contains("timeout") {
            return Failure::Transient;
        }
    }

    Failure::Permanent
}

/// Status code of an HTTP failure. reqwest prints statuses as
/// `"429 Too Many Requests"`, so only the leading digits are read.
fn http_status(error: &str) -> Option<u16> {
    let rest = error.strip_prefix(HTTP_ERROR_PREFIX)?;
    let digits = rest.split(|c: char| !c.is_ascii_digit()).next()?;
    digits.parse().ok()
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first call (0 = fail on the first error).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Shorten each delay by a fixed per-attempt factor so sessions that
    /// failed together do not retry together.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Wait before retry number `attempt` (0-indexed), or `None` when the
    /// failure is not retried at all.
    pub fn delay_for(&self, attempt: u32, failure: Failure) -> Option<Duration> {
        let capped = match failure {
            Failure::Permanent => return None,
            Failure::RateLimited => self.max_delay.as_secs_f64(),
            Failure::Transient => (self.initial_delay.as_secs_f64()
                * self.multiplier.powi(attempt as i32))
            .min(self.max_delay.as_secs_f64()),
        };
        let factor = match (self.jitter, attempt % 4) {
            (false, _) => 1.0,
            (true, 0) => 0.75,
            (true, 1) => 0.90,
            (true, 2) => 0.60,
            (true, _) => 0.85,
        };
        Some(Duration::from_secs_f64(capped * factor))
    }
}

/// Run `call` until it succeeds, fails permanently, or the retry budget is
/// spent.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut attempt = 0;
    loop {
        let error = match call().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if attempt >= config.max_retries {
            return Err(error);
        }
        let failure = classify(&error);
        let Some(delay) = config.delay_for(attempt, failure) else {
            return Err(error);
        };
        warn!(
            "Compression call failed ({failure:?}, attempt {}/{}): {error}. Retrying in {delay:?}",
            attempt + 1,
            config.max_retries,
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
