//! Extraction with bounded retry.

use super::capability::{Compressor, ExtractionOutput, ExtractionRequest};
use crate::context::is_degenerate;
use crate::error::MemoryError;
use crate::memory::{is_structurally_empty, render_observations};
use tracing::{debug, warn};

/// Call extraction up to `1 + max_retries` times.
///
/// Capability errors, null results, structurally empty output and
/// degenerate output all count as a failed attempt. The error of the last
/// attempt is returned when every attempt fails.
pub async fn extract_observations(
    compressor: &dyn Compressor,
    request: &ExtractionRequest,
    max_retries: u32,
) -> Result<ExtractionOutput, MemoryError> {
    let attempts = max_retries + 1;
    let mut last_error = MemoryError::NoResult;

    for attempt in 1..=attempts {
        let error = match compressor.extract(request.clone()).await {
            Ok(Some(output)) => match check_output(&output) {
                Ok(()) => {
                    debug!(
                        "Extraction attempt {attempt}/{attempts} produced {} group(s)",
                        output.observations.len()
                    );
                    return Ok(output);
                }
                Err(e) => e,
            },
            Ok(None) => MemoryError::NoResult,
            Err(e) => MemoryError::Capability(e),
        };

        warn!("Extraction attempt {attempt}/{attempts} failed: {error}");
        last_error = error;
    }

    Err(last_error)
}

fn check_output(output: &ExtractionOutput) -> Result<(), MemoryError> {
    if is_structurally_empty(&output.observations) {
        return Err(MemoryError::StructurallyEmpty);
    }
    if is_degenerate(&render_observations(&output.observations)) {
        return Err(MemoryError::Degenerate);
    }
    Ok(())
}
