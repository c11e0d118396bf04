use std::time::Duration;

use tracing::debug;

use crate::model::ClassificationResult;

pub fn emit_classification(url: &str, result: &ClassificationResult, duration: Duration) {
    debug!(
        target: "perceiver.events",
        url,
        state = %result.name,
        score = result.score,
        evaluated = result.scored.len(),
        elapsed_us = duration.as_micros() as u64,
        "signature.classify.completed"
    );
}
