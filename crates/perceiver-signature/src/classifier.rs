use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::PerceiverError;
use crate::events;
use crate::judges::judge_signature;
use crate::model::{ClassificationResult, SignatureScore, SignatureSet};
use crate::ports::PagePort;
use crate::snapshot::{FlattenedSnapshot, PageCapture};

/// Hand-tuned default; kept configurable rather than derived.
pub const DEFAULT_THRESHOLD: f64 = 0.70;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum confidence for a signature to be reported instead of `unknown`.
    pub threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Scores a fresh page snapshot against an ordered [`SignatureSet`].
#[derive(Clone, Debug)]
pub struct SignatureClassifier {
    signatures: Arc<SignatureSet>,
    config: ClassifierConfig,
}

impl SignatureClassifier {
    pub fn new(signatures: SignatureSet, config: ClassifierConfig) -> Self {
        Self::shared(Arc::new(signatures), config)
    }

    pub fn shared(signatures: Arc<SignatureSet>, config: ClassifierConfig) -> Self {
        Self { signatures, config }
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify an already flattened snapshot taken at `url`.
    pub fn classify(&self, snapshot: &FlattenedSnapshot, url: &str) -> ClassificationResult {
        let mut scored = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        for entry in &self.signatures.entries {
            let signature = &entry.signature;
            if !signature.applies_to(url) {
                trace!(signature = %signature.name, "skipped by url filter");
                continue;
            }

            let confidence = judge_signature(snapshot, entry).confidence();
            trace!(signature = %signature.name, confidence, "signature scored");
            scored.push(SignatureScore {
                name: signature.name.clone(),
                confidence,
            });

            if confidence >= 1.0 {
                return ClassificationResult {
                    name: signature.name.clone(),
                    score: 1.0,
                    scored,
                };
            }
            if best.map_or(true, |(_, top)| confidence > top) {
                best = Some((scored.len() - 1, confidence));
            }
        }

        match best {
            Some((idx, confidence)) if confidence >= self.config.threshold => {
                ClassificationResult {
                    name: scored[idx].name.clone(),
                    score: confidence,
                    scored,
                }
            }
            Some((_, confidence)) => ClassificationResult::unknown(confidence, scored),
            None => ClassificationResult::unknown(0.0, scored),
        }
    }

    /// Flatten a raw capture once and classify it.
    pub fn classify_capture(&self, capture: &PageCapture, url: &str) -> ClassificationResult {
        let started = Instant::now();
        let snapshot = FlattenedSnapshot::from_capture(capture);
        let result = self.classify(&snapshot, url);
        events::emit_classification(url, &result, started.elapsed());
        result
    }

    /// Take one capture of the live page and classify it.
    pub async fn classify_page(
        &self,
        page: &dyn PagePort,
    ) -> Result<ClassificationResult, PerceiverError> {
        let capture = page.capture().await?;
        let url = if capture.url.is_empty() {
            page.current_url().await?
        } else {
            capture.url.clone()
        };
        Ok(self.classify_capture(&capture, &url))
    }
}
