use std::collections::HashSet;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use pagepilot_core_types::UNKNOWN_STATE;

use crate::errors::PerceiverError;

fn default_should_exist() -> bool {
    true
}

fn default_min_count() -> usize {
    1
}

/// One weighted presence/absence vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub selector: String,
    pub weight: f64,
    #[serde(default = "default_should_exist")]
    pub should_exist: bool,
    #[serde(default = "default_min_count")]
    pub min_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_text: Option<String>,
    /// ISO 639-1 (`en`) or 639-3 (`eng`) language code the element text must be written in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_text_language: Option<String>,
}

impl Check {
    pub fn present(selector: impl Into<String>, weight: f64) -> Self {
        Self {
            selector: selector.into(),
            weight,
            should_exist: true,
            min_count: 1,
            contains_text: None,
            require_text_language: None,
        }
    }

    pub fn absent(selector: impl Into<String>, weight: f64) -> Self {
        Self {
            should_exist: false,
            ..Self::present(selector, weight)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contains_text = Some(text.into());
        self
    }

    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.require_text_language = Some(code.into());
        self
    }
}

/// A named page/state fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_url_substring: Option<String>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_url_substring: None,
            checks: Vec::new(),
        }
    }

    pub fn with_url(mut self, substring: impl Into<String>) -> Self {
        self.required_url_substring = Some(substring.into());
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn applies_to(&self, url: &str) -> bool {
        self.required_url_substring
            .as_deref()
            .map_or(true, |needle| url.contains(needle))
    }
}

#[derive(Clone, Debug)]
pub(crate) struct CompiledCheck {
    pub spec: Check,
    pub selector: Selector,
    pub text_lower: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct CompiledSignature {
    pub signature: Signature,
    pub checks: Vec<CompiledCheck>,
}

/// Immutable, ordered collection of signatures with pre-parsed selectors.
///
/// Order matters: ties go to the first signature and a perfect match stops
/// the scan, so cheaper or likelier signatures should come first.
#[derive(Clone, Debug, Default)]
pub struct SignatureSet {
    pub(crate) entries: Vec<CompiledSignature>,
}

impl SignatureSet {
    pub fn new(signatures: Vec<Signature>) -> Result<Self, PerceiverError> {
        let mut entries = Vec::with_capacity(signatures.len());
        let mut seen = HashSet::with_capacity(signatures.len());
        for signature in signatures {
            if signature.name.trim().is_empty() {
                return Err(PerceiverError::invalid("<unnamed>", "empty signature name"));
            }
            if signature.name == UNKNOWN_STATE {
                return Err(PerceiverError::invalid(
                    &signature.name,
                    "name is reserved for unclassified pages",
                ));
            }
            if !seen.insert(signature.name.clone()) {
                return Err(PerceiverError::invalid(&signature.name, "duplicate signature name"));
            }
            let mut checks = Vec::with_capacity(signature.checks.len());
            for check in &signature.checks {
                if !check.weight.is_finite() || check.weight <= 0.0 {
                    return Err(PerceiverError::invalid(
                        &signature.name,
                        format!("check `{}` has non-positive weight", check.selector),
                    ));
                }
                let selector = Selector::parse(&check.selector).map_err(|err| {
                    PerceiverError::invalid(
                        &signature.name,
                        format!("bad selector `{}`: {err:?}", check.selector),
                    )
                })?;
                checks.push(CompiledCheck {
                    spec: check.clone(),
                    selector,
                    text_lower: check.contains_text.as_ref().map(|t| t.to_lowercase()),
                });
            }
            entries.push(CompiledSignature { signature, checks });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.signature.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.entries
            .iter()
            .map(|e| &e.signature)
            .find(|sig| sig.name == name)
    }
}

/// Confidence computed for one evaluated signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignatureScore {
    pub name: String,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub name: String,
    pub score: f64,
    /// Signatures evaluated during this call, in evaluation order.
    #[serde(default)]
    pub scored: Vec<SignatureScore>,
}

impl ClassificationResult {
    pub fn unknown(score: f64, scored: Vec<SignatureScore>) -> Self {
        Self {
            name: UNKNOWN_STATE.to_string(),
            score,
            scored,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_STATE
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}
