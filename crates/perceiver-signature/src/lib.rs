//! Page/state classification by weighted signature scoring.
//!
//! A [`SignatureSet`] is a list of named, weighted presence/absence checks.
//! [`SignatureClassifier`] evaluates every applicable signature against one
//! flattened DOM snapshot and returns the best match above the configured
//! confidence threshold, or [`UNKNOWN_STATE`].

pub mod classifier;
pub mod errors;
pub mod events;
pub mod judges;
pub mod language;
pub mod model;
pub mod ports;
pub mod snapshot;

pub use classifier::{ClassifierConfig, SignatureClassifier, DEFAULT_THRESHOLD};
pub use errors::PerceiverError;
pub use model::{Check, ClassificationResult, Signature, SignatureScore, SignatureSet};
pub use pagepilot_core_types::UNKNOWN_STATE;
pub use ports::PagePort;
pub use snapshot::{FlattenedSnapshot, PageCapture, ShadowRootCapture};
