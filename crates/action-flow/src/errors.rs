//! Flow execution error types

use pagepilot_core_types::CoreError;
use perceiver_signature::PerceiverError;
use thiserror::Error;

/// Failures that escape a flow instead of resolving to a [`crate::FlowOutcome`].
#[derive(Debug, Error)]
pub enum FlowError {
    /// The cooperative cancellation token fired
    #[error("flow cancelled")]
    Cancelled,

    /// The browser session went away underneath the flow
    #[error("browser session closed")]
    SessionClosed,

    /// Page capability failed in a way retries cannot fix
    #[error("page error: {0}")]
    Page(PerceiverError),

    /// A state handler failed while reacting to a deviation
    #[error("handler for state {state} failed: {reason}")]
    Handler { state: String, reason: String },

    /// Invalid flow structure
    #[error("invalid flow structure: {0}")]
    InvalidStructure(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowError {
    pub fn handler(state: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handler {
            state: state.into(),
            reason: reason.into(),
        }
    }

    /// Cancellation and forced session teardown both mean the job was stopped.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::SessionClosed)
    }
}

impl From<PerceiverError> for FlowError {
    fn from(err: PerceiverError) -> Self {
        match err {
            PerceiverError::SessionClosed => FlowError::SessionClosed,
            other => FlowError::Page(other),
        }
    }
}

impl From<FlowError> for CoreError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Cancelled => CoreError::Cancelled,
            other => CoreError::new(other.to_string()),
        }
    }
}
