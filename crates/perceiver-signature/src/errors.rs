use pagepilot_core_types::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PerceiverError {
    #[error("invalid signature {name}: {reason}")]
    InvalidSignature { name: String, reason: String },
    #[error("page capture failed: {0}")]
    Capture(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("{action} timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },
    #[error("browser session closed")]
    SessionClosed,
    #[error("internal error: {0}")]
    Internal(String),
}

impl PerceiverError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures are worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ElementNotFound(_) | Self::Timeout { .. })
    }
}

impl From<PerceiverError> for CoreError {
    fn from(value: PerceiverError) -> Self {
        CoreError::new(value.to_string())
    }
}
