//! Application-level errors
//!
//! Engine crates keep their own error enums; this one wraps them at the
//! application boundary and adds configuration and automation failures.

use action_flow::FlowError;
use pagepilot_core_types::CoreError;
use pagepilot_scheduler::SchedulerError;
use perceiver_signature::PerceiverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PagePilotError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown automation '{0}'")]
    UnknownAutomation(String),

    #[error("invalid job parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Perceiver(#[from] PerceiverError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PagePilotError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }
}

impl From<serde_json::Error> for PagePilotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PagePilotError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<PagePilotError> for CoreError {
    fn from(err: PagePilotError) -> Self {
        match err {
            PagePilotError::Flow(flow) => flow.into(),
            other => CoreError::new(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PagePilotError>;
