use pagepilot_core_types::{AccountId, CoreError, JobId};
use pagepilot_event_bus::BusError;
use thiserror::Error;

use crate::model::JobStatus;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("account {account} already has job {job} queued or running")]
    AccountBusy { account: AccountId, job: JobId },
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("job {job} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("event bus: {0}")]
    Bus(#[from] BusError),
}

impl From<SchedulerError> for CoreError {
    fn from(value: SchedulerError) -> Self {
        CoreError::new(value.to_string())
    }
}
