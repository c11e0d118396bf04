//! Job scheduling for browser automations.
//!
//! [`Scheduler`] admits at most one in-flight job per account, runs up to a
//! configured number of jobs concurrently in FIFO order, owns one browser
//! session per running job and broadcasts lifecycle [`JobEvent`]s.

pub mod api;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod runtime;

pub use api::JobControl;
pub use error::SchedulerError;
pub use executor::{BrowserSession, JobContext, JobRunner, ProgressReporter, SessionLauncher};
pub use metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
pub use model::{
    Job, JobEvent, JobEventKind, JobStatus, Parameters, SchedulerConfig, SchedulerSnapshot,
};
pub use orchestrator::Scheduler;
