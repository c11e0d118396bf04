use std::sync::Arc;

use async_trait::async_trait;
use pagepilot_core_types::{AccountId, CoreError, JobId, SessionId};
use tokio_util::sync::CancellationToken;

use crate::model::{Job, Parameters};

/// A live browser session owned by exactly one running job.
#[async_trait]
pub trait BrowserSession: Send + Sync + 'static {
    fn id(&self) -> &SessionId;

    /// Tears the session down. Must be idempotent and must interrupt any
    /// page operation still waiting on this session.
    async fn close(&self) -> Result<(), CoreError>;
}

/// Opens a browser session for a job (proxy, profile and so on come from
/// the job's parameters).
#[async_trait]
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: BrowserSession;

    async fn launch(&self, job: &Job) -> Result<Self::Session, CoreError>;
}

/// Runs one automation inside an already opened session.
///
/// `Ok` carries the completion message. `Err(CoreError::Cancelled)` after a
/// stop request marks the job Stopped; any other error marks it Failed.
#[async_trait]
pub trait JobRunner<S>: Send + Sync + 'static
where
    S: BrowserSession,
{
    async fn run(&self, session: &S, ctx: JobContext) -> Result<String, CoreError>;
}

#[async_trait]
impl<S, R> JobRunner<S> for Arc<R>
where
    S: BrowserSession,
    R: JobRunner<S> + ?Sized,
{
    async fn run(&self, session: &S, ctx: JobContext) -> Result<String, CoreError> {
        (**self).run(session, ctx).await
    }
}

pub(crate) trait ProgressSink: Send + Sync {
    fn report(&self, job: &JobId, percent: u8, message: Option<String>);
}

/// Handle a runner uses to publish `progress` events for its job.
#[derive(Clone)]
pub struct ProgressReporter {
    job: JobId,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressReporter {
    pub(crate) fn new(job: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job,
            sink: Some(sink),
        }
    }

    /// Reporter that discards everything; for running automations outside a
    /// scheduler.
    pub fn detached(job: JobId) -> Self {
        Self { job, sink: None }
    }

    pub fn report(&self, percent: u8, message: Option<String>) {
        if let Some(sink) = &self.sink {
            sink.report(&self.job, percent.min(100), message);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job", &self.job)
            .field("attached", &self.sink.is_some())
            .finish()
    }
}

/// Everything a runner gets to know about the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub account: AccountId,
    pub automation: String,
    pub parameters: Parameters,
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl JobContext {
    pub fn new(job: &Job, cancel: CancellationToken, progress: ProgressReporter) -> Self {
        Self {
            job_id: job.id.clone(),
            account: job.account_id.clone(),
            automation: job.automation_name.clone(),
            parameters: job.parameters.clone(),
            cancel,
            progress,
        }
    }

    /// Cooperative stop flag, cancelled by `stop`/`stop_all` and timeouts.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn report_progress(&self, percent: u8, message: Option<String>) {
        self.progress.report(percent, message);
    }
}
