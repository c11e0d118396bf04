use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use pagepilot_core_types::{AccountId, CoreError, JobId};
use pagepilot_event_bus::{EventBus, InMemoryBus};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::executor::{
    BrowserSession, JobContext, JobRunner, ProgressReporter, ProgressSink, SessionLauncher,
};
use crate::metrics::{SchedulerMetrics, SchedulerMetricsSnapshot};
use crate::model::{
    Job, JobEvent, JobEventKind, JobStatus, Parameters, SchedulerConfig, SchedulerSnapshot,
};
use crate::runtime::{SchedulerState, StopTarget};

/// How a worker's job ended.
struct Terminal {
    status: JobStatus,
    message: String,
    error: Option<String>,
}

impl Terminal {
    fn completed(message: String) -> Self {
        Self {
            status: JobStatus::Completed,
            message,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: JobStatus::Failed,
            message: error.clone(),
            error: Some(error),
        }
    }

    fn stopped(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Stopped,
            message: message.into(),
            error: None,
        }
    }
}

struct Inner<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    config: SchedulerConfig,
    launcher: Arc<L>,
    runner: Arc<R>,
    state: Mutex<SchedulerState<L::Session>>,
    bus: InMemoryBus<JobEvent>,
    metrics: SchedulerMetrics,
}

/// Bounded-concurrency FIFO job scheduler.
///
/// Cloning is cheap and every clone drives the same instance. Submission,
/// dispatch, status changes and event publication are serialized through one
/// lock, so a snapshot taken together with `subscribe` plus the events that
/// follow always reconstructs later state.
pub struct Scheduler<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    inner: Arc<Inner<L, R>>,
}

impl<L, R> Clone for Scheduler<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L, R> Scheduler<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    pub fn new(config: SchedulerConfig, launcher: Arc<L>, runner: Arc<R>) -> Self {
        let config = SchedulerConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        let inner = Inner {
            state: Mutex::new(SchedulerState::new(config.history_limit)),
            bus: InMemoryBus::with_capacity(config.event_buffer),
            metrics: SchedulerMetrics::default(),
            config,
            launcher,
            runner,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queues a job and dispatches right away if a slot is free. Rejected
    /// while the account already has a queued or running job.
    pub async fn submit(
        &self,
        account: AccountId,
        automation: impl Into<String>,
        parameters: Parameters,
    ) -> Result<Job, SchedulerError> {
        let job = Job::new(account, automation, parameters);
        {
            let mut state = self.inner.state.lock();
            if let Err(err) = state.enqueue(job.clone()) {
                self.inner.metrics.record_rejected();
                debug!(target: "scheduler", account = %job.account_id, "submit rejected: {err}");
                return Err(err);
            }
            self.inner.emit(&state, JobEventKind::Queued, &job);
        }
        self.inner.metrics.record_submitted();
        info!(
            target: "scheduler",
            job = %job.id,
            account = %job.account_id,
            automation = %job.automation_name,
            "job queued"
        );
        Inner::dispatch(&self.inner)?;
        Ok(job)
    }

    /// Stops a job. Queued jobs are dropped without ever running; running
    /// jobs get their token cancelled and their session force-closed and
    /// become Stopped once the worker exits. Returns false when the job was
    /// already stopping or finished.
    ///
    /// Finished jobs are only known while they are in the completed history
    /// (`history_limit` entries). Once trimmed out their id is reported as
    /// [`SchedulerError::JobNotFound`], same as an id never issued.
    pub async fn stop(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let target = {
            let mut state = self.inner.state.lock();
            let target = state.request_stop(id)?;
            if let StopTarget::Dequeued(job) = &target {
                self.inner.emit(&state, JobEventKind::Stopped, job);
            }
            target
        };
        match target {
            StopTarget::Dequeued(job) => {
                self.inner.metrics.record_stopped();
                info!(target: "scheduler", job = %job.id, "queued job stopped");
                Ok(true)
            }
            StopTarget::Running { cancel, session } => {
                info!(target: "scheduler", job = %id, "stopping running job");
                interrupt(cancel, session).await;
                Ok(true)
            }
            StopTarget::Settled => Ok(false),
        }
    }

    /// Stops every queued and running job; returns how many were affected.
    pub async fn stop_all(&self) -> Result<usize, SchedulerError> {
        let (dequeued, running) = {
            let mut state = self.inner.state.lock();
            let (dequeued, running) = state.request_stop_all()?;
            for job in &dequeued {
                self.inner.emit(&state, JobEventKind::Stopped, job);
            }
            (dequeued, running)
        };
        for _ in &dequeued {
            self.inner.metrics.record_stopped();
        }
        let count = dequeued.len() + running.len();
        for (cancel, session) in running {
            interrupt(cancel, session).await;
        }
        info!(target: "scheduler", count, "stop_all issued");
        Ok(count)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Snapshot plus a stream of every event published after it.
    pub fn subscribe(
        &self,
    ) -> Result<(SchedulerSnapshot, mpsc::Receiver<JobEvent>), SchedulerError> {
        let state = self.inner.state.lock();
        let receiver = self.inner.bus.subscribe()?;
        Ok((state.snapshot(), receiver))
    }

    pub fn metrics(&self) -> SchedulerMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running_count()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queued_count()
    }
}

impl<L, R> Inner<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    /// Publishes while the caller holds the state lock.
    fn emit(&self, _state: &SchedulerState<L::Session>, kind: JobEventKind, job: &Job) {
        let event = JobEvent {
            kind,
            job: job.clone(),
        };
        if let Err(err) = self.bus.publish(event) {
            warn!(target: "scheduler", "event dropped: {err}");
        }
    }

    fn dispatch(this: &Arc<Self>) -> Result<(), SchedulerError> {
        let mut launched = Vec::new();
        {
            let mut state = this.state.lock();
            while let Some((job, cancel)) = state.start_next(this.config.concurrency)? {
                this.emit(&state, JobEventKind::Started, &job);
                launched.push((job, cancel));
            }
        }
        for (job, cancel) in launched {
            this.metrics.record_started();
            info!(target: "scheduler", job = %job.id, account = %job.account_id, "job started");
            let inner = Arc::clone(this);
            tokio::spawn(async move {
                let id = job.id.clone();
                let terminal = match AssertUnwindSafe(inner.execute(job, cancel))
                    .catch_unwind()
                    .await
                {
                    Ok(terminal) => terminal,
                    Err(panic) => {
                        let reason = panic_reason(panic.as_ref());
                        warn!(target: "scheduler", job = %id, "worker panicked: {reason}");
                        Terminal::failed(format!("worker panicked: {reason}"))
                    }
                };
                inner.complete(&id, terminal);
            });
        }
        Ok(())
    }

    async fn execute(self: &Arc<Self>, job: Job, cancel: CancellationToken) -> Terminal {
        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Terminal::stopped("stopped before session start"),
            launched = self.launcher.launch(&job) => launched,
        };
        let session = match launched {
            Ok(session) => Arc::new(session),
            Err(err) => {
                warn!(target: "scheduler", job = %job.id, "session launch failed: {err}");
                return Terminal::failed(format!("browser session failed to start: {err}"));
            }
        };
        debug!(target: "scheduler", job = %job.id, session = %session.id(), "session opened");

        let registered = self.state.lock().register_session(&job.id, Arc::clone(&session));
        let terminal = if registered {
            self.run_in_session(&job, &session, cancel).await
        } else {
            Terminal::stopped("stopped before run")
        };

        close_session(session.as_ref()).await;
        terminal
    }

    async fn run_in_session(
        self: &Arc<Self>,
        job: &Job,
        session: &Arc<L::Session>,
        cancel: CancellationToken,
    ) -> Terminal {
        let sink: Arc<dyn ProgressSink> = Arc::clone(self) as Arc<dyn ProgressSink>;
        let progress = ProgressReporter::new(job.id.clone(), sink);
        let ctx = JobContext::new(job, cancel.clone(), progress);
        let run = AssertUnwindSafe(self.runner.run(session.as_ref(), ctx)).catch_unwind();
        tokio::pin!(run);

        let deadline = self.config.job_timeout.map(|timeout| Instant::now() + timeout);
        let timeout = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timeout);

        enum Interrupt {
            Stop,
            Timeout,
        }

        let interrupt = tokio::select! {
            biased;
            finished = &mut run => return settle(job, finished, &cancel),
            _ = cancel.cancelled() => Interrupt::Stop,
            _ = &mut timeout => Interrupt::Timeout,
        };

        // let the runner unwind on its own before dropping it
        cancel.cancel();
        close_session(session.as_ref()).await;
        if tokio::time::timeout(self.config.stop_grace, &mut run).await.is_err() {
            warn!(target: "scheduler", job = %job.id, "runner ignored cancellation, dropped");
        }

        match interrupt {
            Interrupt::Stop => Terminal::stopped("stopped by request"),
            Interrupt::Timeout => {
                let secs = self.config.job_timeout.map(|t| t.as_secs()).unwrap_or_default();
                Terminal::failed(format!("job timed out after {secs}s"))
            }
        }
    }

    fn complete(self: &Arc<Self>, id: &JobId, terminal: Terminal) {
        let status = terminal.status;
        {
            let mut state = self.state.lock();
            match state.finish(id, terminal.status, terminal.message, terminal.error) {
                Ok(job) => {
                    if let Some(kind) = JobEventKind::for_terminal(job.status) {
                        self.emit(&state, kind, &job);
                    }
                }
                Err(err) => warn!(target: "scheduler", job = %id, "finish failed: {err}"),
            }
        }
        match status {
            JobStatus::Completed => self.metrics.record_completed(),
            JobStatus::Failed => self.metrics.record_failed(),
            _ => self.metrics.record_stopped(),
        }
        info!(target: "scheduler", job = %id, status = ?status, "job finished");
        if let Err(err) = Inner::dispatch(self) {
            warn!(target: "scheduler", "dispatch after completion failed: {err}");
        }
    }
}

impl<L, R> ProgressSink for Inner<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    fn report(&self, job: &JobId, percent: u8, message: Option<String>) {
        let mut state = self.state.lock();
        if let Some(updated) = state.update_progress(job, percent, message) {
            debug!(target: "scheduler", job = %job, progress = updated.progress, "progress");
            self.emit(&state, JobEventKind::Progress, &updated);
        }
    }
}

fn settle(
    job: &Job,
    finished: Result<Result<String, CoreError>, Box<dyn Any + Send>>,
    cancel: &CancellationToken,
) -> Terminal {
    match finished {
        Ok(Ok(message)) if cancel.is_cancelled() => {
            debug!(target: "scheduler", job = %job.id, "finished after stop: {message}");
            Terminal::stopped("stopped by request")
        }
        Ok(Ok(message)) => Terminal::completed(message),
        Ok(Err(err)) if err.is_cancelled() || cancel.is_cancelled() => {
            Terminal::stopped("stopped by request")
        }
        Ok(Err(err)) => Terminal::failed(err.to_string()),
        Err(panic) => {
            let reason = panic_reason(panic.as_ref());
            warn!(target: "scheduler", job = %job.id, "automation panicked: {reason}");
            Terminal::failed(format!("automation panicked: {reason}"))
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Closes a session; close errors and panics are logged, never propagated.
async fn close_session<S: BrowserSession>(session: &S) {
    match AssertUnwindSafe(session.close()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(target: "scheduler", session = %session.id(), "session close failed: {err}")
        }
        Err(panic) => warn!(
            target: "scheduler",
            session = %session.id(),
            "session close panicked: {}",
            panic_reason(panic.as_ref())
        ),
    }
}

async fn interrupt<S: BrowserSession>(cancel: CancellationToken, session: Option<Arc<S>>) {
    cancel.cancel();
    if let Some(session) = session {
        close_session(session.as_ref()).await;
    }
}
