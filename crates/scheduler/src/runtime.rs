use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use pagepilot_core_types::{AccountId, JobId};
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::model::{Job, JobStatus, SchedulerSnapshot};

pub(crate) struct RunningJob<S> {
    pub job: Job,
    pub cancel: CancellationToken,
    pub session: Option<Arc<S>>,
    pub stop_requested: bool,
}

pub(crate) type StopHandles<S> = Vec<(CancellationToken, Option<Arc<S>>)>;

/// What `request_stop` found for a job id.
pub(crate) enum StopTarget<S> {
    /// Was queued; already moved to history as Stopped.
    Dequeued(Job),
    /// Running; the caller must cancel and close outside the lock.
    Running {
        cancel: CancellationToken,
        session: Option<Arc<S>>,
    },
    /// Already stopping or terminal.
    Settled,
}

/// Queue, running set and history. Only ever touched under the scheduler lock.
pub(crate) struct SchedulerState<S> {
    queue: VecDeque<Job>,
    running: Vec<RunningJob<S>>,
    history: VecDeque<Job>,
    history_limit: usize,
    active_accounts: HashMap<AccountId, JobId>,
}

impl<S> SchedulerState<S> {
    pub fn new(history_limit: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            running: Vec::new(),
            history: VecDeque::new(),
            history_limit,
            active_accounts: HashMap::new(),
        }
    }

    pub fn enqueue(&mut self, job: Job) -> Result<(), SchedulerError> {
        if let Some(existing) = self.active_accounts.get(&job.account_id) {
            return Err(SchedulerError::AccountBusy {
                account: job.account_id.clone(),
                job: existing.clone(),
            });
        }
        self.active_accounts
            .insert(job.account_id.clone(), job.id.clone());
        self.queue.push_back(job);
        Ok(())
    }

    /// Pops the queue head into the running set if a slot is free.
    pub fn start_next(
        &mut self,
        concurrency: usize,
    ) -> Result<Option<(Job, CancellationToken)>, SchedulerError> {
        if self.running.len() >= concurrency {
            return Ok(None);
        }
        let Some(mut job) = self.queue.pop_front() else {
            return Ok(None);
        };
        job.transition(JobStatus::Running)?;
        let cancel = CancellationToken::new();
        self.running.push(RunningJob {
            job: job.clone(),
            cancel: cancel.clone(),
            session: None,
            stop_requested: false,
        });
        Ok(Some((job, cancel)))
    }

    /// Records the worker's session so `stop` can force-close it. Returns
    /// false when a stop already arrived and the caller should tear down.
    pub fn register_session(&mut self, id: &JobId, session: Arc<S>) -> bool {
        match self.running.iter_mut().find(|r| &r.job.id == id) {
            Some(entry) if !entry.stop_requested => {
                entry.session = Some(session);
                true
            }
            _ => false,
        }
    }

    pub fn update_progress(
        &mut self,
        id: &JobId,
        percent: u8,
        message: Option<String>,
    ) -> Option<Job> {
        let entry = self
            .running
            .iter_mut()
            .find(|r| &r.job.id == id && !r.stop_requested)?;
        entry.job.progress = percent.min(100);
        if message.is_some() {
            entry.job.message = message;
        }
        Some(entry.job.clone())
    }

    pub fn request_stop(&mut self, id: &JobId) -> Result<StopTarget<S>, SchedulerError> {
        if let Some(pos) = self.queue.iter().position(|job| &job.id == id) {
            let job = self
                .queue
                .remove(pos)
                .ok_or_else(|| SchedulerError::JobNotFound(id.clone()))?;
            let job = self.settle_queued(job)?;
            return Ok(StopTarget::Dequeued(job));
        }
        if let Some(entry) = self.running.iter_mut().find(|r| &r.job.id == id) {
            if entry.stop_requested {
                return Ok(StopTarget::Settled);
            }
            entry.stop_requested = true;
            return Ok(StopTarget::Running {
                cancel: entry.cancel.clone(),
                session: entry.session.clone(),
            });
        }
        if self.history.iter().any(|job| &job.id == id) {
            return Ok(StopTarget::Settled);
        }
        Err(SchedulerError::JobNotFound(id.clone()))
    }

    /// Empties the queue (each entry Stopped) and flags every running job.
    pub fn request_stop_all(&mut self) -> Result<(Vec<Job>, StopHandles<S>), SchedulerError> {
        let mut dequeued = Vec::with_capacity(self.queue.len());
        while let Some(job) = self.queue.pop_front() {
            dequeued.push(self.settle_queued(job)?);
        }
        let running = self
            .running
            .iter_mut()
            .filter(|entry| !entry.stop_requested)
            .map(|entry| {
                entry.stop_requested = true;
                (entry.cancel.clone(), entry.session.clone())
            })
            .collect();
        Ok((dequeued, running))
    }

    /// Moves a running job to its terminal status and into history.
    pub fn finish(
        &mut self,
        id: &JobId,
        status: JobStatus,
        message: String,
        error: Option<String>,
    ) -> Result<Job, SchedulerError> {
        let pos = self
            .running
            .iter()
            .position(|r| &r.job.id == id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.clone()))?;
        let mut job = self.running.remove(pos).job;
        job.transition(status)?;
        job.message = Some(message);
        job.error = error;
        self.retire(job.clone());
        Ok(job)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            running: self.running.iter().map(|r| r.job.clone()).collect(),
            queued: self.queue.iter().cloned().collect(),
            completed: self.history.clone(),
            history_limit: self.history_limit,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    fn settle_queued(&mut self, mut job: Job) -> Result<Job, SchedulerError> {
        job.transition(JobStatus::Stopped)?;
        job.message = Some("stopped before start".to_string());
        self.retire(job.clone());
        Ok(job)
    }

    fn retire(&mut self, job: Job) {
        if self.active_accounts.get(&job.account_id) == Some(&job.id) {
            self.active_accounts.remove(&job.account_id);
        }
        self.history.push_back(job);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}
