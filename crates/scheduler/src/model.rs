use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pagepilot_core_types::{AccountId, JobId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchedulerError;

/// Opaque key-value parameters handed to the automation unmodified.
pub type Parameters = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Queued → Running → terminal, plus Queued → Stopped.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Stopped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Stopped)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub account_id: AccountId,
    pub automation_name: String,
    #[serde(skip)]
    pub parameters: Parameters,
    pub status: JobStatus,
    pub progress: u8,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(account: AccountId, automation: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            id: JobId::new(),
            account_id: account,
            automation_name: automation.into(),
            parameters,
            status: JobStatus::Queued,
            progress: 0,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            message: None,
            error: None,
        }
    }

    /// Moves to `next`, stamping start/completion times.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), SchedulerError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                job: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            JobStatus::Running => self.started_at = Some(now),
            status if status.is_terminal() => self.completed_at = Some(now),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Queued,
    Started,
    Progress,
    Completed,
    Failed,
    Stopped,
}

impl JobEventKind {
    pub fn for_terminal(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed => Some(Self::Completed),
            JobStatus::Failed => Some(Self::Failed),
            JobStatus::Stopped => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// Lifecycle event, serialized as `{"type": ..., "job": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub job: Job,
}

/// Point-in-time view of the scheduler: running jobs in start order, the
/// FIFO queue, and recent terminal jobs oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub running: Vec<Job>,
    pub queued: Vec<Job>,
    pub completed: VecDeque<Job>,
    pub history_limit: usize,
}

impl SchedulerSnapshot {
    /// Folds a lifecycle event into the view the same way the scheduler
    /// mutates its own state.
    pub fn apply(&mut self, event: &JobEvent) {
        let job = &event.job;
        match event.kind {
            JobEventKind::Queued => self.queued.push(job.clone()),
            JobEventKind::Started => {
                self.queued.retain(|queued| queued.id != job.id);
                self.running.push(job.clone());
            }
            JobEventKind::Progress => {
                if let Some(running) = self.running.iter_mut().find(|r| r.id == job.id) {
                    *running = job.clone();
                }
            }
            JobEventKind::Completed | JobEventKind::Failed | JobEventKind::Stopped => {
                self.queued.retain(|queued| queued.id != job.id);
                self.running.retain(|running| running.id != job.id);
                self.completed.push_back(job.clone());
                while self.completed.len() > self.history_limit {
                    self.completed.pop_front();
                }
            }
        }
    }

    pub fn find(&self, id: &JobId) -> Option<&Job> {
        self.running
            .iter()
            .chain(self.queued.iter())
            .chain(self.completed.iter())
            .find(|job| &job.id == id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum number of Running jobs.
    pub concurrency: usize,
    /// Terminal jobs kept for snapshots.
    pub history_limit: usize,
    /// Wall-clock ceiling per job; `None` leaves it to the automation.
    pub job_timeout: Option<Duration>,
    /// How long a stopped runner may take to unwind before it is dropped.
    pub stop_grace: Duration,
    /// Per-subscriber event queue length.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            history_limit: 100,
            job_timeout: None,
            stop_grace: Duration::from_millis(2000),
            event_buffer: 256,
        }
    }
}
