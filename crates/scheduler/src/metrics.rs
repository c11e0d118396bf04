use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle counters for one scheduler instance.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    submitted: AtomicU64,
    rejected: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SchedulerMetrics {
    pub fn record_submitted(&self) {
        increment(&self.submitted);
    }

    pub fn record_rejected(&self) {
        increment(&self.rejected);
    }

    pub fn record_started(&self) {
        increment(&self.started);
    }

    pub fn record_completed(&self) {
        increment(&self.completed);
    }

    pub fn record_failed(&self) {
        increment(&self.failed);
    }

    pub fn record_stopped(&self) {
        increment(&self.stopped);
    }

    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub stopped: u64,
}
