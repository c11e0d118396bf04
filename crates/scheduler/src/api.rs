use std::sync::Arc;

use async_trait::async_trait;
use pagepilot_core_types::{AccountId, CoreError, JobId};

use crate::executor::{JobRunner, SessionLauncher};
use crate::model::{Job, Parameters, SchedulerSnapshot};
use crate::orchestrator::Scheduler;

/// Control surface handed to API layers, the CLI and tests.
#[async_trait]
pub trait JobControl: Send + Sync {
    async fn submit(
        &self,
        account: AccountId,
        automation: String,
        parameters: Parameters,
    ) -> Result<Job, CoreError>;
    async fn stop(&self, job: &JobId) -> Result<bool, CoreError>;
    async fn stop_all(&self) -> Result<usize, CoreError>;
    fn snapshot(&self) -> SchedulerSnapshot;
}

#[async_trait]
impl<L, R> JobControl for Scheduler<L, R>
where
    L: SessionLauncher,
    R: JobRunner<L::Session>,
{
    async fn submit(
        &self,
        account: AccountId,
        automation: String,
        parameters: Parameters,
    ) -> Result<Job, CoreError> {
        Ok(Scheduler::submit(self, account, automation, parameters).await?)
    }

    async fn stop(&self, job: &JobId) -> Result<bool, CoreError> {
        Ok(Scheduler::stop(self, job).await?)
    }

    async fn stop_all(&self) -> Result<usize, CoreError> {
        Ok(Scheduler::stop_all(self).await?)
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        Scheduler::snapshot(self)
    }
}

#[async_trait]
impl<D> JobControl for Arc<D>
where
    D: JobControl + ?Sized,
{
    async fn submit(
        &self,
        account: AccountId,
        automation: String,
        parameters: Parameters,
    ) -> Result<Job, CoreError> {
        (**self).submit(account, automation, parameters).await
    }

    async fn stop(&self, job: &JobId) -> Result<bool, CoreError> {
        (**self).stop(job).await
    }

    async fn stop_all(&self) -> Result<usize, CoreError> {
        (**self).stop_all().await
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        (**self).snapshot()
    }
}
