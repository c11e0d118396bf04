//! Core types for step and flow execution

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pagepilot_core_types::AccountId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;

/// Default number of attempts a step gets before a `Retry` becomes a failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tri-state step outcome plus `Skip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Retry,
    Skip,
    Failure,
}

/// Step execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub message: Option<String>,
    /// Name of another step in the same flow to continue from.
    pub next_step: Option<String>,
}

impl StepResult {
    fn with_status(status: StepStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            next_step: None,
        }
    }

    pub fn success() -> Self {
        Self::with_status(StepStatus::Success, None)
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self::with_status(StepStatus::Retry, Some(message.into()))
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::with_status(StepStatus::Skip, Some(message.into()))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::with_status(StepStatus::Failure, Some(message.into()))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Hand off to the named step instead of the next one in order.
    pub fn then(mut self, step: impl Into<String>) -> Self {
        self.next_step = Some(step.into());
        self
    }
}

/// What a state handler tells the flow to do after reacting to a deviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerOutcome {
    /// Deviation resolved, proceed with the flow's own logic
    Continue,
    /// Re-attempt the current step / iteration
    Retry,
    /// Terminal for the whole flow run
    Abort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Success,
    Failure,
}

/// One recorded step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAttempt {
    pub step: String,
    pub attempt: u32,
    pub status: StepStatus,
    pub message: Option<String>,
}

/// Flow execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOutcome {
    pub flow: String,
    pub status: FlowStatus,
    pub message: Option<String>,
    /// Last classification observed by the flow, if any.
    pub last_state: Option<String>,
    /// Loop iterations consumed (stateful) or steps completed (sequential).
    pub iterations: u32,
    pub attempts: Vec<StepAttempt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FlowOutcome {
    pub fn new(flow: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            flow: flow.into(),
            status: FlowStatus::Failure,
            message: None,
            last_state: None,
            iterations: 0,
            attempts: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn succeed(mut self, message: impl Into<String>) -> Self {
        self.status = FlowStatus::Success;
        self.message = Some(message.into());
        self.finish()
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.status = FlowStatus::Failure;
        self.message = Some(message.into());
        self.finish()
    }

    pub fn is_success(&self) -> bool {
        self.status == FlowStatus::Success
    }

    /// Number of step invocations, retries included.
    pub fn runs_of(&self, step: &str) -> usize {
        self.attempts.iter().filter(|a| a.step == step).count()
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

/// Tunables shared by both flow flavors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Fixed wait between attempts of a step that returned `Retry`.
    pub retry_backoff: Duration,
    /// Pause before re-polling a page with no handler (still loading, unknown).
    pub idle_backoff: Duration,
    /// Handler `Retry` rounds allowed before one step in a sequential flow.
    pub max_deviation_rounds: u32,
    /// `next_step` jumps allowed within one sequential run.
    pub max_handoffs: u32,
    /// Default iteration budget for stateful flows.
    pub state_budget: u32,
    /// Timeout handed to page actions issued by built-in handlers.
    pub action_timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(1000),
            idle_backoff: Duration::from_millis(1500),
            max_deviation_rounds: 10,
            max_handoffs: 32,
            state_budget: 30,
            action_timeout: Duration::from_secs(10),
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(u8, Option<String>) + Send + Sync>;

/// Per-run context handed to every step and handler.
///
/// `data` is the caller's mutable automation/account state; steps keep no
/// state of their own so one instance can be retried and reused.
pub struct FlowContext<C> {
    pub account: AccountId,
    pub data: C,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl<C> FlowContext<C> {
    pub fn new(account: AccountId, data: C, cancel: CancellationToken) -> Self {
        Self {
            account,
            data,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ensure_active(&self) -> Result<(), FlowError> {
        if self.cancel.is_cancelled() {
            Err(FlowError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn report_progress(&self, percent: u8, message: Option<String>) {
        if let Some(progress) = &self.progress {
            progress(percent.min(100), message);
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for FlowContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext")
            .field("account", &self.account)
            .field("data", &self.data)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn step_result_builders() {
        let result = StepResult::success().then("confirm");
        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.next_step.as_deref(), Some("confirm"));
        assert_eq!(
            StepResult::retry("not visible").message.as_deref(),
            Some("not visible")
        );
    }

    #[test]
    fn progress_is_clamped_and_forwarded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = FlowContext::new(AccountId::from("a"), (), CancellationToken::new())
            .with_progress(Arc::new(move |pct, msg| sink.lock().unwrap().push((pct, msg))));
        ctx.report_progress(250, Some("3 of 3".into()));
        assert_eq!(seen.lock().unwrap().as_slice(), &[(100, Some("3 of 3".to_string()))]);
    }

    #[test]
    fn ensure_active_reports_cancellation() {
        let token = CancellationToken::new();
        let ctx = FlowContext::new(AccountId::from("a"), 0u8, token.clone());
        assert!(ctx.ensure_active().is_ok());
        token.cancel();
        assert!(matches!(ctx.ensure_active(), Err(FlowError::Cancelled)));
    }
}
