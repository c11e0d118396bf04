//! Automation registry: the job runner the scheduler drives.
//!
//! Each automation is a named Sequential or Stateful flow. A job names the
//! automation to run; its parameters supply the credentials and whatever
//! the browser side needs.

pub mod mail;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use action_flow::{
    AccountStatusSink, FlowContext, FlowError, FlowOutcome, ProgressFn, SequentialFlow,
    StatefulFlow,
};
use async_trait::async_trait;
use pagepilot_core_types::{AccountId, CoreError};
use pagepilot_scheduler::{BrowserSession, JobContext, JobRunner, Parameters};
use perceiver_signature::PagePort;
use tracing::{info, warn};

use crate::config::PagePilotConfig;
use crate::errors::PagePilotError;

/// A session that hands out the page automations act on.
pub trait PageSession: BrowserSession {
    fn page(&self) -> Arc<dyn PagePort>;
}

/// Login data pulled from job parameters.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// `email` defaults to the account id; `password` is required.
    pub fn from_parameters(
        account: &AccountId,
        parameters: &Parameters,
    ) -> Result<Self, PagePilotError> {
        let email = match parameters.get("email") {
            None => account.as_str().to_string(),
            Some(value) => value
                .as_str()
                .ok_or_else(|| PagePilotError::invalid_parameters("'email' must be a string"))?
                .to_string(),
        };
        let password = parameters
            .get("password")
            .and_then(|value| value.as_str())
            .ok_or_else(|| PagePilotError::invalid_parameters("'password' is required"))?
            .to_string();
        Ok(Self { email, password })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub enum Automation<C> {
    Sequential(SequentialFlow<C>),
    Stateful(StatefulFlow<C>),
}

impl<C> Automation<C>
where
    C: Send,
{
    pub fn name(&self) -> &str {
        match self {
            Automation::Sequential(flow) => flow.name(),
            Automation::Stateful(flow) => flow.name(),
        }
    }

    pub async fn run(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
    ) -> Result<FlowOutcome, FlowError> {
        match self {
            Automation::Sequential(flow) => flow.run(page, ctx).await,
            Automation::Stateful(flow) => flow.run(page, ctx).await,
        }
    }
}

#[derive(Default)]
pub struct AutomationRegistry {
    automations: HashMap<String, Automation<Credentials>>,
}

impl AutomationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the demo mail provider's automations.
    pub fn demo(
        config: &PagePilotConfig,
        sink: Arc<dyn AccountStatusSink>,
    ) -> Result<Self, PagePilotError> {
        let mut registry = Self::new();
        for automation in mail::automations(config, sink)? {
            registry.register(automation);
        }
        Ok(registry)
    }

    /// Registers under the flow's name, replacing any previous entry.
    pub fn register(&mut self, automation: Automation<Credentials>) -> &mut Self {
        self.automations
            .insert(automation.name().to_string(), automation);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.automations.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.automations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the job's automation against `page`, bridging the job's stop
    /// token and progress reporter into the flow.
    pub async fn execute(
        &self,
        page: &dyn PagePort,
        ctx: &JobContext,
    ) -> Result<FlowOutcome, PagePilotError> {
        let automation = self
            .automations
            .get(&ctx.automation)
            .ok_or_else(|| PagePilotError::UnknownAutomation(ctx.automation.clone()))?;
        let credentials = Credentials::from_parameters(&ctx.account, &ctx.parameters)?;

        let reporter = ctx.progress().clone();
        let progress: ProgressFn =
            Arc::new(move |percent, message| reporter.report(percent, message));
        let mut flow_ctx =
            FlowContext::new(ctx.account.clone(), credentials, ctx.cancel_token().clone())
                .with_progress(progress);

        info!(job = %ctx.job_id, automation = %ctx.automation, "automation started");
        Ok(automation.run(page, &mut flow_ctx).await?)
    }
}

#[async_trait]
impl<S> JobRunner<S> for AutomationRegistry
where
    S: PageSession,
{
    async fn run(&self, session: &S, ctx: JobContext) -> Result<String, CoreError> {
        let page = session.page();
        let outcome = self.execute(page.as_ref(), &ctx).await?;
        conclude(outcome)
    }
}

/// Success carries the flow's message; failure becomes the job's error.
fn conclude(outcome: FlowOutcome) -> Result<String, CoreError> {
    let message = outcome.message.clone().unwrap_or_else(|| {
        format!("{} finished after {} iterations", outcome.flow, outcome.iterations)
    });
    if outcome.is_success() {
        Ok(message)
    } else {
        warn!(flow = %outcome.flow, state = ?outcome.last_state, "automation failed: {message}");
        Err(CoreError::new(message))
    }
}
