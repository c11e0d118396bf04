//! Goal-seeking loop for page sequences that are not linear

use std::sync::Arc;

use async_trait::async_trait;
use perceiver_signature::{ClassificationResult, PagePort, SignatureClassifier};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::handlers::HandlerRegistry;
use crate::strategies::pause;
use crate::types::{FlowConfig, FlowContext, FlowOutcome, HandlerOutcome};

/// Custom goal predicate evaluated against the live page.
#[async_trait]
pub trait GoalCheck<C>: Send + Sync {
    async fn reached(&self, page: &dyn PagePort, ctx: &FlowContext<C>) -> Result<bool, FlowError>;
}

pub enum Goal<C> {
    /// Reached when the page classifies as this state.
    State(String),
    Check(Arc<dyn GoalCheck<C>>),
}

impl<C> Goal<C> {
    pub fn state(name: impl Into<String>) -> Self {
        Goal::State(name.into())
    }

    fn describe(&self) -> &str {
        match self {
            Goal::State(name) => name,
            Goal::Check(_) => "custom goal",
        }
    }
}

/// Loops classify → goal → handler until the goal holds or the iteration
/// budget runs out.
pub struct StatefulFlow<C> {
    name: String,
    goal: Goal<C>,
    classifier: SignatureClassifier,
    handlers: Arc<HandlerRegistry<C>>,
    budget: u32,
    config: FlowConfig,
}

impl<C> StatefulFlow<C>
where
    C: Send,
{
    pub fn new(
        name: impl Into<String>,
        goal: Goal<C>,
        classifier: SignatureClassifier,
        handlers: Arc<HandlerRegistry<C>>,
    ) -> Self {
        let config = FlowConfig::default();
        Self {
            name: name.into(),
            goal,
            classifier,
            handlers,
            budget: config.state_budget,
            config,
        }
    }

    /// Replaces the config; the budget follows `state_budget` unless set later.
    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.budget = config.state_budget;
        self.config = config;
        self
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub async fn run(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
    ) -> Result<FlowOutcome, FlowError> {
        info!(flow = %self.name, goal = self.goal.describe(), budget = self.budget, account = %ctx.account, "stateful flow started");
        let mut outcome = FlowOutcome::new(&self.name);

        for iteration in 1..=self.budget {
            ctx.ensure_active()?;
            outcome.iterations = iteration;

            let state = match &self.goal {
                Goal::Check(check) => {
                    if check.reached(page, ctx).await? {
                        return Ok(self.reached(outcome, ctx));
                    }
                    self.observe(page).await?
                }
                Goal::State(target) => {
                    let state = self.observe(page).await?;
                    if state.is(target) {
                        outcome.last_state = Some(state.name);
                        return Ok(self.reached(outcome, ctx));
                    }
                    state
                }
            };
            outcome.last_state = Some(state.name.clone());

            match self.handlers.resolve(&state.name) {
                Some(handler) => {
                    debug!(flow = %self.name, iteration, state = %state.name, "dispatching handler");
                    match handler.handle(page, ctx, &state).await? {
                        HandlerOutcome::Continue | HandlerOutcome::Retry => {}
                        HandlerOutcome::Abort(message) => {
                            warn!(flow = %self.name, state = %state.name, %message, "flow aborted by handler");
                            return Ok(outcome.fail(message));
                        }
                    }
                }
                None => {
                    debug!(flow = %self.name, iteration, state = %state.name, "no handler, waiting");
                    pause(ctx.cancel_token(), self.config.idle_backoff).await?;
                }
            }
        }

        let message = format!(
            "goal '{}' not reached within {} iterations (last state: {})",
            self.goal.describe(),
            self.budget,
            outcome.last_state.as_deref().unwrap_or("none")
        );
        warn!(flow = %self.name, account = %ctx.account, "{}", message);
        Ok(outcome.fail(message))
    }

    /// Transient capture problems read as a page that is still loading.
    async fn observe(&self, page: &dyn PagePort) -> Result<ClassificationResult, FlowError> {
        match self.classifier.classify_page(page).await {
            Ok(state) => Ok(state),
            Err(err) if err.is_transient() => Ok(ClassificationResult::unknown(0.0, Vec::new())),
            Err(err) => Err(err.into()),
        }
    }

    fn reached(&self, outcome: FlowOutcome, ctx: &FlowContext<C>) -> FlowOutcome {
        info!(flow = %self.name, iterations = outcome.iterations, account = %ctx.account, "goal reached");
        ctx.report_progress(100, Some(format!("{} reached", self.goal.describe())));
        outcome.succeed(format!("{} reached", self.goal.describe()))
    }
}
