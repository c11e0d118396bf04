//! Ordered step execution with a deviation gate before every attempt

use std::collections::HashSet;
use std::sync::Arc;

use perceiver_signature::{PagePort, SignatureClassifier};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::handlers::HandlerRegistry;
use crate::step::Step;
use crate::strategies::FixedBackoff;
use crate::types::{
    FlowConfig, FlowContext, FlowOutcome, HandlerOutcome, StepAttempt, StepResult, StepStatus,
};

enum Gate {
    Proceed,
    Abort(String),
}

/// Runs steps in order. Before each attempt the page is classified and a
/// registered deviation handler, if any, gets to react first.
pub struct SequentialFlow<C> {
    name: String,
    steps: Vec<Arc<dyn Step<C>>>,
    handlers: Arc<HandlerRegistry<C>>,
    classifier: Option<SignatureClassifier>,
    config: FlowConfig,
}

impl<C> SequentialFlow<C>
where
    C: Send,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            handlers: Arc::new(HandlerRegistry::new()),
            classifier: None,
            config: FlowConfig::default(),
        }
    }

    pub fn step(mut self, step: Arc<dyn Step<C>>) -> Self {
        self.steps.push(step);
        self
    }

    /// Deviation handlers are only consulted when a classifier is present.
    pub fn with_deviations(
        mut self,
        classifier: SignatureClassifier,
        handlers: Arc<HandlerRegistry<C>>,
    ) -> Self {
        self.classifier = Some(classifier);
        self.handlers = handlers;
        self
    }

    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names must be unique so `next_step` handoffs are unambiguous.
    pub fn validate(&self) -> Result<(), FlowError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(FlowError::InvalidStructure(format!(
                    "duplicate step name '{}' in flow '{}'",
                    step.name(),
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub async fn run(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
    ) -> Result<FlowOutcome, FlowError> {
        self.validate()?;
        info!(flow = %self.name, steps = self.steps.len(), account = %ctx.account, "sequential flow started");

        let mut outcome = FlowOutcome::new(&self.name);
        let backoff = FixedBackoff::new(self.config.retry_backoff);
        let total = self.steps.len();
        let mut index = 0;
        let mut handoffs = 0;

        while index < total {
            let step = &self.steps[index];
            let mut attempt = 0;
            let max_attempts = step.max_retries().max(1);

            let next_step = loop {
                ctx.ensure_active()?;
                if let Gate::Abort(message) = self.check_deviations(page, ctx, &mut outcome).await? {
                    warn!(flow = %self.name, step = step.name(), %message, "flow aborted by deviation handler");
                    return Ok(outcome.fail(message));
                }

                attempt += 1;
                let result = match step.run(page, ctx).await {
                    Ok(result) => result,
                    Err(FlowError::Page(err)) if err.is_transient() => {
                        StepResult::retry(err.to_string())
                    }
                    Err(err) => return Err(err),
                };
                debug!(flow = %self.name, step = step.name(), attempt, status = ?result.status, "step finished");
                outcome.attempts.push(StepAttempt {
                    step: step.name().to_string(),
                    attempt,
                    status: result.status,
                    message: result.message.clone(),
                });

                match result.status {
                    StepStatus::Success | StepStatus::Skip => break result.next_step,
                    StepStatus::Retry if attempt < max_attempts => {
                        backoff.wait(ctx.cancel_token()).await?;
                    }
                    StepStatus::Retry => {
                        let reason = result.message.unwrap_or_else(|| "no detail".to_string());
                        return Ok(outcome.fail(format!(
                            "step '{}' gave up after {} attempts: {}",
                            step.name(),
                            attempt,
                            reason
                        )));
                    }
                    StepStatus::Failure => {
                        let reason = result.message.unwrap_or_else(|| "no detail".to_string());
                        return Ok(outcome.fail(format!("step '{}' failed: {}", step.name(), reason)));
                    }
                }
            };

            outcome.iterations += 1;
            let completed = outcome.iterations as usize;
            ctx.report_progress(
                ((completed.min(total) * 100) / total) as u8,
                Some(format!("{} of {} steps", completed.min(total), total)),
            );

            index = match next_step {
                None => index + 1,
                Some(target) => {
                    handoffs += 1;
                    if handoffs > self.config.max_handoffs {
                        return Ok(outcome.fail(format!(
                            "more than {} step handoffs",
                            self.config.max_handoffs
                        )));
                    }
                    match self.steps.iter().position(|s| s.name() == target) {
                        Some(position) => position,
                        None => {
                            return Ok(outcome.fail(format!(
                                "step '{}' handed off to unknown step '{}'",
                                step.name(),
                                target
                            )))
                        }
                    }
                }
            };
        }

        info!(flow = %self.name, account = %ctx.account, "sequential flow completed");
        let message = format!("{} steps completed", outcome.iterations);
        Ok(outcome.succeed(message))
    }

    async fn check_deviations(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
        outcome: &mut FlowOutcome,
    ) -> Result<Gate, FlowError> {
        let Some(classifier) = &self.classifier else {
            return Ok(Gate::Proceed);
        };

        let mut rounds = 0;
        loop {
            ctx.ensure_active()?;
            let state = match classifier.classify_page(page).await {
                Ok(state) => state,
                Err(err) if err.is_transient() => return Ok(Gate::Proceed),
                Err(err) => return Err(err.into()),
            };
            outcome.last_state = Some(state.name.clone());

            let Some(handler) = self.handlers.get(&state.name) else {
                return Ok(Gate::Proceed);
            };
            debug!(flow = %self.name, state = %state.name, score = state.score, "deviation detected");
            match handler.handle(page, ctx, &state).await? {
                HandlerOutcome::Continue => return Ok(Gate::Proceed),
                HandlerOutcome::Abort(message) => return Ok(Gate::Abort(message)),
                HandlerOutcome::Retry => {
                    rounds += 1;
                    if rounds >= self.config.max_deviation_rounds {
                        return Ok(Gate::Abort(format!(
                            "state '{}' still present after {} handler rounds",
                            state.name, rounds
                        )));
                    }
                }
            }
        }
    }
}
