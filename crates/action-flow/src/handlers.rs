//! Deviation handlers and their registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core_types::{AccountId, CoreError};
use perceiver_signature::{ClassificationResult, PagePort, PerceiverError, SignatureClassifier};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::strategies::pause;
use crate::types::{FlowContext, HandlerOutcome};

/// Account state names reported by the built-in handlers.
pub mod account_states {
    pub const WRONG_PASSWORD: &str = "wrong_password";
    pub const SUSPENDED: &str = "suspended";
    pub const CAPTCHA_REQUIRED: &str = "captcha_required";
    pub const PHONE_VERIFICATION: &str = "phone_verification";
}

/// Status-update sink owned by the account persistence layer.
#[async_trait]
pub trait AccountStatusSink: Send + Sync {
    async fn set_account_state(&self, account: &AccountId, state: &str) -> Result<(), CoreError>;
}

/// Sink that only logs; used when no persistence layer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

#[async_trait]
impl AccountStatusSink for LogStatusSink {
    async fn set_account_state(&self, account: &AccountId, state: &str) -> Result<(), CoreError> {
        info!(%account, state, "account state changed");
        Ok(())
    }
}

async fn record_state(sink: &dyn AccountStatusSink, account: &AccountId, state: &str) {
    if let Err(err) = sink.set_account_state(account, state).await {
        warn!(%account, state, %err, "failed to record account state");
    }
}

/// Reacts to a classified state outside the happy path.
#[async_trait]
pub trait StateHandler<C>: Send + Sync {
    async fn handle(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
        state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError>;
}

/// Maps classified state names to handlers.
pub struct HandlerRegistry<C> {
    handlers: HashMap<String, Arc<dyn StateHandler<C>>>,
    fallback: Option<Arc<dyn StateHandler<C>>>,
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: None,
        }
    }
}

impl<C> HandlerRegistry<C>
where
    C: Send,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        state: impl Into<String>,
        handler: Arc<dyn StateHandler<C>>,
    ) -> &mut Self {
        self.handlers.insert(state.into(), handler);
        self
    }

    pub fn with(mut self, state: impl Into<String>, handler: Arc<dyn StateHandler<C>>) -> Self {
        self.register(state, handler);
        self
    }

    /// Handler used by stateful flows for names without a registration.
    pub fn with_fallback(mut self, handler: Arc<dyn StateHandler<C>>) -> Self {
        self.fallback = Some(handler);
        self
    }

    /// Exact registration only.
    pub fn get(&self, state: &str) -> Option<&Arc<dyn StateHandler<C>>> {
        self.handlers.get(state)
    }

    /// Exact registration, else the fallback.
    pub fn resolve(&self, state: &str) -> Option<&Arc<dyn StateHandler<C>>> {
        self.handlers.get(state).or(self.fallback.as_ref())
    }

    pub fn contains(&self, state: &str) -> bool {
        self.handlers.contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Records a terminal account state (wrong password, suspended, phone
/// verification) and aborts the run.
pub struct AccountStateHandler {
    state: String,
    message: String,
    sink: Arc<dyn AccountStatusSink>,
}

impl AccountStateHandler {
    pub fn new(
        state: impl Into<String>,
        message: impl Into<String>,
        sink: Arc<dyn AccountStatusSink>,
    ) -> Self {
        Self {
            state: state.into(),
            message: message.into(),
            sink,
        }
    }
}

#[async_trait]
impl<C> StateHandler<C> for AccountStateHandler
where
    C: Send,
{
    async fn handle(
        &self,
        _page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
        state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        warn!(account = %ctx.account, state = %state.name, "terminal account state detected");
        record_state(self.sink.as_ref(), &ctx.account, &self.state).await;
        Ok(HandlerOutcome::Abort(self.message.clone()))
    }
}

/// Hands a captcha to a human and waits, bounded and cancellable, for the
/// page to leave the captcha state.
pub struct CaptchaHandler {
    sink: Arc<dyn AccountStatusSink>,
    classifier: SignatureClassifier,
    max_wait: Duration,
    poll: Duration,
}

impl CaptchaHandler {
    pub fn new(
        sink: Arc<dyn AccountStatusSink>,
        classifier: SignatureClassifier,
        max_wait: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            sink,
            classifier,
            max_wait,
            poll,
        }
    }
}

#[async_trait]
impl<C> StateHandler<C> for CaptchaHandler
where
    C: Send,
{
    async fn handle(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
        state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        info!(account = %ctx.account, "captcha detected, waiting for manual solve");
        record_state(self.sink.as_ref(), &ctx.account, account_states::CAPTCHA_REQUIRED).await;

        let started = tokio::time::Instant::now();
        while started.elapsed() < self.max_wait {
            pause(ctx.cancel_token(), self.poll).await?;
            let current = match self.classifier.classify_page(page).await {
                Ok(current) => current,
                Err(err) if err.is_transient() => continue,
                Err(err) => return Err(err.into()),
            };
            if current.name != state.name {
                info!(account = %ctx.account, now = %current.name, "captcha cleared");
                return Ok(HandlerOutcome::Retry);
            }
        }
        Ok(HandlerOutcome::Abort(format!(
            "captcha not solved within {}s",
            self.max_wait.as_secs()
        )))
    }
}

/// Clicks a close/dismiss control and asks the flow to look again.
pub struct DismissPopupHandler {
    close_selector: String,
    timeout: Duration,
}

impl DismissPopupHandler {
    pub fn new(close_selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            close_selector: close_selector.into(),
            timeout,
        }
    }
}

#[async_trait]
impl<C> StateHandler<C> for DismissPopupHandler
where
    C: Send,
{
    async fn handle(
        &self,
        page: &dyn PagePort,
        _ctx: &mut FlowContext<C>,
        state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        match page.click(&self.close_selector, self.timeout).await {
            Ok(()) => debug!(state = %state.name, "popup dismissed"),
            // popup may have closed on its own
            Err(PerceiverError::ElementNotFound(_)) | Err(PerceiverError::Timeout { .. }) => {
                debug!(state = %state.name, selector = %self.close_selector, "close control missing");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(HandlerOutcome::Retry)
    }
}

/// Waits and lets the flow look again; for loading or incidental pages.
pub struct WaitHandler {
    delay: Duration,
}

impl WaitHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl<C> StateHandler<C> for WaitHandler
where
    C: Send,
{
    async fn handle(
        &self,
        _page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
        state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        debug!(state = %state.name, delay_ms = self.delay.as_millis() as u64, "waiting on page");
        pause(ctx.cancel_token(), self.delay).await?;
        Ok(HandlerOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, ScriptedPage};
    use perceiver_signature::{Check, ClassifierConfig, Signature, SignatureSet};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> FlowContext<()> {
        FlowContext::new(AccountId::from("acct-1"), (), CancellationToken::new())
    }

    fn captcha_classifier() -> SignatureClassifier {
        SignatureClassifier::new(
            SignatureSet::new(vec![
                Signature::new("captcha").check(Check::present(".captcha", 1.0))
            ])
            .unwrap(),
            ClassifierConfig::default(),
        )
    }

    #[test]
    fn registry_resolves_exact_then_fallback() {
        let registry: HandlerRegistry<()> = HandlerRegistry::new()
            .with("popup", Arc::new(WaitHandler::new(Duration::ZERO)));
        assert!(registry.get("popup").is_some());
        assert!(registry.resolve("unknown").is_none());

        let registry = registry.with_fallback(Arc::new(WaitHandler::new(Duration::ZERO)));
        assert!(registry.get("unknown").is_none());
        assert!(registry.resolve("unknown").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn account_state_handler_records_and_aborts() {
        let sink = Arc::new(RecordingSink::default());
        let handler = AccountStateHandler::new(
            account_states::WRONG_PASSWORD,
            "wrong password",
            sink.clone(),
        );
        let page = ScriptedPage::new(vec!["<form id=login></form>"]);
        let state = ClassificationResult {
            name: "wrong_password".into(),
            score: 1.0,
            scored: Vec::new(),
        };
        let outcome = StateHandler::<()>::handle(&handler, &page, &mut ctx(), &state)
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Abort("wrong password".into()));
        assert_eq!(
            sink.states(),
            vec![("acct-1".to_string(), "wrong_password".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_handler_waits_for_solve() {
        let sink = Arc::new(RecordingSink::default());
        let handler = CaptchaHandler::new(
            sink.clone(),
            captcha_classifier(),
            Duration::from_secs(600),
            Duration::from_secs(5),
        );
        // captcha still visible on the first poll, gone on the second
        let page = ScriptedPage::new(vec!["<div class=captcha></div>", "<div class=inbox></div>"]);
        let state = ClassificationResult {
            name: "captcha".into(),
            score: 1.0,
            scored: Vec::new(),
        };
        let outcome = StateHandler::<()>::handle(&handler, &page, &mut ctx(), &state)
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Retry);
        assert_eq!(sink.states()[0].1, account_states::CAPTCHA_REQUIRED);
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_handler_gives_up_after_max_wait() {
        let handler = CaptchaHandler::new(
            Arc::new(LogStatusSink),
            captcha_classifier(),
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        let page = ScriptedPage::new(vec!["<div class=captcha></div>"]);
        let state = ClassificationResult {
            name: "captcha".into(),
            score: 1.0,
            scored: Vec::new(),
        };
        let outcome = StateHandler::<()>::handle(&handler, &page, &mut ctx(), &state)
            .await
            .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Abort(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn captcha_wait_is_cancellable() {
        let handler = CaptchaHandler::new(
            Arc::new(LogStatusSink),
            captcha_classifier(),
            Duration::from_secs(1200),
            Duration::from_secs(5),
        );
        let page = ScriptedPage::new(vec!["<div class=captcha></div>"]);
        let state = ClassificationResult {
            name: "captcha".into(),
            score: 1.0,
            scored: Vec::new(),
        };
        let mut context = ctx();
        context.cancel_token().cancel();
        let err = StateHandler::<()>::handle(&handler, &page, &mut context, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled));
    }

    #[tokio::test]
    async fn dismiss_popup_clicks_and_retries() {
        let page = ScriptedPage::new(vec!["<div class=modal><button class=close></button></div>"]);
        let handler = DismissPopupHandler::new("button.close", Duration::from_secs(1));
        let state = ClassificationResult {
            name: "popup".into(),
            score: 1.0,
            scored: Vec::new(),
        };
        let outcome = StateHandler::<()>::handle(&handler, &page, &mut ctx(), &state)
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Retry);
        assert_eq!(page.clicks(), vec!["button.close".to_string()]);
    }
}
