//! Demo mail provider: page signatures, steps, handlers and the two
//! automations that sign into it.

use std::sync::Arc;
use std::time::Duration;

use action_flow::{
    account_states, AccountStateHandler, AccountStatusSink, CaptchaHandler, DismissPopupHandler,
    FlowContext, FlowError, Goal, HandlerOutcome, HandlerRegistry, SequentialFlow, StateHandler,
    StatefulFlow, Step, StepResult, WaitHandler,
};
use async_trait::async_trait;
use perceiver_signature::{
    ClassificationResult, PagePort, Signature, SignatureClassifier, SignatureSet,
};
use tracing::{debug, warn};

use super::{Automation, Credentials};
use crate::config::PagePilotConfig;
use crate::errors::PagePilotError;

pub const LOGIN_URL: &str = "https://mail.example.test/login";
pub const INBOX_URL: &str = "https://mail.example.test/inbox";

pub const LOGIN_AUTOMATION: &str = "login";
pub const REACH_INBOX_AUTOMATION: &str = "reach_inbox";

pub mod selectors {
    pub const EMAIL: &str = "#email";
    pub const PASSWORD: &str = "#password";
    pub const SIGN_IN: &str = "#sign-in";
    pub const DISMISS_POPUP: &str = "#dismiss-popup";
}

/// Names used in `demo_mail_signatures.yaml`.
pub mod states {
    pub const BLANK: &str = "blank";
    pub const LOGIN: &str = "login";
    pub const INBOX: &str = "inbox";
    pub const POPUP: &str = "popup";
    pub const CAPTCHA: &str = "captcha";
    pub const WRONG_PASSWORD: &str = "wrong_password";
    pub const SUSPENDED: &str = "suspended";
}

const SIGNATURES: &str = include_str!("../../assets/demo_mail_signatures.yaml");

pub fn signatures() -> Result<SignatureSet, PagePilotError> {
    let parsed: Vec<Signature> = serde_yaml::from_str(SIGNATURES)?;
    Ok(SignatureSet::new(parsed)?)
}

/// Both demo automations, sharing one classifier and handler set.
pub fn automations(
    config: &PagePilotConfig,
    sink: Arc<dyn AccountStatusSink>,
) -> Result<Vec<Automation<Credentials>>, PagePilotError> {
    let classifier = SignatureClassifier::new(signatures()?, config.classifier_config());
    let deviations = Arc::new(deviation_handlers(&classifier, sink.clone(), config));
    Ok(vec![
        Automation::Sequential(login_flow(classifier.clone(), deviations, config)),
        Automation::Stateful(reach_inbox_flow(classifier, sink, config)),
    ])
}

/// Off-path pages either flow may land on.
fn deviation_handlers(
    classifier: &SignatureClassifier,
    sink: Arc<dyn AccountStatusSink>,
    config: &PagePilotConfig,
) -> HandlerRegistry<Credentials> {
    let timeout = config.flow_config().action_timeout;
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            states::POPUP,
            Arc::new(DismissPopupHandler::new(selectors::DISMISS_POPUP, timeout)),
        )
        .register(
            states::CAPTCHA,
            Arc::new(CaptchaHandler::new(
                sink.clone(),
                classifier.clone(),
                config.captcha_max_wait(),
                config.captcha_poll(),
            )),
        )
        .register(
            states::WRONG_PASSWORD,
            Arc::new(AccountStateHandler::new(
                account_states::WRONG_PASSWORD,
                "wrong password",
                sink.clone(),
            )),
        )
        .register(
            states::SUSPENDED,
            Arc::new(AccountStateHandler::new(
                account_states::SUSPENDED,
                "account suspended",
                sink,
            )),
        );
    registry
}

pub fn login_flow(
    classifier: SignatureClassifier,
    deviations: Arc<HandlerRegistry<Credentials>>,
    config: &PagePilotConfig,
) -> SequentialFlow<Credentials> {
    let flow = config.flow_config();
    let retries = config.flow.max_retries;
    let timeout = flow.action_timeout;
    SequentialFlow::new(LOGIN_AUTOMATION)
        .step(Arc::new(OpenLogin { timeout, retries }))
        .step(Arc::new(EnterCredentials { timeout, retries }))
        .step(Arc::new(SubmitLogin { timeout, retries }))
        .step(Arc::new(ConfirmInbox {
            classifier: classifier.clone(),
            retries,
        }))
        .with_deviations(classifier, deviations)
        .with_config(flow)
}

pub fn reach_inbox_flow(
    classifier: SignatureClassifier,
    sink: Arc<dyn AccountStatusSink>,
    config: &PagePilotConfig,
) -> StatefulFlow<Credentials> {
    let flow = config.flow_config();
    let timeout = flow.action_timeout;
    let handlers = deviation_handlers(&classifier, sink, config)
        .with(
            states::BLANK,
            Arc::new(OpenPage {
                url: LOGIN_URL,
                timeout,
            }),
        )
        .with(states::LOGIN, Arc::new(SignIn { timeout }))
        .with_fallback(Arc::new(WaitHandler::new(flow.idle_backoff)));
    StatefulFlow::new(
        REACH_INBOX_AUTOMATION,
        Goal::state(states::INBOX),
        classifier,
        Arc::new(handlers),
    )
    .with_config(flow)
}

struct OpenLogin {
    timeout: Duration,
    retries: u32,
}

#[async_trait]
impl Step<Credentials> for OpenLogin {
    fn name(&self) -> &str {
        "open_login"
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    async fn run(
        &self,
        page: &dyn PagePort,
        _ctx: &mut FlowContext<Credentials>,
    ) -> Result<StepResult, FlowError> {
        page.navigate(LOGIN_URL, self.timeout).await?;
        Ok(StepResult::success())
    }
}

struct EnterCredentials {
    timeout: Duration,
    retries: u32,
}

#[async_trait]
impl Step<Credentials> for EnterCredentials {
    fn name(&self) -> &str {
        "enter_credentials"
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    async fn run(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<Credentials>,
    ) -> Result<StepResult, FlowError> {
        fill_credentials(page, &ctx.data, self.timeout).await?;
        Ok(StepResult::success())
    }
}

struct SubmitLogin {
    timeout: Duration,
    retries: u32,
}

#[async_trait]
impl Step<Credentials> for SubmitLogin {
    fn name(&self) -> &str {
        "submit"
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    async fn run(
        &self,
        page: &dyn PagePort,
        _ctx: &mut FlowContext<Credentials>,
    ) -> Result<StepResult, FlowError> {
        page.click(selectors::SIGN_IN, self.timeout).await?;
        Ok(StepResult::success())
    }
}

/// Succeeds once the page classifies as the inbox; anything else is retried
/// so the deviation gate gets another look first.
struct ConfirmInbox {
    classifier: SignatureClassifier,
    retries: u32,
}

#[async_trait]
impl Step<Credentials> for ConfirmInbox {
    fn name(&self) -> &str {
        "confirm_inbox"
    }

    fn max_retries(&self) -> u32 {
        self.retries
    }

    async fn run(
        &self,
        page: &dyn PagePort,
        _ctx: &mut FlowContext<Credentials>,
    ) -> Result<StepResult, FlowError> {
        let state = self.classifier.classify_page(page).await?;
        if state.is(states::INBOX) {
            Ok(StepResult::success().with_message("inbox loaded"))
        } else {
            Ok(StepResult::retry(format!("still on '{}'", state.name)))
        }
    }
}

async fn fill_credentials(
    page: &dyn PagePort,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), FlowError> {
    page.fill(selectors::EMAIL, &credentials.email, timeout).await?;
    page.fill(selectors::PASSWORD, &credentials.password, timeout)
        .await?;
    Ok(())
}

struct OpenPage {
    url: &'static str,
    timeout: Duration,
}

#[async_trait]
impl StateHandler<Credentials> for OpenPage {
    async fn handle(
        &self,
        page: &dyn PagePort,
        _ctx: &mut FlowContext<Credentials>,
        _state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        debug!(url = self.url, "opening page");
        match page.navigate(self.url, self.timeout).await {
            Ok(()) => Ok(HandlerOutcome::Continue),
            Err(err) if err.is_transient() => {
                warn!(url = self.url, %err, "navigation did not finish, looking again");
                Ok(HandlerOutcome::Continue)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Fills and submits the login form, then lets the flow look again.
struct SignIn {
    timeout: Duration,
}

#[async_trait]
impl StateHandler<Credentials> for SignIn {
    async fn handle(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<Credentials>,
        _state: &ClassificationResult,
    ) -> Result<HandlerOutcome, FlowError> {
        let submitted = match fill_credentials(page, &ctx.data, self.timeout).await {
            Ok(()) => page
                .click(selectors::SIGN_IN, self.timeout)
                .await
                .map_err(FlowError::from),
            Err(err) => Err(err),
        };
        match submitted {
            Ok(()) => Ok(HandlerOutcome::Continue),
            Err(FlowError::Page(err)) if err.is_transient() => {
                warn!(account = %ctx.account, %err, "sign-in attempt stalled");
                Ok(HandlerOutcome::Continue)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceiver_signature::{ClassifierConfig, PageCapture};

    fn classify(url: &str, html: &str) -> String {
        let classifier = SignatureClassifier::new(signatures().unwrap(), ClassifierConfig::default());
        classifier
            .classify_capture(&PageCapture::new(url, html), url)
            .name
    }

    #[test]
    fn bundled_signatures_parse() {
        let set = signatures().unwrap();
        assert_eq!(set.len(), 7);
        assert!(set.get(states::INBOX).is_some());
    }

    #[test]
    fn popup_wins_over_the_inbox_beneath_it() {
        let html = r#"<ul id="message-list"><li>hi</li></ul>
            <div id="promo-modal"><button id="dismiss-popup">No thanks</button></div>"#;
        assert_eq!(classify(INBOX_URL, html), states::POPUP);
        assert_eq!(
            classify(INBOX_URL, r#"<ul id="message-list"><li>hi</li></ul>"#),
            states::INBOX
        );
    }

    #[test]
    fn login_error_is_a_wrong_password() {
        let html = r#"<form><input id="email"><input id="password">
            <p class="login-error">Wrong password. Try again.</p></form>"#;
        assert_eq!(classify(LOGIN_URL, html), states::WRONG_PASSWORD);
    }

    #[test]
    fn spinner_is_unknown() {
        let url = "https://mail.example.test/login/verify";
        assert_eq!(classify(url, r#"<div class="spinner"></div>"#), "unknown");
    }
}
