//! In-memory browser serving the demo mail provider.
//!
//! Each session walks a small page graph (login, verification spinner,
//! popup, captcha, inbox) chosen by the job's `scenario` parameter. Every
//! action costs `latency` and fails with `SessionClosed` as soon as the
//! session is closed, so forced teardown interrupts in-flight waits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core_types::{CoreError, SessionId};
use pagepilot_scheduler::{BrowserSession, Job, Parameters, SessionLauncher};
use parking_lot::Mutex;
use perceiver_signature::{PageCapture, PagePort, PerceiverError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::automation::mail::{selectors, INBOX_URL, LOGIN_URL};
use crate::automation::PageSession;
use crate::errors::PagePilotError;

const BLANK_URL: &str = "about:blank";
const VERIFY_URL: &str = "https://mail.example.test/login/verify";
const ERROR_URL: &str = "https://mail.example.test/login?error=password";
const CAPTCHA_URL: &str = "https://mail.example.test/challenge/captcha";
const SUSPENDED_URL: &str = "https://mail.example.test/account/suspended";

/// How the simulated provider reacts to a sign-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    #[default]
    Happy,
    Popup,
    Captcha,
    WrongPassword,
    Suspended,
    /// Sign-in never completes; clicks run into their timeout.
    Stall,
    /// The launcher refuses to open a session.
    NoBrowser,
}

impl Scenario {
    pub const PARAMETER: &'static str = "scenario";

    pub const ALL: [Scenario; 7] = [
        Scenario::Happy,
        Scenario::Popup,
        Scenario::Captcha,
        Scenario::WrongPassword,
        Scenario::Suspended,
        Scenario::Stall,
        Scenario::NoBrowser,
    ];

    pub fn from_parameters(parameters: &Parameters) -> Result<Self, PagePilotError> {
        match parameters.get(Self::PARAMETER) {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                PagePilotError::invalid_parameters(format!("{}: {err}", Self::PARAMETER))
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Happy => "happy",
            Scenario::Popup => "popup",
            Scenario::Captcha => "captcha",
            Scenario::WrongPassword => "wrong_password",
            Scenario::Suspended => "suspended",
            Scenario::Stall => "stall",
            Scenario::NoBrowser => "no_browser",
        }
    }

    /// Page shown once the verification spinner goes away.
    fn after_sign_in(&self) -> Screen {
        match self {
            Scenario::Popup => Screen::Popup,
            Scenario::Captcha => Screen::Captcha,
            Scenario::WrongPassword => Screen::WrongPassword,
            Scenario::Suspended => Screen::Suspended,
            _ => Screen::Inbox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    Login,
    Verifying,
    WrongPassword,
    Captcha,
    Suspended,
    Popup,
    Inbox,
}

impl Screen {
    fn url(&self) -> &'static str {
        match self {
            Screen::Blank => BLANK_URL,
            Screen::Login => LOGIN_URL,
            Screen::Verifying => VERIFY_URL,
            Screen::WrongPassword => ERROR_URL,
            Screen::Captcha => CAPTCHA_URL,
            Screen::Suspended => SUSPENDED_URL,
            Screen::Popup | Screen::Inbox => INBOX_URL,
        }
    }

    fn html(&self) -> &'static str {
        match self {
            Screen::Blank => "<html><body></body></html>",
            Screen::Login => {
                r#"<html><body><form id="login-form">
                <input id="email" type="email"><input id="password" type="password">
                <button id="sign-in">Sign in</button></form></body></html>"#
            }
            Screen::Verifying => r#"<html><body><div class="spinner"></div></body></html>"#,
            Screen::WrongPassword => {
                r#"<html><body><form id="login-form">
                <p class="login-error">Wrong password. Try again or reset it.</p>
                <input id="email" type="email"><input id="password" type="password">
                <button id="sign-in">Sign in</button></form></body></html>"#
            }
            Screen::Captcha => {
                r#"<html><body><h1>Confirm you are human</h1>
                <iframe id="captcha-frame" src="/challenge/frame"></iframe></body></html>"#
            }
            Screen::Suspended => {
                r#"<html><body><div id="suspended-notice">This account has been suspended.</div>
                </body></html>"#
            }
            Screen::Popup => {
                r#"<html><body><ul id="message-list"><li class="message">Welcome</li></ul>
                <div id="promo-modal"><p>Try the new app!</p>
                <button id="dismiss-popup">No thanks</button></div></body></html>"#
            }
            Screen::Inbox => {
                r#"<html><body><ul id="message-list"><li class="message">Welcome</li></ul>
                </body></html>"#
            }
        }
    }

    fn has(&self, selector: &str) -> bool {
        match self {
            Screen::Login | Screen::WrongPassword => matches!(
                selector,
                selectors::EMAIL | selectors::PASSWORD | selectors::SIGN_IN
            ),
            Screen::Popup => selector == selectors::DISMISS_POPUP,
            _ => false,
        }
    }
}

struct PageState {
    screen: Screen,
    email: Option<String>,
    password: Option<String>,
    captcha_left: u32,
}

pub struct SimPage {
    scenario: Scenario,
    latency: Duration,
    captcha_captures: u32,
    state: Mutex<PageState>,
    closed: CancellationToken,
}

impl SimPage {
    pub fn new(scenario: Scenario, latency: Duration, captcha_captures: u32) -> Self {
        Self {
            scenario,
            latency,
            captcha_captures,
            state: Mutex::new(PageState {
                screen: Screen::Blank,
                email: None,
                password: None,
                captcha_left: captcha_captures,
            }),
            closed: CancellationToken::new(),
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn settle(&self) -> Result<(), PerceiverError> {
        if self.closed.is_cancelled() {
            return Err(PerceiverError::SessionClosed);
        }
        tokio::select! {
            _ = self.closed.cancelled() => Err(PerceiverError::SessionClosed),
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }

    async fn hang(&self, action: &str, timeout: Duration) -> Result<(), PerceiverError> {
        tokio::select! {
            _ = self.closed.cancelled() => Err(PerceiverError::SessionClosed),
            _ = tokio::time::sleep(timeout) => Err(PerceiverError::Timeout {
                action: action.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn require(&self, screen: Screen, selector: &str) -> Result<(), PerceiverError> {
        if screen.has(selector) {
            Ok(())
        } else {
            Err(PerceiverError::ElementNotFound(selector.to_string()))
        }
    }
}

#[async_trait]
impl PagePort for SimPage {
    async fn current_url(&self) -> Result<String, PerceiverError> {
        self.settle().await?;
        Ok(self.state.lock().screen.url().to_string())
    }

    async fn capture(&self) -> Result<PageCapture, PerceiverError> {
        self.settle().await?;
        let mut state = self.state.lock();
        let shown = state.screen;
        match shown {
            Screen::Verifying => state.screen = self.scenario.after_sign_in(),
            Screen::Captcha => {
                state.captcha_left = state.captcha_left.saturating_sub(1);
                if state.captcha_left == 0 {
                    debug!("simulated captcha solved");
                    state.screen = Screen::Inbox;
                }
            }
            _ => {}
        }
        Ok(PageCapture::new(shown.url(), shown.html()))
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PerceiverError> {
        self.settle().await?;
        let screen = self.state.lock().screen;
        self.require(screen, selector)?;
        if selector == selectors::SIGN_IN {
            if self.scenario == Scenario::Stall {
                return self.hang("click", timeout).await;
            }
            let mut state = self.state.lock();
            if state.email.is_none() || state.password.is_none() {
                state.screen = Screen::WrongPassword;
            } else {
                state.screen = Screen::Verifying;
                state.captcha_left = self.captcha_captures;
            }
        } else if selector == selectors::DISMISS_POPUP {
            self.state.lock().screen = Screen::Inbox;
        }
        Ok(())
    }

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), PerceiverError> {
        self.settle().await?;
        let mut state = self.state.lock();
        self.require(state.screen, selector)?;
        match selector {
            selectors::EMAIL => state.email = Some(value.to_string()),
            selectors::PASSWORD => state.password = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }

    async fn scroll_into_view(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<(), PerceiverError> {
        self.settle().await?;
        let screen = self.state.lock().screen;
        self.require(screen, selector)
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), PerceiverError> {
        self.settle().await?;
        let mut state = self.state.lock();
        state.screen = if url.starts_with(LOGIN_URL) {
            Screen::Login
        } else if url.starts_with(INBOX_URL) && state.screen == Screen::Inbox {
            Screen::Inbox
        } else if url.starts_with(INBOX_URL) {
            Screen::Login
        } else {
            Screen::Blank
        };
        Ok(())
    }
}

pub struct SimSession {
    id: SessionId,
    page: Arc<SimPage>,
}

impl SimSession {
    pub fn new(page: SimPage) -> Self {
        Self {
            id: SessionId::new(),
            page: Arc::new(page),
        }
    }

    pub fn sim_page(&self) -> &Arc<SimPage> {
        &self.page
    }
}

#[async_trait]
impl BrowserSession for SimSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    async fn close(&self) -> Result<(), CoreError> {
        if !self.page.is_closed() {
            debug!(session = %self.id, "closing simulated session");
            self.page.close();
        }
        Ok(())
    }
}

impl PageSession for SimSession {
    fn page(&self) -> Arc<dyn PagePort> {
        self.page.clone()
    }
}

/// Opens one [`SimSession`] per job.
#[derive(Debug, Clone)]
pub struct SimulatedBrowser {
    latency: Duration,
    captcha_captures: u32,
}

impl SimulatedBrowser {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            captcha_captures: 3,
        }
    }

    /// Captures the captcha page survives before the "human" solves it.
    pub fn with_captcha_captures(mut self, captures: u32) -> Self {
        self.captcha_captures = captures.max(1);
        self
    }
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl SessionLauncher for SimulatedBrowser {
    type Session = SimSession;

    async fn launch(&self, job: &Job) -> Result<SimSession, CoreError> {
        let scenario = Scenario::from_parameters(&job.parameters)?;
        if scenario == Scenario::NoBrowser {
            return Err(CoreError::new("no browser profile available"));
        }
        tokio::time::sleep(self.latency).await;
        Ok(SimSession::new(SimPage::new(
            scenario,
            self.latency,
            self.captcha_captures,
        )))
    }
}
