//! Fakes shared by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pagepilot_core_types::{AccountId, CoreError};
use perceiver_signature::{PageCapture, PagePort, PerceiverError};

use crate::handlers::AccountStatusSink;

pub const TEST_URL: &str = "https://mail.test/";

/// Serves a scripted sequence of documents; the last one repeats.
pub struct ScriptedPage {
    pages: Vec<String>,
    cursor: AtomicUsize,
    clicks: Mutex<Vec<String>>,
}

impl ScriptedPage {
    pub fn new(pages: Vec<&str>) -> Self {
        Self {
            pages: pages.into_iter().map(str::to_string).collect(),
            cursor: AtomicUsize::new(0),
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn captures(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }
}

#[async_trait]
impl PagePort for ScriptedPage {
    async fn current_url(&self) -> Result<String, PerceiverError> {
        Ok(TEST_URL.to_string())
    }

    async fn capture(&self) -> Result<PageCapture, PerceiverError> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let html = self
            .pages
            .get(idx)
            .or_else(|| self.pages.last())
            .cloned()
            .unwrap_or_default();
        Ok(PageCapture::new(TEST_URL, html))
    }

    async fn click(&self, selector: &str, _timeout: Duration) -> Result<(), PerceiverError> {
        self.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn fill(&self, _: &str, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }

    async fn scroll_into_view(&self, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }

    async fn navigate(&self, _: &str, _: Duration) -> Result<(), PerceiverError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    states: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn states(&self) -> Vec<(String, String)> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountStatusSink for RecordingSink {
    async fn set_account_state(&self, account: &AccountId, state: &str) -> Result<(), CoreError> {
        self.states
            .lock()
            .unwrap()
            .push((account.to_string(), state.to_string()));
        Ok(())
    }
}
