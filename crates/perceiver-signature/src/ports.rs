use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::PerceiverError;
use crate::snapshot::PageCapture;

/// Browser capability consumed by the engine.
///
/// Implementations own navigation, DOM serialization and any human-like
/// pacing; every action is bounded by the supplied timeout.
#[async_trait]
pub trait PagePort: Send + Sync {
    async fn current_url(&self) -> Result<String, PerceiverError>;

    /// Serialize the main document with all frames and shadow roots.
    async fn capture(&self) -> Result<PageCapture, PerceiverError>;

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PerceiverError>;

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), PerceiverError>;

    async fn scroll_into_view(&self, selector: &str, timeout: Duration)
        -> Result<(), PerceiverError>;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PerceiverError>;
}

#[async_trait]
impl<P> PagePort for Arc<P>
where
    P: PagePort + ?Sized,
{
    async fn current_url(&self) -> Result<String, PerceiverError> {
        (**self).current_url().await
    }

    async fn capture(&self) -> Result<PageCapture, PerceiverError> {
        (**self).capture().await
    }

    async fn click(&self, selector: &str, timeout: Duration) -> Result<(), PerceiverError> {
        (**self).click(selector, timeout).await
    }

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), PerceiverError> {
        (**self).fill(selector, value, timeout).await
    }

    async fn scroll_into_view(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), PerceiverError> {
        (**self).scroll_into_view(selector, timeout).await
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), PerceiverError> {
        (**self).navigate(url, timeout).await
    }
}
