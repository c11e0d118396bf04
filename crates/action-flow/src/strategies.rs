//! Backoff and cancellable waiting

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::FlowError;

/// Sleep for `delay` unless `cancel` fires first.
pub async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<(), FlowError> {
    if cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(FlowError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fixed delay between step retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), FlowError> {
        pause(cancel, self.delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pause_completes_after_delay() {
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();
        pause(&token, Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_interrupted_by_cancellation() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            child.cancel();
        });
        let err = pause(&token, Duration::from_secs(3600)).await.unwrap_err();
        assert!(matches!(err, FlowError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_fast() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(FixedBackoff::new(Duration::ZERO).wait(&token).await.is_err());
    }
}
