use async_trait::async_trait;
use perceiver_signature::PagePort;

use crate::errors::FlowError;
use crate::types::{FlowContext, StepResult, DEFAULT_MAX_RETRIES};

/// One atomic, retryable automation action.
///
/// Expected failure modes resolve to a [`StepResult`]; `Err` is reserved for
/// cancellation and failures nothing inside the flow can recover from.
#[async_trait]
pub trait Step<C>: Send + Sync {
    fn name(&self) -> &str;

    /// Total invocations allowed while the step keeps answering `Retry`.
    fn max_retries(&self) -> u32 {
        DEFAULT_MAX_RETRIES
    }

    async fn run(
        &self,
        page: &dyn PagePort,
        ctx: &mut FlowContext<C>,
    ) -> Result<StepResult, FlowError>;
}
