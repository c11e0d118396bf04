//! Step and flow orchestration
//!
//! A [`Step`] performs one retryable action against a page. Two flow shapes
//! compose steps with deviation handling: [`SequentialFlow`] runs an ordered
//! list and consults the [`HandlerRegistry`] before each attempt, while
//! [`StatefulFlow`] loops classification and handler dispatch until a
//! [`Goal`] holds or its iteration budget runs out.

pub mod errors;
pub mod handlers;
pub mod sequential;
pub mod stateful;
pub mod step;
pub mod strategies;
pub mod types;

#[cfg(test)]
mod testing;

pub use errors::FlowError;
pub use handlers::{
    account_states, AccountStateHandler, AccountStatusSink, CaptchaHandler, DismissPopupHandler,
    HandlerRegistry, LogStatusSink, StateHandler, WaitHandler,
};
pub use sequential::SequentialFlow;
pub use stateful::{Goal, GoalCheck, StatefulFlow};
pub use step::Step;
pub use strategies::{pause, FixedBackoff};
pub use types::{
    FlowConfig, FlowContext, FlowOutcome, FlowStatus, HandlerOutcome, ProgressFn, StepAttempt,
    StepResult, StepStatus, DEFAULT_MAX_RETRIES,
};
