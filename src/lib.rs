//! PagePilot: orchestration for browser automations.
//!
//! The engine lives in the workspace crates (signature scoring, flows,
//! scheduler, event bus). This crate wires them together: layered
//! configuration, the automation registry that serves as the scheduler's
//! job runner, an in-memory simulated browser and the `pagepilot` CLI.

pub mod automation;
pub mod cli;
pub mod config;
pub mod errors;
pub mod sim;

pub use automation::{Automation, AutomationRegistry, Credentials, PageSession};
pub use config::PagePilotConfig;
pub use errors::PagePilotError;
pub use sim::{Scenario, SimPage, SimSession, SimulatedBrowser};
