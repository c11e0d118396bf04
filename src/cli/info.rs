use std::sync::Arc;

use action_flow::LogStatusSink;
use anyhow::Result;
use serde::Serialize;

use crate::automation::AutomationRegistry;
use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};
use crate::sim::Scenario;

#[derive(Serialize)]
struct Info<'a> {
    version: &'static str,
    build_date: &'static str,
    git_hash: &'static str,
    automations: Vec<&'a str>,
    scenarios: Vec<&'static str>,
    concurrency: usize,
}

pub async fn cmd_info(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let registry = AutomationRegistry::demo(ctx.config(), Arc::new(LogStatusSink))?;
    let info = Info {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        git_hash: env!("GIT_HASH"),
        automations: registry.names(),
        scenarios: Scenario::ALL.iter().map(Scenario::as_str).collect(),
        concurrency: ctx.config().scheduler.concurrency,
    };

    if !print_structured(&format, &info)? {
        println!("PagePilot v{} ({}, built {})", info.version, info.git_hash, info.build_date);
        println!("Automations: {}", info.automations.join(", "));
        println!("Demo scenarios: {}", info.scenarios.join(", "));
        println!("Concurrency limit: {}", info.concurrency);
    }
    Ok(())
}
