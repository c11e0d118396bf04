use std::sync::Arc;
use std::time::Duration;

use action_flow::{AccountStatusSink, LogStatusSink};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use pagepilot_core_types::AccountId;
use pagepilot_scheduler::{Parameters, Scheduler, SchedulerMetricsSnapshot, SchedulerSnapshot};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::automation::{mail, AutomationRegistry};
use crate::cli::context::CliContext;
use crate::sim::{Scenario, SimulatedBrowser};

/// How often the scheduler is polled once the event stream is gone.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Args, Clone, Debug)]
pub struct DemoArgs {
    /// Number of jobs to submit, one account each
    #[arg(long, default_value_t = 6)]
    pub jobs: usize,

    /// Override scheduler.concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Automation every job runs (login or reach_inbox)
    #[arg(long, default_value = mail::LOGIN_AUTOMATION)]
    pub automation: String,

    /// Scenario for every job; cycles through all scenarios when omitted
    #[arg(long, value_parser = parse_scenario)]
    pub scenario: Option<Scenario>,

    /// Simulated latency of every browser action, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Stop all unfinished jobs after this many milliseconds
    #[arg(long)]
    pub stop_after_ms: Option<u64>,
}

fn parse_scenario(raw: &str) -> Result<Scenario, String> {
    Scenario::ALL
        .into_iter()
        .find(|scenario| scenario.as_str() == raw)
        .ok_or_else(|| {
            let known: Vec<&str> = Scenario::ALL.iter().map(Scenario::as_str).collect();
            format!("unknown scenario '{raw}' (expected one of: {})", known.join(", "))
        })
}

/// One JSON line on stdout.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DemoLine<'a> {
    Snapshot { snapshot: &'a SchedulerSnapshot },
    Summary {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        metrics: SchedulerMetricsSnapshot,
    },
}

pub async fn cmd_demo(args: DemoArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let sink: Arc<dyn AccountStatusSink> = Arc::new(LogStatusSink);
    let registry = AutomationRegistry::demo(config, sink)?;
    if !registry.contains(&args.automation) {
        bail!(
            "unknown automation '{}' (available: {})",
            args.automation,
            registry.names().join(", ")
        );
    }

    let mut scheduler_config = config.scheduler_config();
    if let Some(concurrency) = args.concurrency {
        scheduler_config.concurrency = concurrency.max(1);
    }
    let launcher = SimulatedBrowser::new(Duration::from_millis(args.latency_ms));
    let scheduler = Scheduler::new(scheduler_config, Arc::new(launcher), Arc::new(registry));

    let started_at = Utc::now();
    let (snapshot, mut events) = scheduler.subscribe()?;
    emit(&DemoLine::Snapshot {
        snapshot: &snapshot,
    })?;

    for index in 0..args.jobs {
        let scenario = args
            .scenario
            .unwrap_or(Scenario::ALL[index % Scenario::ALL.len()]);
        let parameters = demo_parameters(scenario);
        let account = AccountId::new(format!("user{index}@mail.example.test"));
        scheduler
            .submit(account, args.automation.clone(), parameters)
            .await?;
    }
    info!(jobs = args.jobs, automation = %args.automation, "demo jobs submitted");

    let stop_timer = async {
        match args.stop_after_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_timer);

    let mut unfinished = args.jobs;
    let mut stopping = false;
    let mut streaming = true;
    while unfinished > 0 {
        tokio::select! {
            event = events.recv(), if streaming => {
                match event {
                    Some(event) => {
                        if event.job.status.is_terminal() {
                            unfinished -= 1;
                        }
                        emit(&event)?;
                    }
                    None => {
                        streaming = false;
                        warn!(
                            unfinished,
                            "event stream dropped (subscriber fell behind), waiting for jobs to finish"
                        );
                    }
                }
            }
            _ = tokio::time::sleep(IDLE_POLL), if !streaming => {
                if scheduler.running_count() + scheduler.queued_count() == 0 {
                    break;
                }
            }
            _ = &mut stop_timer, if !stopping => {
                stopping = true;
                let count = scheduler.stop_all().await?;
                info!(count, "demo stop requested");
            }
        }
    }

    emit(&DemoLine::Summary {
        started_at,
        finished_at: Utc::now(),
        metrics: scheduler.metrics(),
    })?;
    Ok(())
}

fn demo_parameters(scenario: Scenario) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("password".to_string(), json!("demo-password"));
    parameters.insert(Scenario::PARAMETER.to_string(), json!(scenario.as_str()));
    parameters
}

fn emit<T: Serialize>(line: &T) -> Result<()> {
    println!("{}", serde_json::to_string(line)?);
    Ok(())
}
