use std::sync::Arc;
use std::time::Duration;

use action_flow::{account_states, AccountStatusSink, FlowOutcome};
use async_trait::async_trait;
use pagepilot::automation::mail;
use pagepilot::{
    AutomationRegistry, PagePilotConfig, PagePilotError, Scenario, SimPage, SimulatedBrowser,
};
use pagepilot_core_types::{AccountId, CoreError};
use pagepilot_scheduler::{
    Job, JobContext, JobEvent, JobStatus, Parameters, ProgressReporter, Scheduler,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);

impl RecordingSink {
    fn states(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[async_trait]
impl AccountStatusSink for RecordingSink {
    async fn set_account_state(&self, _account: &AccountId, state: &str) -> Result<(), CoreError> {
        self.0.lock().push(state.to_string());
        Ok(())
    }
}

fn fast_config() -> PagePilotConfig {
    let mut config = PagePilotConfig::default();
    config.flow.retry_backoff_ms = 10;
    config.flow.idle_backoff_ms = 10;
    config.flow.action_timeout_ms = 200;
    config.flow.captcha_poll_ms = 10;
    config.flow.captcha_max_wait_secs = 5;
    config.scheduler.stop_grace_ms = 100;
    config
}

fn parameters(scenario: Scenario) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("password".into(), json!("secret"));
    parameters.insert(Scenario::PARAMETER.into(), json!(scenario.as_str()));
    parameters
}

async fn run_flow(
    automation: &str,
    scenario: Scenario,
) -> (Result<FlowOutcome, PagePilotError>, Vec<String>) {
    let sink = Arc::new(RecordingSink::default());
    let registry = AutomationRegistry::demo(&fast_config(), sink.clone()).unwrap();
    let page = SimPage::new(scenario, Duration::from_millis(5), 2);
    let job = Job::new(
        AccountId::from("user@mail.example.test"),
        automation,
        parameters(scenario),
    );
    let ctx = JobContext::new(
        &job,
        CancellationToken::new(),
        ProgressReporter::detached(job.id.clone()),
    );
    let outcome = registry.execute(&page, &ctx).await;
    (outcome, sink.states())
}

#[tokio::test(start_paused = true)]
async fn login_reaches_inbox() {
    let (outcome, states) = run_flow(mail::LOGIN_AUTOMATION, Scenario::Happy).await;
    let outcome = outcome.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.message);
    assert_eq!(outcome.runs_of("submit"), 1);
    assert_eq!(outcome.runs_of("confirm_inbox"), 1);
    assert!(states.is_empty());
}

#[tokio::test(start_paused = true)]
async fn login_dismisses_popup_on_the_way() {
    let (outcome, _) = run_flow(mail::LOGIN_AUTOMATION, Scenario::Popup).await;
    let outcome = outcome.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.message);
    assert_eq!(outcome.runs_of("confirm_inbox"), 2);
}

#[tokio::test(start_paused = true)]
async fn login_waits_out_captcha() {
    let (outcome, states) = run_flow(mail::LOGIN_AUTOMATION, Scenario::Captcha).await;
    assert!(outcome.unwrap().is_success());
    assert_eq!(states, vec![account_states::CAPTCHA_REQUIRED.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn wrong_password_aborts_and_records_state() {
    let (outcome, states) = run_flow(mail::LOGIN_AUTOMATION, Scenario::WrongPassword).await;
    let outcome = outcome.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.message.as_deref(), Some("wrong password"));
    assert_eq!(states, vec![account_states::WRONG_PASSWORD.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn stalled_submit_exhausts_retries() {
    let (outcome, _) = run_flow(mail::LOGIN_AUTOMATION, Scenario::Stall).await;
    let outcome = outcome.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.runs_of("submit"), 3);
    assert!(outcome.message.unwrap().contains("submit"));
}

#[tokio::test(start_paused = true)]
async fn reach_inbox_handles_every_interstitial() {
    for scenario in [Scenario::Happy, Scenario::Popup, Scenario::Captcha] {
        let (outcome, _) = run_flow(mail::REACH_INBOX_AUTOMATION, scenario).await;
        let outcome = outcome.unwrap();
        assert!(outcome.is_success(), "{scenario:?}: {:?}", outcome.message);
        assert_eq!(outcome.last_state.as_deref(), Some(mail::states::INBOX));
    }
}

#[tokio::test(start_paused = true)]
async fn reach_inbox_stops_on_suspension() {
    let (outcome, states) = run_flow(mail::REACH_INBOX_AUTOMATION, Scenario::Suspended).await;
    let outcome = outcome.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.message.as_deref(), Some("account suspended"));
    assert_eq!(states, vec![account_states::SUSPENDED.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unknown_automation_is_rejected() {
    let (outcome, _) = run_flow("export_contacts", Scenario::Happy).await;
    assert!(matches!(outcome, Err(PagePilotError::UnknownAutomation(name)) if name == "export_contacts"));
}

async fn terminal_jobs(events: &mut mpsc::Receiver<JobEvent>, count: usize) -> Vec<Job> {
    let mut done = Vec::new();
    while done.len() < count {
        let event = events.recv().await.expect("event stream closed");
        if event.job.status.is_terminal() {
            done.push(event.job);
        }
    }
    done
}

fn scheduler(
    config: &PagePilotConfig,
) -> Scheduler<SimulatedBrowser, AutomationRegistry> {
    let registry = AutomationRegistry::demo(config, Arc::new(RecordingSink::default())).unwrap();
    Scheduler::new(
        config.scheduler_config(),
        Arc::new(SimulatedBrowser::new(Duration::from_millis(5)).with_captcha_captures(2)),
        Arc::new(registry),
    )
}

#[tokio::test(start_paused = true)]
async fn scheduler_runs_flows_end_to_end() {
    let config = fast_config();
    let scheduler = scheduler(&config);
    let (_, mut events) = scheduler.subscribe().unwrap();

    let cases = [
        ("happy@mail.example.test", Scenario::Happy),
        ("wrong@mail.example.test", Scenario::WrongPassword),
        ("nobrowser@mail.example.test", Scenario::NoBrowser),
    ];
    for (account, scenario) in cases {
        scheduler
            .submit(
                AccountId::from(account),
                mail::LOGIN_AUTOMATION,
                parameters(scenario),
            )
            .await
            .unwrap();
    }

    let done = terminal_jobs(&mut events, 3).await;
    let find = |account: &str| {
        done.iter()
            .find(|job| job.account_id.as_str() == account)
            .cloned()
            .unwrap()
    };

    let happy = find("happy@mail.example.test");
    assert_eq!(happy.status, JobStatus::Completed);
    assert_eq!(happy.progress, 100);

    let wrong = find("wrong@mail.example.test");
    assert_eq!(wrong.status, JobStatus::Failed);
    assert_eq!(wrong.error.as_deref(), Some("wrong password"));

    let no_browser = find("nobrowser@mail.example.test");
    assert_eq!(no_browser.status, JobStatus::Failed);
    assert!(no_browser
        .error
        .unwrap()
        .starts_with("browser session failed to start"));

    let metrics = scheduler.metrics();
    assert_eq!(metrics.completed, 1);
    assert_eq!(metrics.failed, 2);
}

#[tokio::test(start_paused = true)]
async fn stopping_a_stalled_job_closes_its_session() {
    let mut config = fast_config();
    config.flow.action_timeout_ms = 60_000;
    let scheduler = scheduler(&config);
    let (_, mut events) = scheduler.subscribe().unwrap();

    let job = scheduler
        .submit(
            AccountId::from("stuck@mail.example.test"),
            mail::REACH_INBOX_AUTOMATION,
            parameters(Scenario::Stall),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.running_count(), 1);
    assert!(scheduler.stop(&job.id).await.unwrap());

    let done = terminal_jobs(&mut events, 1).await;
    assert_eq!(done[0].id, job.id);
    assert_eq!(done[0].status, JobStatus::Stopped);
    assert!(!scheduler.stop(&job.id).await.unwrap());
}
