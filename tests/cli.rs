use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn pagepilot() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pagepilot"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output")
}

#[test]
fn info_lists_demo_automations() {
    let assert = pagepilot()
        .args(["--output", "json", "info"])
        .assert()
        .success();
    let value: Value = serde_json::from_str(&stdout_of(&assert)).expect("valid json");
    let automations: Vec<&str> = value["automations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(automations, vec!["login", "reach_inbox"]);
}

#[test]
fn classify_reads_page_and_signatures_from_disk() {
    let dir = tempdir().unwrap();
    let page = dir.path().join("page.html");
    fs::write(
        &page,
        r#"<html><body><div class="consent"><button id="agree">OK</button></div></body></html>"#,
    )
    .unwrap();
    let signatures = dir.path().join("signatures.yaml");
    fs::write(
        &signatures,
        "- name: consent\n  checks:\n    - { selector: \".consent\", weight: 2 }\n    - { selector: \"#agree\", weight: 1 }\n",
    )
    .unwrap();

    let assert = pagepilot()
        .args(["--output", "json", "classify", "--url", "https://example.test/"])
        .arg("--html")
        .arg(&page)
        .arg("--signatures")
        .arg(&signatures)
        .assert()
        .success();
    let value: Value = serde_json::from_str(&stdout_of(&assert)).expect("valid json");
    assert_eq!(value["name"], "consent");
    assert_eq!(value["score"].as_f64(), Some(1.0));
}

#[test]
fn config_file_and_environment_are_layered() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pagepilot.yaml");
    fs::write(&path, "scheduler:\n  concurrency: 2\nflow:\n  state_budget: 12\n").unwrap();

    let assert = pagepilot()
        .env("PAGEPILOT__FLOW__STATE_BUDGET", "7")
        .arg("--config")
        .arg(&path)
        .args(["--output", "json", "config"])
        .assert()
        .success();
    let value: Value = serde_json::from_str(&stdout_of(&assert)).expect("valid json");
    assert_eq!(value["scheduler"]["concurrency"], 2);
    assert_eq!(value["flow"]["state_budget"], 7);
    assert_eq!(value["classifier"]["threshold"], 0.7);
}

#[test]
fn demo_streams_lifecycle_events() {
    let assert = pagepilot()
        .env("PAGEPILOT__FLOW__RETRY_BACKOFF_MS", "5")
        .env("PAGEPILOT__FLOW__IDLE_BACKOFF_MS", "5")
        .args([
            "demo",
            "--jobs",
            "3",
            "--concurrency",
            "2",
            "--scenario",
            "happy",
            "--latency-ms",
            "1",
        ])
        .assert()
        .success();

    let lines: Vec<Value> = stdout_of(&assert)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.first().unwrap()["type"], "snapshot");
    assert_eq!(lines.last().unwrap()["type"], "summary");
    assert_eq!(lines.last().unwrap()["metrics"]["completed"], 3);

    let completed = lines.iter().filter(|line| line["type"] == "completed").count();
    assert_eq!(completed, 3);
    let queued = lines.iter().filter(|line| line["type"] == "queued").count();
    assert_eq!(queued, 3);
}

#[test]
fn demo_outlasts_a_dropped_event_stream() {
    // a one-slot queue overflows while jobs are still being submitted
    let assert = pagepilot()
        .env("PAGEPILOT__SCHEDULER__EVENT_BUFFER", "1")
        .env("PAGEPILOT__FLOW__RETRY_BACKOFF_MS", "5")
        .args([
            "demo",
            "--jobs",
            "3",
            "--concurrency",
            "1",
            "--scenario",
            "happy",
            "--latency-ms",
            "1",
        ])
        .assert()
        .success();

    let output = stdout_of(&assert);
    let summary: Value =
        serde_json::from_str(output.lines().last().unwrap()).expect("summary line");
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["metrics"]["completed"], 3);
    assert_eq!(summary["metrics"]["started"], 3);
}

#[test]
fn unknown_scenario_is_a_usage_error() {
    pagepilot()
        .args(["demo", "--scenario", "bogus"])
        .assert()
        .failure();
}
