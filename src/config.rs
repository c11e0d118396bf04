//! Layered configuration
//!
//! Built-in defaults, then an optional YAML/TOML file, then `PAGEPILOT__*`
//! environment variables (`PAGEPILOT__SCHEDULER__CONCURRENCY=8`).

use std::path::Path;
use std::time::Duration;

use action_flow::FlowConfig;
use config::{Config, Environment, File, FileFormat, FileSourceFile};
use pagepilot_scheduler::SchedulerConfig;
use perceiver_signature::{ClassifierConfig, DEFAULT_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::errors::PagePilotError;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_STEM: &str = "pagepilot";

pub const ENV_PREFIX: &str = "PAGEPILOT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePilotConfig {
    pub scheduler: SchedulerSection,
    pub classifier: ClassifierSection,
    pub flow: FlowSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub concurrency: usize,
    pub history_limit: usize,
    pub job_timeout_secs: Option<u64>,
    pub stop_grace_ms: u64,
    pub event_buffer: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            concurrency: 4,
            history_limit: 100,
            job_timeout_secs: None,
            stop_grace_ms: 2000,
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub threshold: f64,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    pub retry_backoff_ms: u64,
    /// Invocations allowed per step, first attempt included.
    pub max_retries: u32,
    pub max_deviation_rounds: u32,
    pub max_handoffs: u32,
    pub state_budget: u32,
    pub idle_backoff_ms: u64,
    pub action_timeout_ms: u64,
    pub captcha_max_wait_secs: u64,
    pub captcha_poll_ms: u64,
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            retry_backoff_ms: 1000,
            max_retries: action_flow::DEFAULT_MAX_RETRIES,
            max_deviation_rounds: 10,
            max_handoffs: 32,
            state_budget: 30,
            idle_backoff_ms: 1500,
            action_timeout_ms: 10_000,
            captcha_max_wait_secs: 1200,
            captcha_poll_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PagePilotConfig {
    /// Loads defaults, then `path` (required when given, otherwise an
    /// optional `pagepilot.{yaml,toml,json}` in the working directory), then
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, PagePilotError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_STEM).required(false),
        };
        Self::build(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn build(
        file: File<FileSourceFile, FileFormat>,
        env: Environment,
    ) -> Result<Self, PagePilotError> {
        let loaded = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(env.separator("__").try_parsing(true))
            .build()?
            .try_deserialize::<Self>()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), PagePilotError> {
        if self.scheduler.concurrency == 0 {
            return Err(PagePilotError::invalid_config(
                "scheduler.concurrency must be at least 1",
            ));
        }
        if self.scheduler.event_buffer == 0 {
            return Err(PagePilotError::invalid_config(
                "scheduler.event_buffer must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            return Err(PagePilotError::invalid_config(
                "classifier.threshold must be within 0.0..=1.0",
            ));
        }
        if self.flow.max_retries == 0 {
            return Err(PagePilotError::invalid_config(
                "flow.max_retries must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.scheduler.concurrency,
            history_limit: self.scheduler.history_limit,
            job_timeout: self.scheduler.job_timeout_secs.map(Duration::from_secs),
            stop_grace: Duration::from_millis(self.scheduler.stop_grace_ms),
            event_buffer: self.scheduler.event_buffer,
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            threshold: self.classifier.threshold,
        }
    }

    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            retry_backoff: Duration::from_millis(self.flow.retry_backoff_ms),
            idle_backoff: Duration::from_millis(self.flow.idle_backoff_ms),
            max_deviation_rounds: self.flow.max_deviation_rounds,
            max_handoffs: self.flow.max_handoffs,
            state_budget: self.flow.state_budget,
            action_timeout: Duration::from_millis(self.flow.action_timeout_ms),
        }
    }

    pub fn captcha_max_wait(&self) -> Duration {
        Duration::from_secs(self.flow.captcha_max_wait_secs)
    }

    pub fn captcha_poll(&self) -> Duration {
        Duration::from_millis(self.flow.captcha_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_map_onto_engine_configs() {
        let config = PagePilotConfig::default();
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
        assert_eq!(config.flow_config(), FlowConfig::default());
        assert_eq!(config.classifier_config(), ClassifierConfig::default());
    }

    #[test]
    fn file_then_environment_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "pagepilot.yaml",
            "scheduler:\n  concurrency: 2\n  job_timeout_secs: 90\nclassifier:\n  threshold: 0.8\n",
        );

        let config = PagePilotConfig::build(
            File::from(path.as_path()).required(true),
            env(&[("PAGEPILOT__SCHEDULER__CONCURRENCY", "6")]),
        )
        .unwrap();

        assert_eq!(config.scheduler.concurrency, 6);
        assert_eq!(config.scheduler.job_timeout_secs, Some(90));
        assert_eq!(config.scheduler.history_limit, 100);
        assert!((config.classifier.threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(
            config.scheduler_config().job_timeout,
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.yaml", "scheduler:\n  concurrency: 0\n");
        let err = PagePilotConfig::build(File::from(path.as_path()).required(true), env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = PagePilotConfig::load(Some(Path::new("/nonexistent/pagepilot.yaml")));
        assert!(err.is_err());
    }
}
