use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PagePilotConfig;

pub struct CliContext {
    config: Arc<PagePilotConfig>,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: PagePilotConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &PagePilotConfig {
        self.config.as_ref()
    }

    /// `None` when running on defaults, `pagepilot.*` and the environment.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
