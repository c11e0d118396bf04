use clap::Subcommand;

use super::classify::ClassifyArgs;
use super::config::ConfigArgs;
use super::demo::DemoArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Classify a saved page against a signature set
    Classify(ClassifyArgs),

    /// Run simulated jobs through the scheduler and stream lifecycle events
    Demo(DemoArgs),

    /// Show or validate the effective configuration
    Config(ConfigArgs),

    /// Show version, build and registered automations
    Info,
}
