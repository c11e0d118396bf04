use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (default)
    Show,

    /// Validate the configuration and exit
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let config = ctx.config();
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            if !print_structured(&format, config)? {
                match ctx.config_path() {
                    Some(path) => println!("Current configuration ({}):", path.display()),
                    None => println!("Current configuration (defaults and environment):"),
                }
                print!("{}", serde_yaml::to_string(config)?);
            }
        }
        ConfigAction::Validate => {
            config.validate()?;
            info!("Configuration validated");
            println!("Configuration is valid");
        }
    }
    Ok(())
}
