use super::classify::cmd_classify;
use super::config::cmd_config;
use super::demo::cmd_demo;
use super::env::CliArgs;
use super::info::cmd_info;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Classify(args) => cmd_classify(args, ctx, cli.output.clone()).await,
        Commands::Demo(args) => cmd_demo(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx, cli.output.clone()).await,
        Commands::Info => cmd_info(ctx, cli.output.clone()).await,
    }
}
