mod analyze;
mod cache;
mod config;
mod providers;

use lexis_core::{LexisConfig, OrchestratorBuilder, ResilientOrchestrator};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a command prints on success.
pub enum CommandOutput {
    Json(Value),
    Text(String),
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let config = LexisConfig::load_or_default(cli.config.as_deref())?;

    match &cli.command {
        Command::Analyze(args) => analyze::run(args, &orchestrator(&config)?)
            .await
            .map(CommandOutput::Json),
        Command::Providers => providers::run(&orchestrator(&config)?).map(CommandOutput::Json),
        Command::Cache(args) => cache::run(args, &orchestrator(&config)?)
            .await
            .map(CommandOutput::Json),
        Command::Config(args) => config::run(args, &config),
    }
}

fn orchestrator(config: &LexisConfig) -> Result<ResilientOrchestrator, CliError> {
    Ok(OrchestratorBuilder::from_config(config)?.build()?)
}
