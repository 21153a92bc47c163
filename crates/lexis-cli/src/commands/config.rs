use lexis_core::LexisConfig;
use serde_json::json;

use super::CommandOutput;
use crate::cli::{ConfigArgs, ConfigCommand};
use crate::error::CliError;

pub fn run(args: &ConfigArgs, config: &LexisConfig) -> Result<CommandOutput, CliError> {
    match args.command {
        ConfigCommand::Show => Ok(CommandOutput::Text(config.to_toml_string()?)),
        ConfigCommand::Check => {
            config.validate()?;
            Ok(CommandOutput::Json(json!({
                "valid": true,
                "home": config.home().display().to_string(),
                "durable": config.cache.durable,
                "remote_endpoints": config.providers.remote.len(),
            })))
        }
    }
}
