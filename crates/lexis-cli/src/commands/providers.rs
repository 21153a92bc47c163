use lexis_core::ResilientOrchestrator;
use serde_json::Value;

use crate::error::CliError;

pub fn run(orchestrator: &ResilientOrchestrator) -> Result<Value, CliError> {
    Ok(serde_json::to_value(orchestrator.breaker_states())?)
}
