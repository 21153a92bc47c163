use lexis_core::{CacheKey, Invalidation, ResilientOrchestrator};
use serde_json::{json, Value};

use crate::cli::{CacheArgs, CacheCommand, PurgeArgs};
use crate::error::CliError;

pub async fn run(args: &CacheArgs, orchestrator: &ResilientOrchestrator) -> Result<Value, CliError> {
    match &args.command {
        CacheCommand::Purge(purge) => {
            let scope = scope(purge)?;
            let report = orchestrator.invalidate_cache(&scope).await?;
            Ok(json!({
                "scope": scope.to_string(),
                "removed": report,
                "durable_tier": orchestrator.cache().durable_tier().map(|tier| tier.name()),
            }))
        }
    }
}

fn scope(args: &PurgeArgs) -> Result<Invalidation, CliError> {
    if let Some(raw) = &args.key {
        let key = CacheKey::parse(raw).ok_or_else(|| {
            CliError::Command(format!("'{raw}' is not a cache key (<operation>:<sha256 hex>)"))
        })?;
        return Ok(Invalidation::Key(key));
    }
    Ok(match args.operation {
        Some(operation) => Invalidation::Operation(operation.into()),
        None => Invalidation::All,
    })
}
