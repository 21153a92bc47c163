use std::fs;
use std::io::{self, Read};

use lexis_core::{AnalysisRequest, Params, ResilientOrchestrator};
use serde_json::Value;

use crate::cli::AnalyzeArgs;
use crate::error::CliError;

pub async fn run(args: &AnalyzeArgs, orchestrator: &ResilientOrchestrator) -> Result<Value, CliError> {
    let text = read_text(args)?;
    let params = Params::from_pairs(&args.params)?;

    let mut request = AnalysisRequest::new(args.operation.into(), text, args.principal.clone())
        .with_params(params);
    if let Some(backend) = &args.backend {
        request = request.with_backend(backend.clone());
    }

    let result = orchestrator.analyze(&request).await?;
    Ok(serde_json::to_value(result)?)
}

fn read_text(args: &AnalyzeArgs) -> Result<String, CliError> {
    if let Some(path) = &args.file {
        return Ok(fs::read_to_string(path)?);
    }
    match args.text.as_deref() {
        Some("-") | None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
        Some(text) => Ok(text.to_owned()),
    }
}
