use serde_json::{json, Value};

use crate::commands::CommandOutput;
use crate::error::CliError;

pub fn render(output: &CommandOutput, pretty: bool) -> Result<(), CliError> {
    match output {
        CommandOutput::Json(value) => println!("{}", to_json(value, pretty)?),
        CommandOutput::Text(text) => print!("{text}"),
    }
    Ok(())
}

/// Print a failure as a JSON document on stderr.
pub fn render_error(error: &CliError, pretty: bool) -> Result<(), CliError> {
    let mut document = json!({
        "error": {
            "code": error.code(),
            "message": error.to_string(),
            "exit_code": error.exit_code(),
        }
    });
    if let CliError::Analysis(analysis) = error {
        document["error"]["http_status"] = json!(analysis.http_status());
        document["error"]["retryable"] = json!(analysis.retryable_later());
    }

    eprintln!("{}", to_json(&document, pretty)?);
    Ok(())
}

fn to_json(value: &Value, pretty: bool) -> Result<String, CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(payload)
}
