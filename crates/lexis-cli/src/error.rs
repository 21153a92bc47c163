use lexis_core::{AnalysisError, CacheError, ConfigError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Analysis(error) => match error {
                AnalysisError::Validation(_) => 2,
                AnalysisError::RateLimited { .. } => 3,
                AnalysisError::ModerationRejected { .. } => 4,
                AnalysisError::CircuitOpen { .. } => 5,
                AnalysisError::Provider { .. } => 6,
            },
            Self::Config(_) => 7,
            Self::Cache(_) => 8,
            Self::Serialization(_) => 9,
            Self::Io(_) => 10,
        }
    }

    /// Stable machine-readable code printed alongside the message.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "cli.validation",
            Self::Analysis(error) => error.code(),
            Self::Config(_) => "cli.config",
            Self::Cache(_) => "cli.cache",
            Self::Command(_) => "cli.command",
            Self::Serialization(_) => "cli.serialization",
            Self::Io(_) => "cli.io",
        }
    }
}
