//! CLI argument definitions for lexis.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Run sentiment, summary or keyword analysis |
//! | `providers` | List registered backends and breaker states |
//! | `cache` | Invalidate cached results |
//! | `config` | Show or check the effective configuration |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `$LEXIS_HOME/config.toml` | Configuration file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-json` | `false` | Emit diagnostics as JSON lines on stderr |
//!
//! # Examples
//!
//! ```bash
//! lexis analyze sentiment "great news today"
//! lexis analyze summary --file article.txt --param ratio=0.2 --pretty
//! lexis analyze keywords --param top_n=10 - < notes.txt
//! lexis cache purge --operation summary
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lexis_core::Operation;

/// Resilient text analysis from the command line.
#[derive(Debug, Parser)]
#[command(name = "lexis", author, version, about = "Resilient text analysis CLI")]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Emit diagnostics as JSON lines. Verbosity follows `LEXIS_LOG` (default `warn`).
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze text with the configured providers.
    ///
    /// # Examples
    ///
    ///   lexis analyze sentiment "great news today"
    ///   lexis analyze summary --file article.txt --backend lead
    Analyze(AnalyzeArgs),

    /// List registered backends with their circuit breaker state.
    Providers,

    /// Cache management commands.
    Cache(CacheArgs),

    /// Configuration commands.
    Config(ConfigArgs),
}

/// CLI spelling of [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OperationArg {
    Sentiment,
    Summary,
    Keywords,
}

impl From<OperationArg> for Operation {
    fn from(value: OperationArg) -> Self {
        match value {
            OperationArg::Sentiment => Self::Sentiment,
            OperationArg::Summary => Self::Summary,
            OperationArg::Keywords => Self::Keywords,
        }
    }
}

/// Arguments for the `analyze` command.
#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[arg(value_enum)]
    pub operation: OperationArg,

    /// Text to analyze; `-` reads standard input.
    #[arg(conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Backend to use instead of the configured default.
    #[arg(long)]
    pub backend: Option<String>,

    /// Operation parameter as `key=value`; repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Identity charged for rate limiting.
    #[arg(long, default_value = "cli")]
    pub principal: String,
}

/// Arguments for the `cache` command group.
#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache management subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove cached results from every tier.
    Purge(PurgeArgs),
}

/// Arguments for `cache purge`. Without a scope every entry is removed.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Only remove results of this operation.
    #[arg(long, value_enum, conflicts_with = "key")]
    pub operation: Option<OperationArg>,

    /// Only remove this cache key (`<operation>:<digest>`).
    #[arg(long)]
    pub key: Option<String>,
}

/// Arguments for the `config` command group.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Validate the configuration and report the resolved home directory.
    Check,
}
