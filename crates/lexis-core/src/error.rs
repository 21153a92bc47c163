//! Caller-facing error taxonomy.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderErrorKind;
use crate::security::ModerationCategory;

/// Input and parameter errors. Always caller-fixable, never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("input text cannot be empty")]
    EmptyText,
    #[error("input text is empty after sanitization")]
    EmptyAfterSanitization,
    #[error("principal cannot be empty")]
    EmptyPrincipal,
    #[error("invalid operation '{value}', expected one of sentiment, summary, keywords")]
    UnknownOperation { value: String },
    #[error("no '{backend}' backend is registered for {operation}")]
    UnknownBackend { operation: String, backend: String },
    #[error("parameter '{name}' is not accepted by {operation}")]
    UnknownParameter { operation: String, name: String },
    #[error("parameter '{name}' {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("malformed parameter '{raw}', expected key=value")]
    MalformedParameter { raw: String },
}

/// One failed provider attempt, kept for aggregated reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub backend: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub attempts: u32,
}

impl Display for ProviderFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} after {} attempt(s)",
            self.backend, self.message, self.attempts
        )
    }
}

/// Typed failure returned by [`ResilientOrchestrator::analyze`](crate::ResilientOrchestrator::analyze).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("rate limit exceeded; retry in {:.1}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    #[error("content rejected ({reason})")]
    ModerationRejected {
        reason: String,
        flags: Vec<ModerationCategory>,
    },

    #[error("circuit open for {}", providers.join(", "))]
    CircuitOpen { providers: Vec<String> },

    #[error("all providers failed: {}", join_failures(causes))]
    Provider { causes: Vec<ProviderFailure> },
}

impl AnalysisError {
    /// HTTP status a front end should map this failure to.
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::ModerationRejected { .. } => 422,
            Self::CircuitOpen { .. } => 503,
            Self::Provider { .. } => 502,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "analysis.validation",
            Self::RateLimited { .. } => "analysis.rate_limited",
            Self::ModerationRejected { .. } => "analysis.moderation_rejected",
            Self::CircuitOpen { .. } => "analysis.circuit_open",
            Self::Provider { .. } => "analysis.provider_failed",
        }
    }

    /// Whether the caller may retry the same request later.
    pub const fn retryable_later(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::CircuitOpen { .. } | Self::Provider { .. }
        )
    }
}

fn join_failures(causes: &[ProviderFailure]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Durable-tier and (de)serialization failures. Recovered inside the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cache record could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache record is corrupt: {0}")]
    Corrupt(String),

    #[error("durable cache call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("durable cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// The stored record is unusable and should be deleted.
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Corrupt(_))
    }
}

/// Invalid configuration detected at load or construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Warehouse(#[from] lexis_warehouse::WarehouseError),
}
