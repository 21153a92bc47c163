//! Provider contract and error classification.
//!
//! A provider performs exactly one [`Operation`] for one backend. The
//! orchestrator never inspects provider internals; it only needs the payload
//! or a [`ProviderError`] whose kind says whether retrying could help.
//!
//! # Example Implementation
//!
//! ```rust
//! use std::future::Future;
//! use std::pin::Pin;
//!
//! use lexis_core::{AnalysisPayload, Operation, Params, Provider, ProviderError, SentimentResult};
//!
//! struct Constant;
//!
//! impl Provider for Constant {
//!     fn backend(&self) -> &str {
//!         "constant"
//!     }
//!
//!     fn operation(&self) -> Operation {
//!         Operation::Sentiment
//!     }
//!
//!     fn call<'a>(
//!         &'a self,
//!         _text: &'a str,
//!         _params: &'a Params,
//!     ) -> Pin<Box<dyn Future<Output = Result<AnalysisPayload, ProviderError>> + Send + 'a>> {
//!         Box::pin(async { Ok(AnalysisPayload::Sentiment(SentimentResult::from_scores(0.0, 0.0))) })
//!     }
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{AnalysisPayload, Operation, Params};

/// Boxed future returned by [`Provider::call`].
pub type ProviderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AnalysisPayload, ProviderError>> + Send + 'a>>;

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The call exceeded its deadline.
    Timeout,
    /// The backend could not be reached.
    Connection,
    /// The backend answered but is temporarily unable to serve.
    Unavailable,
    /// The backend throttled the call.
    RateLimited,
    /// The backend rejected the input; retrying the same input cannot succeed.
    InvalidInput,
    /// The backend does not implement the requested operation.
    Unsupported,
    /// The breaker rejected the call without invoking the backend.
    CircuitOpen,
    /// Any other failure, including malformed responses.
    Internal,
}

impl ProviderErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::InvalidInput => "invalid_input",
            Self::Unsupported => "unsupported",
            Self::CircuitOpen => "circuit_open",
            Self::Internal => "internal",
        }
    }
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured provider error used for retry and breaker decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Connection, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unavailable, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidInput, message)
    }

    pub fn unsupported(operation: Operation) -> Self {
        Self::new(
            ProviderErrorKind::Unsupported,
            format!("operation '{operation}' is not supported by this provider"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Internal, message)
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the same call may succeed if simply tried again.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Timeout
                | ProviderErrorKind::Connection
                | ProviderErrorKind::Unavailable
                | ProviderErrorKind::RateLimited
        )
    }

    /// Whether this failure says something about backend health.
    ///
    /// Input rejections are the caller's problem and do not move the breaker.
    pub const fn counts_against_health(&self) -> bool {
        !matches!(
            self.kind,
            ProviderErrorKind::InvalidInput | ProviderErrorKind::Unsupported
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Timeout => "provider.timeout",
            ProviderErrorKind::Connection => "provider.connection",
            ProviderErrorKind::Unavailable => "provider.unavailable",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::InvalidInput => "provider.invalid_input",
            ProviderErrorKind::Unsupported => "provider.unsupported",
            ProviderErrorKind::CircuitOpen => "provider.circuit_open",
            ProviderErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

/// One analysis operation for one backend.
///
/// Implementations must be `Send + Sync`; a single long-lived instance serves
/// every concurrent request and owns any client it needs.
pub trait Provider: Send + Sync {
    /// Backend name, unique per operation.
    fn backend(&self) -> &str;

    /// The operation this provider performs.
    fn operation(&self) -> Operation;

    /// Analyze already-sanitized text with already-validated parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] whose kind classifies it as transient
    /// (timeouts, connection problems, throttling) or permanent.
    fn call<'a>(&'a self, text: &'a str, params: &'a Params) -> ProviderFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ProviderError::timeout("slow").is_transient());
        assert!(ProviderError::connection("refused").is_transient());
        assert!(ProviderError::rate_limited("429").is_transient());
        assert!(!ProviderError::invalid_input("bad").is_transient());
        assert!(!ProviderError::internal("boom").is_transient());
    }

    #[test]
    fn input_rejections_do_not_count_against_health() {
        assert!(!ProviderError::invalid_input("too short").counts_against_health());
        assert!(!ProviderError::unsupported(Operation::Summary).counts_against_health());
        assert!(ProviderError::internal("boom").counts_against_health());
        assert!(ProviderError::timeout("slow").counts_against_health());
    }
}
