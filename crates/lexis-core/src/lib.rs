//! # Lexis Core
//!
//! Resilience layer in front of text-analysis providers.
//!
//! ## Overview
//!
//! Every analysis request passes through the same pipeline:
//!
//! - **Screening**: per-principal rate limits, truncation, markup sanitization,
//!   PII redaction and content moderation
//! - **Caching**: content-addressed results with per-operation TTLs, in memory
//!   and optionally on disk
//! - **Protection**: one circuit breaker per provider, bounded retries for
//!   transient failures and a configured fallback backend
//! - **Typed failures**: every error maps to a single HTTP status
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`audit`] | Per-request audit events and sinks |
//! | [`cache`] | Two-tier result cache |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`clock`] | Injectable time source |
//! | [`config`] | TOML configuration |
//! | [`domain`] | Requests, parameters and results |
//! | [`error`] | Error taxonomy |
//! | [`http_client`] | HTTP client abstraction for remote providers |
//! | [`orchestrator`] | The request pipeline |
//! | [`provider`] | Provider trait and error classification |
//! | [`providers`] | Built-in and remote providers |
//! | [`registry`] | Provider registry |
//! | [`retry`] | Backoff and retry |
//! | [`security`] | Input screening |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lexis_core::{AnalysisRequest, ResilientOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = ResilientOrchestrator::with_defaults()?;
//!
//!     let request = AnalysisRequest::sentiment("great news today", "u1");
//!     let result = orchestrator.analyze(&request).await?;
//!
//!     println!("{:?} via {} (cached: {})", result.payload, result.backend, result.from_cache);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use lexis_core::AnalysisError;
//!
//! fn respond(error: &AnalysisError) -> (u16, String) {
//!     match error {
//!         AnalysisError::RateLimited { retry_after } => {
//!             (429, format!("retry in {}s", retry_after.as_secs()))
//!         }
//!         other => (other.http_status(), other.to_string()),
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Cache keys are SHA-256 digests; raw text is never stored as a key
//! - API keys for remote providers come from configuration or environment
//!   variables and are never logged

pub mod audit;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod security;

// Audit
pub use audit::{AuditEvent, AuditOutcome, AuditSink, MemoryAuditSink, TracingAuditSink};

// Caching
pub use cache::{
    CacheConfig, CacheEntry, CacheKey, DurableTier, FileTier, Invalidation, InvalidationReport,
    ResultCache, WarehouseTier,
};

// Circuit breaker
pub use circuit_breaker::{BreakerCallError, CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Time
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};

// Configuration
pub use config::{DurableBackend, LexisConfig};

// Domain models
pub use domain::{
    AnalysisPayload, AnalysisRequest, AnalysisResult, KeywordResult, KeywordTerm, Operation,
    ParamValue, Params, SentimentLabel, SentimentResult, SummaryResult,
};

// Error types
pub use error::{AnalysisError, CacheError, ConfigError, ProviderFailure, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Orchestration
pub use orchestrator::{OrchestratorBuilder, ResilientOrchestrator, Routes};

// Providers
pub use provider::{Provider, ProviderError, ProviderErrorKind, ProviderFuture};
pub use registry::{BreakerPolicy, ProviderRegistry, ProviderSnapshot, RegisteredProvider};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Screening
pub use security::{SecurityConfig, SecurityGate, SecurityVerdict};

// Warehouse (re-exported from lexis-warehouse)
pub use lexis_warehouse::{WarehouseConfig, WarehouseError};
