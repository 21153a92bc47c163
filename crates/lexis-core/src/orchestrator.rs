//! Request pipeline: screen, look up, call with protection, store.
//!
//! ```text
//! request ──▶ params/backend check ──▶ SecurityGate ──▶ ResultCache ──hit──▶ result
//!                                                          │ miss
//!                                                          ▼
//!                                   primary ─(breaker + retry + deadline)─▶ payload
//!                                      │ open / exhausted                     │
//!                                      ▼                                      ▼
//!                                   fallback ─(fresh retry budget)──────▶ cache put
//! ```
//!
//! Every request, successful or not, produces exactly one [`AuditEvent`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::cache::{
    CacheConfig, CacheKey, DurableTier, Invalidation, InvalidationReport, ResultCache,
};
use crate::circuit_breaker::{BreakerCallError, CircuitState};
use crate::clock::SharedClock;
use crate::config::{BackendSelection, LexisConfig};
use crate::provider::{Provider, ProviderError, ProviderErrorKind};
use crate::providers::RemoteEndpoint;
use crate::registry::{BreakerPolicy, ProviderRegistry, ProviderSnapshot, RegisteredProvider};
use crate::retry::RetryConfig;
use crate::security::{
    KeywordModerator, ModerationCategory, ModerationScorer, RateLimitConfig, SecurityConfig,
    SecurityGate,
};
use crate::{
    AnalysisError, AnalysisPayload, AnalysisRequest, AnalysisResult, CacheError, ConfigError,
    Operation, Params, ProviderFailure, ValidationError,
};

/// Per-operation backend routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routes {
    pub defaults: BackendSelection,
    pub fallbacks: BackendSelection,
}

/// Entry point for analysis requests.
///
/// One instance is shared by every caller; it owns the gate, the cache and the
/// provider registry, and holds no lock across provider or durable-tier calls.
#[derive(Debug)]
pub struct ResilientOrchestrator {
    gate: SecurityGate,
    cache: ResultCache,
    registry: Arc<ProviderRegistry>,
    routes: Routes,
    retry: RetryConfig,
    call_timeout: Duration,
    audit: Arc<dyn AuditSink>,
    clock: SharedClock,
}

/// What one candidate backend produced.
enum Attempt {
    Served(AnalysisPayload),
    /// The breaker refused the first attempt; the provider never ran.
    Open,
    Failed(ProviderFailure),
}

/// Audit fields gathered while a request moves through the pipeline.
struct Trace {
    operation_id: Uuid,
    started: Instant,
    backend: Option<String>,
    breaker_state: Option<CircuitState>,
    moderation_flags: BTreeSet<ModerationCategory>,
}

impl ResilientOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Orchestrator with built-in providers and default policies.
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Analyze one request.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Validation`] for bad input, parameters or backend names
    /// - [`AnalysisError::RateLimited`] when the principal's budget is spent
    /// - [`AnalysisError::ModerationRejected`] when screening refuses the text
    /// - [`AnalysisError::CircuitOpen`] when every candidate breaker is open
    /// - [`AnalysisError::Provider`] when every candidate failed after retries
    ///
    /// Cache problems are never returned; they degrade to a miss or a skipped write.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let mut trace = Trace {
            operation_id: Uuid::new_v4(),
            started: self.clock.now(),
            backend: None,
            breaker_state: None,
            moderation_flags: BTreeSet::new(),
        };

        let outcome = self.run(request, &mut trace).await;
        let elapsed_ms = self.clock.elapsed_ms(trace.started);
        let outcome = outcome.map(|result| AnalysisResult {
            elapsed_ms,
            ..result
        });

        self.audit.record(&AuditEvent {
            operation_id: trace.operation_id,
            principal: request.principal.clone(),
            operation: request.operation,
            outcome: audit_outcome(&outcome),
            backend: trace.backend,
            from_cache: outcome.as_ref().is_ok_and(|result| result.from_cache),
            elapsed_ms,
            moderation_flags: trace.moderation_flags,
            breaker_state: trace.breaker_state,
            error_code: outcome.as_ref().err().map(AnalysisError::code),
        });
        outcome
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        trace: &mut Trace,
    ) -> Result<AnalysisResult, AnalysisError> {
        let operation = request.operation;
        let params = request.params.resolve_for(operation)?;
        let primary = self.primary_backend(request)?;

        let verdict = self
            .gate
            .check(&request.text, &request.principal, operation)?;
        trace.moderation_flags = verdict.moderation_flags.clone();
        if let Some(rejection) = verdict.rejection() {
            return Err(rejection);
        }

        let key = CacheKey::derive(operation, &verdict.sanitized_text, &params);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(%key, backend = %cached.backend, "cache hit");
            trace.backend = Some(cached.backend.clone());
            return Ok(AnalysisResult {
                from_cache: true,
                ..cached
            });
        }

        let mut candidates = vec![primary];
        if let Some(fallback) = self.routes.fallbacks.get(operation) {
            if !candidates.iter().any(|backend| backend == fallback) {
                candidates.push(fallback.to_owned());
            }
        }

        let mut open = Vec::new();
        let mut causes = Vec::new();
        for backend in candidates {
            let Some(entry) = self.registry.get(operation, &backend) else {
                warn!(%operation, %backend, "fallback backend is not registered, skipping");
                continue;
            };

            trace.backend = Some(backend.clone());
            trace.breaker_state = Some(entry.breaker.decision_state());
            let attempt = self
                .attempt(&entry, &verdict.sanitized_text, &params)
                .await;

            match attempt {
                Attempt::Served(payload) => {
                    let result = AnalysisResult {
                        payload,
                        from_cache: false,
                        backend,
                        elapsed_ms: 0,
                    };
                    self.store(key, &result).await;
                    return Ok(result);
                }
                Attempt::Open => {
                    debug!(%operation, %backend, "circuit open, trying next backend");
                    open.push(backend);
                }
                Attempt::Failed(failure) => {
                    warn!(
                        %operation,
                        backend = %failure.backend,
                        kind = failure.kind.as_str(),
                        attempts = failure.attempts,
                        "backend failed"
                    );
                    causes.push(failure);
                }
            }
        }

        if causes.is_empty() {
            return Err(AnalysisError::CircuitOpen { providers: open });
        }
        causes.extend(open.into_iter().map(|backend| ProviderFailure {
            backend,
            kind: ProviderErrorKind::CircuitOpen,
            message: String::from("circuit open"),
            attempts: 0,
        }));
        Err(AnalysisError::Provider { causes })
    }

    fn primary_backend(&self, request: &AnalysisRequest) -> Result<String, ValidationError> {
        let operation = request.operation;
        let backend = match request.backend.as_deref().map(str::trim) {
            Some(explicit) if !explicit.is_empty() => explicit.to_owned(),
            _ => match self.routes.defaults.get(operation) {
                Some(configured) => configured.to_owned(),
                None => self
                    .registry
                    .backends_for(operation)
                    .into_iter()
                    .next()
                    .unwrap_or_default(),
            },
        };

        if !self.registry.contains(operation, &backend) {
            return Err(ValidationError::UnknownBackend {
                operation: operation.to_string(),
                backend,
            });
        }
        Ok(backend)
    }

    /// Run one backend through its breaker with a fresh retry budget.
    async fn attempt(&self, entry: &RegisteredProvider, text: &str, params: &Params) -> Attempt {
        let breaker = entry.breaker.as_ref();
        let provider = entry.provider.as_ref();

        let (outcome, attempts) = self
            .retry
            .run(
                move |_| {
                    breaker.execute(
                        move || self.call_provider(provider, text, params),
                        ProviderError::counts_against_health,
                    )
                },
                |error: &BreakerCallError<ProviderError>| {
                    matches!(error, BreakerCallError::Failed(error) if error.is_transient())
                },
            )
            .await;

        match outcome {
            Ok(payload) => Attempt::Served(payload),
            Err(BreakerCallError::Rejected) if attempts == 1 => Attempt::Open,
            Err(BreakerCallError::Rejected) => Attempt::Failed(ProviderFailure {
                backend: provider.backend().to_owned(),
                kind: ProviderErrorKind::CircuitOpen,
                message: String::from("circuit opened while retrying"),
                attempts: attempts - 1,
            }),
            Err(BreakerCallError::Failed(error)) => Attempt::Failed(ProviderFailure {
                backend: provider.backend().to_owned(),
                kind: error.kind(),
                message: error.message().to_owned(),
                attempts,
            }),
        }
    }

    /// One provider call bounded by the call timeout.
    async fn call_provider(
        &self,
        provider: &dyn Provider,
        text: &str,
        params: &Params,
    ) -> Result<AnalysisPayload, ProviderError> {
        let payload = tokio::time::timeout(self.call_timeout, provider.call(text, params))
            .await
            .map_err(|_| {
                ProviderError::timeout(format!(
                    "{} did not answer within {}ms",
                    provider.backend(),
                    self.call_timeout.as_millis()
                ))
            })??;

        if payload.operation() != provider.operation() {
            return Err(ProviderError::internal(format!(
                "{} returned a {} payload for {}",
                provider.backend(),
                payload.operation(),
                provider.operation()
            )));
        }
        Ok(payload)
    }

    async fn store(&self, key: CacheKey, result: &AnalysisResult) {
        if let Err(error) = self.cache.put(key, result).await {
            warn!(%error, backend = %result.backend, "cache write failed, result not persisted");
        }
    }

    /// Force a breaker back to Closed. Returns false for an unknown provider.
    pub fn reset_breaker(&self, operation: Operation, backend: &str) -> bool {
        self.registry.reset_breaker(operation, backend)
    }

    /// Remove cached results.
    pub async fn invalidate_cache(
        &self,
        scope: &Invalidation,
    ) -> Result<InvalidationReport, CacheError> {
        self.cache.invalidate(scope).await
    }

    pub fn breaker_states(&self) -> Vec<ProviderSnapshot> {
        self.registry.snapshot()
    }

    /// Drop rate-limit state for idle principals now.
    pub fn evict_idle_rate_limits(&self) -> usize {
        self.gate.evict_idle()
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }
}

fn audit_outcome(outcome: &Result<AnalysisResult, AnalysisError>) -> AuditOutcome {
    match outcome {
        Ok(result) if result.from_cache => AuditOutcome::CacheHit,
        Ok(_) => AuditOutcome::Served,
        Err(AnalysisError::Validation(_)) => AuditOutcome::Rejected,
        Err(AnalysisError::RateLimited { .. }) => AuditOutcome::RateLimited,
        Err(AnalysisError::ModerationRejected { .. }) => AuditOutcome::Blocked,
        Err(AnalysisError::CircuitOpen { .. }) => AuditOutcome::CircuitOpen,
        Err(AnalysisError::Provider { .. }) => AuditOutcome::Failed,
    }
}

/// Builder for [`ResilientOrchestrator`].
///
/// Without a registry, [`OrchestratorBuilder::build`] assembles one from the
/// built-in providers, the configured remote endpoints and any providers added
/// with [`OrchestratorBuilder::provider`].
pub struct OrchestratorBuilder {
    security: SecurityConfig,
    rate_limits: RateLimitConfig,
    scorer: Arc<dyn ModerationScorer>,
    cache: CacheConfig,
    durable: Option<Arc<dyn DurableTier>>,
    registry: Option<Arc<ProviderRegistry>>,
    breakers: BreakerPolicy,
    include_builtin: bool,
    remotes: Vec<RemoteEndpoint>,
    providers: Vec<Arc<dyn Provider>>,
    routes: Routes,
    retry: RetryConfig,
    call_timeout: Duration,
    audit: Arc<dyn AuditSink>,
    clock: SharedClock,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        let config = LexisConfig::default();
        Self {
            security: config.security_config(),
            rate_limits: config.rate_limit_config(),
            scorer: Arc::new(KeywordModerator::default()),
            cache: config.cache_config(),
            durable: None,
            registry: None,
            breakers: config.breaker_policy(),
            include_builtin: true,
            remotes: Vec::new(),
            providers: Vec::new(),
            routes: Routes {
                defaults: config.providers.defaults.clone(),
                fallbacks: config.providers.fallbacks.clone(),
            },
            retry: config.retry_config(),
            call_timeout: config.provider_timeout(),
            audit: Arc::new(TracingAuditSink),
            clock: SharedClock::default(),
        }
    }
}

impl OrchestratorBuilder {
    /// Take every policy from `config` and open its durable tier.
    pub fn from_config(config: &LexisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            security: config.security_config(),
            rate_limits: config.rate_limit_config(),
            scorer: Arc::new(config.moderator()),
            cache: config.cache_config(),
            durable: config.durable_tier()?,
            breakers: config.breaker_policy(),
            remotes: config.providers.remote.clone(),
            routes: Routes {
                defaults: config.providers.defaults.clone(),
                fallbacks: config.providers.fallbacks.clone(),
            },
            retry: config.retry_config(),
            call_timeout: config.provider_timeout(),
            ..Self::default()
        })
    }

    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn moderation_scorer(mut self, scorer: Arc<dyn ModerationScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn durable_tier(mut self, tier: Arc<dyn DurableTier>) -> Self {
        self.durable = Some(tier);
        self
    }

    /// Use an existing registry; built-in, remote and custom providers are then ignored.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn breakers(mut self, breakers: BreakerPolicy) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn without_builtin(mut self) -> Self {
        self.include_builtin = false;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace every default and fallback route.
    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    pub fn default_backend(mut self, operation: Operation, backend: impl Into<String>) -> Self {
        *slot(&mut self.routes.defaults, operation) = Some(backend.into());
        self
    }

    pub fn fallback(mut self, operation: Operation, backend: impl Into<String>) -> Self {
        *slot(&mut self.routes.fallbacks, operation) = Some(backend.into());
        self
    }

    pub fn without_fallback(mut self, operation: Operation) -> Self {
        *slot(&mut self.routes.fallbacks, operation) = None;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble the orchestrator.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a configured default or fallback backend
    /// is not registered for its operation.
    pub fn build(self) -> Result<ResilientOrchestrator, ConfigError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let mut builder = ProviderRegistry::builder()
                    .breakers(self.breakers)
                    .clock(self.clock.clone())
                    .remote_timeout(self.call_timeout)
                    .with_env_keys();
                if !self.include_builtin {
                    builder = builder.without_builtin();
                }
                for endpoint in self.remotes {
                    builder = builder.remote(endpoint);
                }
                for provider in self.providers {
                    builder = builder.provider(provider);
                }
                Arc::new(builder.build())
            }
        };

        for operation in Operation::ALL {
            let configured = [
                ("default", self.routes.defaults.get(operation)),
                ("fallback", self.routes.fallbacks.get(operation)),
            ];
            for (role, backend) in configured {
                if let Some(backend) = backend {
                    if !registry.contains(operation, backend) {
                        return Err(ConfigError::Invalid(format!(
                            "{role} backend '{backend}' is not registered for {operation}"
                        )));
                    }
                }
            }
        }

        let gate = SecurityGate::new(
            self.security,
            &self.rate_limits,
            self.scorer,
            self.clock.clone(),
        );
        let mut cache = ResultCache::new(self.cache, self.clock.clone());
        if let Some(tier) = self.durable {
            cache = cache.with_durable(tier);
        }

        Ok(ResilientOrchestrator {
            gate,
            cache,
            registry,
            routes: self.routes,
            retry: self.retry,
            call_timeout: self.call_timeout,
            audit: self.audit,
            clock: self.clock,
        })
    }
}

fn slot(selection: &mut BackendSelection, operation: Operation) -> &mut Option<String> {
    match operation {
        Operation::Sentiment => &mut selection.sentiment,
        Operation::Summary => &mut selection.summary,
        Operation::Keywords => &mut selection.keywords,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::provider::ProviderFuture;
    use crate::SentimentResult;

    #[derive(Debug)]
    struct Flaky {
        backend: &'static str,
        failures_left: AtomicU32,
        calls: AtomicU32,
        error: ProviderError,
    }

    impl Flaky {
        fn new(backend: &'static str, failures: u32, error: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                backend,
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                error,
            })
        }
    }

    impl Provider for Flaky {
        fn backend(&self) -> &str {
            self.backend
        }

        fn operation(&self) -> Operation {
            Operation::Sentiment
        }

        fn call<'a>(&'a self, _text: &'a str, _params: &'a Params) -> ProviderFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let remaining = self.failures_left.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.failures_left.store(remaining - 1, Ordering::SeqCst);
                    return Err(self.error.clone());
                }
                Ok(AnalysisPayload::Sentiment(SentimentResult::from_scores(0.5, 0.5)))
            })
        }
    }

    fn orchestrator(provider: Arc<Flaky>) -> (Arc<MemoryAuditSink>, ResilientOrchestrator) {
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = ResilientOrchestrator::builder()
            .without_builtin()
            .provider(provider.clone())
            .routes(Routes::default())
            .default_backend(Operation::Sentiment, provider.backend)
            .retry(RetryConfig::fixed(Duration::ZERO, 3))
            .audit_sink(audit.clone())
            .build();
        (audit, orchestrator.expect("valid orchestrator"))
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let provider = Flaky::new("flaky", 2, ProviderError::connection("reset"));
        let (audit, orchestrator) = orchestrator(provider.clone());

        let result = orchestrator
            .analyze(&AnalysisRequest::sentiment("a fine day", "u1"))
            .await
            .expect("third attempt succeeds");

        assert_eq!(result.backend, "flaky");
        assert!(!result.from_cache);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(audit.last().map(|event| event.outcome), Some(AuditOutcome::Served));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let provider = Flaky::new("strict", 5, ProviderError::invalid_input("too short"));
        let (_audit, orchestrator) = orchestrator(provider.clone());

        let error = orchestrator
            .analyze(&AnalysisRequest::sentiment("a fine day", "u1"))
            .await
            .expect_err("invalid input");

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        match error {
            AnalysisError::Provider { causes } => {
                assert_eq!(causes.len(), 1);
                assert_eq!(causes[0].kind, ProviderErrorKind::InvalidInput);
                assert_eq!(causes[0].attempts, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_backend_is_a_validation_error_before_rate_limiting() {
        let provider = Flaky::new("only", 0, ProviderError::internal("unused"));
        let (audit, orchestrator) = orchestrator(provider);

        let error = orchestrator
            .analyze(&AnalysisRequest::sentiment("text", "u1").with_backend("missing"))
            .await
            .expect_err("unknown backend");

        assert_eq!(error.http_status(), 400);
        assert_eq!(orchestrator.gate().rate_limiter().tracked(Operation::Sentiment), 0);
        assert_eq!(audit.last().map(|event| event.outcome), Some(AuditOutcome::Rejected));
    }

    #[test]
    fn build_rejects_unregistered_routes() {
        let error = ResilientOrchestrator::builder()
            .fallback(Operation::Sentiment, "nowhere")
            .build()
            .expect_err("fallback not registered");

        assert!(error.to_string().contains("nowhere"));
    }
}
