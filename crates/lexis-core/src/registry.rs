use std::collections::HashMap;
use std::env;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::clock::SharedClock;
use crate::provider::Provider;
use crate::providers::{
    FrequencyKeywords, FrequencySummarizer, LeadSummarizer, LexiconSentiment, RemoteEndpoint,
    RemoteProvider,
};
use crate::Operation;

/// Breaker settings: one default plus per-backend overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakerPolicy {
    pub default: CircuitBreakerConfig,
    pub overrides: HashMap<String, CircuitBreakerConfig>,
}

impl BreakerPolicy {
    pub fn for_backend(&self, backend: &str) -> CircuitBreakerConfig {
        self.overrides.get(backend).copied().unwrap_or(self.default)
    }
}

/// A provider together with the breaker guarding it.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn Provider>,
    pub breaker: Arc<CircuitBreaker>,
}

impl RegisteredProvider {
    pub fn backend(&self) -> &str {
        self.provider.backend()
    }
}

/// Registry row reported by [`ProviderRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSnapshot {
    pub operation: Operation,
    pub backend: String,
    pub breaker_state: CircuitState,
    pub consecutive_failures: u32,
}

type RegistryKey = (Operation, String);

/// `(operation, backend)` to provider map with one breaker per entry.
///
/// Providers are long-lived; registering replaces an existing entry and starts it
/// with a fresh breaker.
pub struct ProviderRegistry {
    entries: RwLock<HashMap<RegistryKey, RegisteredProvider>>,
    breakers: BreakerPolicy,
    clock: SharedClock,
}

impl ProviderRegistry {
    pub fn new(breakers: BreakerPolicy, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            breakers,
            clock,
        }
    }

    /// Registry holding the local providers.
    pub fn with_builtin(breakers: BreakerPolicy, clock: SharedClock) -> Self {
        let registry = Self::new(breakers, clock);
        for provider in builtin_providers() {
            registry.register(provider);
        }
        registry
    }

    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Add or replace a provider. Returns the provider it replaced.
    pub fn register(&self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        let operation = provider.operation();
        let backend = provider.backend().to_owned();
        let breaker = Arc::new(CircuitBreaker::new(
            format!("{backend}/{operation}"),
            self.breakers.for_backend(&backend),
            self.clock.clone(),
        ));

        let previous = self.write().insert(
            (operation, backend.clone()),
            RegisteredProvider { provider, breaker },
        );
        info!(%operation, %backend, replaced = previous.is_some(), "provider registered");
        previous.map(|entry| entry.provider)
    }

    pub fn get(&self, operation: Operation, backend: &str) -> Option<RegisteredProvider> {
        self.read()
            .get(&(operation, backend.to_owned()))
            .cloned()
    }

    pub fn contains(&self, operation: Operation, backend: &str) -> bool {
        self.read().contains_key(&(operation, backend.to_owned()))
    }

    /// Backend names registered for `operation`, sorted.
    pub fn backends_for(&self, operation: Operation) -> Vec<String> {
        let mut backends: Vec<String> = self
            .read()
            .keys()
            .filter(|(registered, _)| *registered == operation)
            .map(|(_, backend)| backend.clone())
            .collect();
        backends.sort();
        backends
    }

    /// Every provider with its breaker state, ordered by operation then backend.
    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        let mut rows: Vec<ProviderSnapshot> = self
            .read()
            .iter()
            .map(|((operation, backend), entry)| ProviderSnapshot {
                operation: *operation,
                backend: backend.clone(),
                breaker_state: entry.breaker.state(),
                consecutive_failures: entry.breaker.consecutive_failures(),
            })
            .collect();
        rows.sort_by(|left, right| {
            (left.operation, &left.backend).cmp(&(right.operation, &right.backend))
        });
        rows
    }

    /// Force a breaker back to Closed. Returns false when no such provider exists.
    pub fn reset_breaker(&self, operation: Operation, backend: &str) -> bool {
        match self.get(operation, backend) {
            Some(entry) => {
                entry.breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RegistryKey, RegisteredProvider>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RegistryKey, RegisteredProvider>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn builtin_providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(LexiconSentiment),
        Arc::new(FrequencySummarizer),
        Arc::new(LeadSummarizer),
        Arc::new(FrequencyKeywords),
    ]
}

/// Builder assembling a registry from built-ins, remote endpoints and custom providers.
///
/// # Environment Variables
///
/// With [`ProviderRegistryBuilder::with_env_keys`], a remote endpoint without an
/// `api_key` reads `LEXIS_REMOTE_<NAME>_API_KEY`, where `<NAME>` is the endpoint
/// name upper-cased with non-alphanumerics replaced by `_`.
pub struct ProviderRegistryBuilder {
    breakers: BreakerPolicy,
    clock: SharedClock,
    include_builtin: bool,
    remote_timeout: Duration,
    remotes: Vec<RemoteEndpoint>,
    custom: Vec<Arc<dyn Provider>>,
    env_keys: bool,
}

impl Default for ProviderRegistryBuilder {
    fn default() -> Self {
        Self {
            breakers: BreakerPolicy::default(),
            clock: SharedClock::default(),
            include_builtin: true,
            remote_timeout: Duration::from_secs(30),
            remotes: Vec::new(),
            custom: Vec::new(),
            env_keys: false,
        }
    }
}

impl ProviderRegistryBuilder {
    pub fn breakers(mut self, breakers: BreakerPolicy) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Leave out the local providers.
    pub fn without_builtin(mut self) -> Self {
        self.include_builtin = false;
        self
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn remote(mut self, endpoint: RemoteEndpoint) -> Self {
        self.remotes.push(endpoint);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.custom.push(provider);
        self
    }

    pub fn with_env_keys(mut self) -> Self {
        self.env_keys = true;
        self
    }

    pub fn build(self) -> ProviderRegistry {
        let registry = ProviderRegistry::new(self.breakers, self.clock);
        if self.include_builtin {
            for provider in builtin_providers() {
                registry.register(provider);
            }
        }
        for mut endpoint in self.remotes {
            if self.env_keys && endpoint.api_key.is_none() {
                endpoint.api_key = env::var(api_key_var(&endpoint.name)).ok();
            }
            registry.register(Arc::new(RemoteProvider::new(endpoint, self.remote_timeout)));
        }
        for provider in self.custom {
            registry.register(provider);
        }
        registry
    }
}

fn api_key_var(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("LEXIS_REMOTE_{normalized}_API_KEY")
}
