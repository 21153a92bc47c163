//! File-based configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup that uses only the built-in providers and the memory cache.
//!
//! # Example
//!
//! ```toml
//! [security]
//! max_input_len = 20000
//! block_on_pii = true
//!
//! [rate_limits.summary]
//! limit = 5
//! window_secs = 60
//!
//! [cache]
//! durable = "duckdb"
//!
//! [cache.ttl_secs]
//! sentiment = 600
//!
//! [breaker.overrides."remote:vendor"]
//! failure_threshold = 2
//! reset_timeout_secs = 10
//!
//! [providers.fallbacks]
//! sentiment = "remote:vendor"
//!
//! [[providers.remote]]
//! name = "vendor"
//! operation = "sentiment"
//! url = "https://nlp.example.com/v1/sentiment"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lexis_warehouse::{resolve_lexis_home, WarehouseConfig};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, DurableTier, FileTier, WarehouseTier};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::providers::RemoteEndpoint;
use crate::registry::BreakerPolicy;
use crate::retry::{Backoff, RetryConfig};
use crate::security::{
    KeywordModerator, ModerationCategory, RateLimitConfig, RateLimitRule, SecurityConfig,
};
use crate::{ConfigError, Operation};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LexisConfig {
    /// Data directory; `LEXIS_HOME`, then `$HOME/.lexis`, when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
    pub security: SecuritySection,
    pub rate_limits: RateLimitSection,
    pub cache: CacheSection,
    pub breaker: BreakerSection,
    pub retry: RetrySection,
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecuritySection {
    pub max_input_len: usize,
    pub redact_pii: bool,
    pub block_on_pii: bool,
    pub moderation_threshold: f64,
    /// Replaces the built-in term weights of the listed categories, keyed by
    /// category name (`hate`, `violence`, `sexual`, `self_harm`, `harassment`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub moderation_terms: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for SecuritySection {
    fn default() -> Self {
        let defaults = SecurityConfig::default();
        Self {
            max_input_len: defaults.max_input_len,
            redact_pii: defaults.redact_pii,
            block_on_pii: defaults.block_on_pii,
            moderation_threshold: defaults.moderation_threshold,
            moderation_terms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    pub sentiment: RateLimitRule,
    pub summary: RateLimitRule,
    pub keywords: RateLimitRule,
    pub idle_eviction_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            sentiment: RateLimitRule::per_minute(60),
            summary: RateLimitRule::per_minute(10),
            keywords: RateLimitRule::per_minute(60),
            idle_eviction_secs: 300,
        }
    }
}

impl RateLimitSection {
    fn rule(&self, operation: Operation) -> RateLimitRule {
        match operation {
            Operation::Sentiment => self.sentiment,
            Operation::Summary => self.summary,
            Operation::Keywords => self.keywords,
        }
    }
}

/// Where cache entries survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurableBackend {
    #[default]
    None,
    /// One JSON file per entry.
    File,
    /// A `DuckDB` table.
    Duckdb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub memory_capacity: usize,
    pub durable: DurableBackend,
    /// Directory for `file`, database file for `duckdb`; derived from `home` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_path: Option<PathBuf>,
    pub durable_timeout_ms: u64,
    pub ttl_secs: TtlSection,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            memory_capacity: defaults.memory_capacity,
            durable: DurableBackend::None,
            durable_path: None,
            durable_timeout_ms: millis(defaults.durable_timeout),
            ttl_secs: TtlSection::default(),
        }
    }
}

/// Per-operation TTL in seconds; `0` disables caching for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtlSection {
    pub sentiment: u64,
    pub summary: u64,
    pub keywords: u64,
}

impl Default for TtlSection {
    fn default() -> Self {
        Self {
            sentiment: 60 * 60,
            summary: 24 * 60 * 60,
            keywords: 6 * 60 * 60,
        }
    }
}

impl TtlSection {
    fn secs(&self, operation: Operation) -> u64 {
        match operation {
            Operation::Sentiment => self.sentiment,
            Operation::Summary => self.summary,
            Operation::Keywords => self.keywords,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            reset_timeout_secs: defaults.reset_timeout.as_secs(),
        }
    }
}

impl From<BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::from_secs(settings.reset_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    /// Keyed by backend name.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, BreakerSettings>,
}

impl Default for BreakerSection {
    fn default() -> Self {
        let defaults = BreakerSettings::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            reset_timeout_secs: defaults.reset_timeout_secs,
            overrides: HashMap::new(),
        }
    }
}

impl BreakerSection {
    pub const fn settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold,
            reset_timeout_secs: self.reset_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 3_000,
            jitter: true,
        }
    }
}

/// One optional backend name per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

impl BackendSelection {
    pub fn get(&self, operation: Operation) -> Option<&str> {
        match operation {
            Operation::Sentiment => self.sentiment.as_deref(),
            Operation::Summary => self.summary.as_deref(),
            Operation::Keywords => self.keywords.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersSection {
    pub call_timeout_secs: u64,
    /// Backend used when a request names none.
    pub defaults: BackendSelection,
    /// Backend tried after the selected one fails.
    pub fallbacks: BackendSelection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<RemoteEndpoint>,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            defaults: BackendSelection {
                sentiment: Some(String::from("lexicon")),
                summary: Some(String::from("frequency")),
                keywords: Some(String::from("frequency")),
            },
            fallbacks: BackendSelection {
                summary: Some(String::from("lead")),
                ..BackendSelection::default()
            },
            remote: Vec::new(),
        }
    }
}

impl LexisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` when given, else `<home>/config.toml` when it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = resolve_lexis_home().join("config.toml");
        if candidate.is_file() {
            Self::load(candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if security.max_input_len == 0 {
            return Err(invalid("security.max_input_len must be positive"));
        }
        let threshold = security.moderation_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid("security.moderation_threshold must be in (0, 1]"));
        }
        for (category, terms) in &security.moderation_terms {
            category
                .parse::<ModerationCategory>()
                .map_err(|error| invalid(&format!("security.moderation_terms: {error}")))?;
            if let Some((term, _)) = terms
                .iter()
                .find(|(_, weight)| !(weight.is_finite() && **weight > 0.0))
            {
                return Err(invalid(&format!(
                    "security.moderation_terms.{category}.{term} must be a positive weight"
                )));
            }
        }

        for operation in Operation::ALL {
            let rule = self.rate_limits.rule(operation);
            if rule.limit == 0 || rule.window.is_zero() {
                return Err(invalid(&format!(
                    "rate_limits.{operation} needs a positive limit and window"
                )));
            }
        }
        if self.rate_limits.idle_eviction_secs == 0 {
            return Err(invalid("rate_limits.idle_eviction_secs must be positive"));
        }

        if self.cache.memory_capacity == 0 {
            return Err(invalid("cache.memory_capacity must be positive"));
        }
        if self.cache.durable_timeout_ms == 0 {
            return Err(invalid("cache.durable_timeout_ms must be positive"));
        }

        let default_breaker = self.breaker.settings();
        let breakers = std::iter::once(("breaker", &default_breaker)).chain(
            self.breaker
                .overrides
                .iter()
                .map(|(backend, settings)| (backend.as_str(), settings)),
        );
        for (scope, settings) in breakers {
            if settings.failure_threshold == 0 || settings.reset_timeout_secs == 0 {
                return Err(invalid(&format!(
                    "{scope}: failure_threshold and reset_timeout_secs must be positive"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms cannot exceed retry.max_delay_ms"));
        }

        if self.providers.call_timeout_secs == 0 {
            return Err(invalid("providers.call_timeout_secs must be positive"));
        }
        for operation in Operation::ALL {
            let selected = [
                self.providers.defaults.get(operation),
                self.providers.fallbacks.get(operation),
            ];
            if selected.into_iter().flatten().any(|backend| backend.trim().is_empty()) {
                return Err(invalid(&format!(
                    "providers backend for {operation} cannot be empty"
                )));
            }
        }
        for endpoint in &self.providers.remote {
            if endpoint.name.trim().is_empty() || endpoint.url.trim().is_empty() {
                return Err(invalid("providers.remote entries need a name and url"));
            }
        }
        Ok(())
    }

    pub fn home(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(resolve_lexis_home)
    }

    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig {
            max_input_len: self.security.max_input_len,
            redact_pii: self.security.redact_pii,
            block_on_pii: self.security.block_on_pii,
            moderation_threshold: self.security.moderation_threshold,
        }
    }

    /// Keyword moderator with the configured category overrides. Unknown
    /// category names were rejected by [`LexisConfig::validate`].
    pub fn moderator(&self) -> KeywordModerator {
        let overrides = self
            .security
            .moderation_terms
            .iter()
            .filter_map(|(category, terms)| {
                let category = category.parse::<ModerationCategory>().ok()?;
                Some((category, terms.clone()))
            })
            .collect();
        KeywordModerator::with_overrides(overrides)
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            rules: Operation::ALL
                .into_iter()
                .map(|operation| (operation, self.rate_limits.rule(operation)))
                .collect(),
            idle_eviction_interval: Duration::from_secs(self.rate_limits.idle_eviction_secs),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            memory_capacity: self.cache.memory_capacity,
            ttls: Operation::ALL
                .into_iter()
                .map(|operation| {
                    let ttl = Duration::from_secs(self.cache.ttl_secs.secs(operation));
                    (operation, ttl)
                })
                .collect(),
            durable_timeout: Duration::from_millis(self.cache.durable_timeout_ms),
        }
    }

    /// Open the configured durable tier, if any.
    pub fn durable_tier(&self) -> Result<Option<Arc<dyn DurableTier>>, ConfigError> {
        let home = self.home();
        let tier: Arc<dyn DurableTier> = match self.cache.durable {
            DurableBackend::None => return Ok(None),
            DurableBackend::File => match &self.cache.durable_path {
                Some(dir) => Arc::new(FileTier::new(dir)),
                None => Arc::new(FileTier::in_home(&home)),
            },
            DurableBackend::Duckdb => {
                let mut warehouse = WarehouseConfig::in_home(&home);
                if let Some(path) = &self.cache.durable_path {
                    warehouse.db_path = path.clone();
                }
                Arc::new(WarehouseTier::open(warehouse)?)
            }
        };
        Ok(Some(tier))
    }

    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            default: self.breaker.settings().into(),
            overrides: self
                .breaker
                .overrides
                .iter()
                .map(|(backend, settings)| (backend.clone(), (*settings).into()))
                .collect(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(self.retry.base_delay_ms),
                factor: 2.0,
                max: Duration::from_millis(self.retry.max_delay_ms),
                jitter: self.retry.jitter,
            },
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.call_timeout_secs)
    }

    pub fn default_backend(&self, operation: Operation) -> Option<&str> {
        self.providers.defaults.get(operation)
    }

    pub fn fallback_backend(&self, operation: Operation) -> Option<&str> {
        self.providers.fallbacks.get(operation)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_owned())
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
