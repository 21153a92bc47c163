//! Two-tier result cache.
//!
//! Reads check the in-process LRU tier first, then the durable tier, promoting
//! durable hits into memory. Expired entries count as misses and are removed
//! when encountered. Durable-tier failures are logged and absorbed: a read
//! failure is a miss, a corrupt record is deleted, and the only write path that
//! reports failure is [`ResultCache::put`], which callers treat as best-effort.

mod durable;
mod key;
mod memory;
mod warehouse_tier;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

pub use durable::{DurableFuture, DurableTier, FileTier};
pub use key::{normalize, CacheKey};
pub use memory::MemoryTier;
pub use warehouse_tier::WarehouseTier;

use crate::clock::SharedClock;
use crate::{AnalysisResult, CacheError, Operation};

/// A cached result and its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: AnalysisResult,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    /// Per-operation TTL. A zero TTL disables caching for that operation.
    pub ttls: BTreeMap<Operation, Duration>,
    /// Deadline for each durable-tier call.
    pub durable_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1_024,
            ttls: BTreeMap::from([
                (Operation::Sentiment, Duration::from_secs(60 * 60)),
                (Operation::Keywords, Duration::from_secs(6 * 60 * 60)),
                (Operation::Summary, Duration::from_secs(24 * 60 * 60)),
            ]),
            durable_timeout: Duration::from_secs(2),
        }
    }
}

/// Which entries [`ResultCache::invalidate`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(CacheKey),
    Operation(Operation),
    All,
}

impl Display for Invalidation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key {key}"),
            Self::Operation(operation) => write!(f, "operation {operation}"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Entries removed by an invalidation, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub memory: usize,
    pub durable: usize,
}

/// Content-addressed, TTL-bound result cache.
#[derive(Debug)]
pub struct ResultCache {
    memory: MemoryTier,
    durable: Option<Arc<dyn DurableTier>>,
    config: CacheConfig,
    clock: SharedClock,
}

impl ResultCache {
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            memory: MemoryTier::new(config.memory_capacity),
            durable: None,
            config,
            clock,
        }
    }

    pub fn with_durable(mut self, tier: Arc<dyn DurableTier>) -> Self {
        self.durable = Some(tier);
        self
    }

    pub fn ttl_for(&self, operation: Operation) -> Duration {
        self.config
            .ttls
            .get(&operation)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn durable_tier(&self) -> Option<&Arc<dyn DurableTier>> {
        self.durable.as_ref()
    }

    /// Look up a live entry. Never fails; every tier problem reads as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let now = self.clock.wall_now();

        if let Some(entry) = self.memory.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value);
            }
            debug!(%key, "memory entry expired");
            self.memory.remove(key);
        }

        let tier = self.durable.as_ref()?;
        match self.bounded(tier.load(key)).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                debug!(%key, tier = tier.name(), "durable hit promoted to memory");
                let value = entry.value.clone();
                self.memory.insert(entry);
                Some(value)
            }
            Ok(Some(_)) => {
                debug!(%key, tier = tier.name(), "durable entry expired");
                self.discard(tier, key).await;
                None
            }
            Ok(None) => None,
            Err(error) if error.is_corrupt() => {
                warn!(%key, tier = tier.name(), %error, "discarding corrupt cache record");
                self.discard(tier, key).await;
                None
            }
            Err(error) => {
                warn!(%key, tier = tier.name(), %error, "durable cache read failed");
                None
            }
        }
    }

    /// Store `value` with its operation's TTL.
    ///
    /// The memory tier is always updated; the error only reports the durable write.
    pub async fn put(&self, key: CacheKey, value: &AnalysisResult) -> Result<(), CacheError> {
        let ttl = self.ttl_for(value.operation());
        if ttl.is_zero() {
            return Ok(());
        }

        let created_at = self.clock.wall_now();
        let entry = CacheEntry {
            key,
            value: AnalysisResult {
                from_cache: false,
                ..value.clone()
            },
            created_at,
            expires_at: expiry(created_at, ttl),
        };

        self.memory.insert(entry.clone());
        match &self.durable {
            Some(tier) => self.bounded(tier.store(&entry)).await,
            None => Ok(()),
        }
    }

    /// Remove entries from both tiers.
    pub async fn invalidate(&self, scope: &Invalidation) -> Result<InvalidationReport, CacheError> {
        let memory = match scope {
            Invalidation::Key(key) => usize::from(self.memory.remove(key)),
            Invalidation::Operation(operation) => {
                self.memory.remove_prefix(&CacheKey::prefix(*operation))
            }
            Invalidation::All => self.memory.clear(),
        };

        let durable = match &self.durable {
            None => 0,
            Some(tier) => match scope {
                Invalidation::Key(key) => usize::from(self.bounded(tier.remove(key)).await?),
                Invalidation::Operation(operation) => {
                    let prefix = CacheKey::prefix(*operation);
                    self.bounded(tier.remove_prefix(&prefix)).await?
                }
                Invalidation::All => self.bounded(tier.clear()).await?,
            },
        };

        debug!(%scope, memory, durable, "cache invalidated");
        Ok(InvalidationReport { memory, durable })
    }

    async fn discard(&self, tier: &Arc<dyn DurableTier>, key: &CacheKey) {
        if let Err(error) = self.bounded(tier.remove(key)).await {
            warn!(%key, tier = tier.name(), %error, "failed to delete cache record");
        }
    }

    async fn bounded<T>(&self, call: DurableFuture<'_, T>) -> Result<T, CacheError> {
        let timeout = self.config.durable_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| CacheError::Timeout {
                timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            })?
    }
}

fn expiry(created_at: OffsetDateTime, ttl: Duration) -> OffsetDateTime {
    time::Duration::try_from(ttl)
        .ok()
        .and_then(|ttl| created_at.checked_add(ttl))
        .unwrap_or_else(|| time::PrimitiveDateTime::MAX.assume_utc())
}
