use std::fmt;
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::debug;

use super::{CacheEntry, CacheKey};

/// Bounded in-process tier with least-recently-used eviction.
///
/// Eviction is driven by size only; expiry is checked by the caller on read so
/// the injected clock stays authoritative. Pending maintenance runs on every
/// write, which keeps the size bound and recency order exact.
pub struct MemoryTier {
    cache: Cache<CacheKey, CacheEntry>,
    capacity: u64,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1) as u64;
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key: Arc<CacheKey>, _entry, cause| {
                if cause == RemovalCause::Size {
                    debug!(key = %key, "memory tier evicted least recently used entry");
                }
            })
            .build();

        Self { cache, capacity }
    }

    /// Fetch an entry and mark it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get(key)
    }

    /// Insert or replace, evicting the least recently used entry when full.
    pub fn insert(&self, entry: CacheEntry) {
        self.cache.insert(entry.key.clone(), entry);
        self.cache.run_pending_tasks();
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.cache.remove(key).is_some();
        self.cache.run_pending_tasks();
        removed
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let doomed: Vec<Arc<CacheKey>> = self
            .cache
            .iter()
            .filter(|(key, _)| key.as_str().starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.cache.invalidate(key.as_ref());
        }
        self.cache.run_pending_tasks();
        doomed.len()
    }

    pub fn clear(&self) -> usize {
        let removed = self.len();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        removed
    }

    pub fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTier")
            .field("capacity", &self.capacity)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::{AnalysisPayload, AnalysisResult, Operation, Params, SentimentResult};

    fn entry(text: &str) -> CacheEntry {
        let now = OffsetDateTime::now_utc();
        CacheEntry {
            key: CacheKey::derive(Operation::Sentiment, text, &Params::new()),
            value: AnalysisResult {
                payload: AnalysisPayload::Sentiment(SentimentResult::from_scores(0.1, 0.2)),
                from_cache: false,
                backend: String::from("lexicon"),
                elapsed_ms: 3,
            },
            created_at: now,
            expires_at: now + time::Duration::hours(1),
        }
    }

    #[test]
    fn evicts_least_recently_used_on_size_pressure() {
        let tier = MemoryTier::new(2);
        let (a, b, c) = (entry("a"), entry("b"), entry("c"));

        tier.insert(a.clone());
        tier.insert(b.clone());
        assert!(tier.get(&a.key).is_some());

        tier.insert(c.clone());
        tier.cache.run_pending_tasks();

        assert_eq!(tier.len(), 2);
        assert!(tier.get(&a.key).is_some());
        assert!(tier.get(&b.key).is_none());
        assert!(tier.get(&c.key).is_some());
    }

    #[test]
    fn replacing_an_entry_does_not_grow_the_tier() {
        let tier = MemoryTier::new(2);
        let a = entry("a");

        tier.insert(a.clone());
        tier.insert(a.clone());

        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn removes_by_prefix() {
        let tier = MemoryTier::new(8);
        tier.insert(entry("a"));
        tier.insert(entry("b"));

        assert_eq!(tier.remove_prefix("summary:"), 0);
        assert_eq!(tier.remove_prefix("sentiment:"), 2);
        assert!(tier.is_empty());
    }

    #[test]
    fn clear_reports_what_it_dropped() {
        let tier = MemoryTier::new(8);
        tier.insert(entry("a"));
        tier.insert(entry("b"));

        assert_eq!(tier.clear(), 2);
        assert!(tier.is_empty());
    }
}
