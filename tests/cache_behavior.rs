//! Behavior-driven tests for the two-tier result cache.
//!
//! The memory tier is bounded and least-recently-used; the durable tier
//! survives restarts. Problems in the durable tier must never turn a lookup
//! into an error, only into a miss.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lexis_core::cache::DurableFuture;
use lexis_core::{
    AnalysisPayload, AnalysisResult, CacheConfig, CacheEntry, CacheError, CacheKey, DurableTier,
    FileTier, Invalidation, KeywordResult, KeywordTerm, ManualClock, Operation, Params,
    ResultCache, SentimentResult, SharedClock, SummaryResult, WarehouseConfig, WarehouseTier,
};

fn sentiment(polarity: f64) -> AnalysisResult {
    AnalysisResult {
        payload: AnalysisPayload::Sentiment(SentimentResult::from_scores(polarity, 0.5)),
        from_cache: false,
        backend: String::from("lexicon"),
        elapsed_ms: 3,
    }
}

fn summary(text: &str) -> AnalysisResult {
    AnalysisResult {
        payload: AnalysisPayload::Summary(SummaryResult {
            summary: text.to_owned(),
            original_len: text.len() * 4,
            summary_len: text.len(),
            ratio: 0.25,
        }),
        from_cache: false,
        backend: String::from("frequency"),
        elapsed_ms: 9,
    }
}

fn key(operation: Operation, text: &str) -> CacheKey {
    CacheKey::derive(operation, text, &Params::new())
}

fn file_cache(dir: &Path, clock: &Arc<ManualClock>) -> ResultCache {
    ResultCache::new(CacheConfig::default(), SharedClock::new(clock.clone()))
        .with_durable(Arc::new(FileTier::new(dir)))
}

fn record_path(dir: &Path, key: &CacheKey) -> std::path::PathBuf {
    dir.join(format!("{}.json", key.as_str().replace(':', "-")))
}

// =============================================================================
// Memory tier
// =============================================================================

#[tokio::test]
async fn least_recently_used_entry_is_evicted_at_capacity() {
    // Given: A memory-only cache holding two entries
    let clock = Arc::new(ManualClock::new());
    let cache = ResultCache::new(
        CacheConfig {
            memory_capacity: 2,
            ..CacheConfig::default()
        },
        SharedClock::new(clock),
    );
    let (a, b, c) = (
        key(Operation::Sentiment, "a"),
        key(Operation::Sentiment, "b"),
        key(Operation::Sentiment, "c"),
    );
    cache.put(a.clone(), &sentiment(0.1)).await.expect("put a");
    cache.put(b.clone(), &sentiment(0.2)).await.expect("put b");

    // When: `a` is read, then a third entry arrives
    assert!(cache.get(&a).await.is_some());
    cache.put(c.clone(), &sentiment(0.3)).await.expect("put c");

    // Then: `b` was the least recently used and is gone
    assert_eq!(cache.memory_len(), 2);
    assert!(cache.get(&a).await.is_some());
    assert!(cache.get(&b).await.is_none());
    assert!(cache.get(&c).await.is_some());
}

#[tokio::test]
async fn zero_ttl_disables_caching_for_that_operation() {
    // Given: Sentiment results configured with a zero TTL
    let mut config = CacheConfig::default();
    config.ttls.insert(Operation::Sentiment, Duration::ZERO);
    let cache = ResultCache::new(config, SharedClock::new(Arc::new(ManualClock::new())));
    let entry_key = key(Operation::Sentiment, "never stored");

    // When: A result is stored
    cache.put(entry_key.clone(), &sentiment(0.4)).await.expect("put");

    // Then: Nothing is kept
    assert_eq!(cache.memory_len(), 0);
    assert!(cache.get(&entry_key).await.is_none());
}

#[tokio::test]
async fn entries_expire_with_their_operation_ttl() {
    // Given: A sentiment entry (1h) and a summary entry (24h)
    let clock = Arc::new(ManualClock::new());
    let cache = ResultCache::new(CacheConfig::default(), SharedClock::new(clock.clone()));
    let short = key(Operation::Sentiment, "short lived");
    let long = key(Operation::Summary, "long lived");
    cache.put(short.clone(), &sentiment(0.1)).await.expect("put");
    cache.put(long.clone(), &summary("long lived")).await.expect("put");

    // When: Two hours pass
    clock.advance(Duration::from_secs(2 * 60 * 60));

    // Then: Only the summary survives and the expired entry was dropped
    assert!(cache.get(&short).await.is_none());
    assert!(cache.get(&long).await.is_some());
    assert_eq!(cache.memory_len(), 1);
}

// =============================================================================
// File tier
// =============================================================================

#[tokio::test]
async fn file_tier_survives_a_restart() {
    // Given: A result written through one cache instance
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let entry_key = key(Operation::Sentiment, "persist me");
    file_cache(temp.path(), &clock)
        .put(entry_key.clone(), &sentiment(0.7))
        .await
        .expect("put");

    // When: A fresh instance reads the same directory
    let restarted = file_cache(temp.path(), &clock);
    let loaded = restarted.get(&entry_key).await;

    // Then: The result is found and promoted to memory
    assert_eq!(loaded, Some(sentiment(0.7)));
    assert_eq!(restarted.memory_len(), 1);
}

#[tokio::test]
async fn corrupt_record_reads_as_a_miss_and_is_deleted() {
    // Given: Garbage where a record should be
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let entry_key = key(Operation::Keywords, "damaged");
    let path = record_path(temp.path(), &entry_key);
    std::fs::write(&path, b"{ not json").expect("write garbage");

    // When: The key is looked up
    let cache = file_cache(temp.path(), &clock);
    let loaded = cache.get(&entry_key).await;

    // Then: It is a miss and the file is gone
    assert!(loaded.is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn expired_durable_record_is_removed_on_read() {
    // Given: A persisted sentiment result
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let entry_key = key(Operation::Sentiment, "stale");
    file_cache(temp.path(), &clock)
        .put(entry_key.clone(), &sentiment(0.2))
        .await
        .expect("put");
    let path = record_path(temp.path(), &entry_key);
    assert!(path.exists());

    // When: A restarted cache reads it after the TTL
    clock.advance(Duration::from_secs(60 * 60 + 1));
    let loaded = file_cache(temp.path(), &clock).get(&entry_key).await;

    // Then: It is a miss and the record was deleted
    assert!(loaded.is_none());
    assert!(!path.exists());
}

#[tokio::test]
async fn invalidation_by_operation_clears_both_tiers() {
    // Given: Sentiment and summary results in memory and on disk
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let cache = file_cache(temp.path(), &clock);
    let sentiment_key = key(Operation::Sentiment, "one");
    let summary_key = key(Operation::Summary, "two");
    cache.put(sentiment_key.clone(), &sentiment(0.1)).await.expect("put");
    cache.put(summary_key.clone(), &summary("two")).await.expect("put");

    // When: Sentiment results are invalidated
    let report = cache
        .invalidate(&Invalidation::Operation(Operation::Sentiment))
        .await
        .expect("invalidate");

    // Then: Only sentiment entries are gone, from both tiers
    assert_eq!((report.memory, report.durable), (1, 1));
    assert!(cache.get(&sentiment_key).await.is_none());
    assert!(file_cache(temp.path(), &clock).get(&summary_key).await.is_some());

    // And: A full purge removes the rest
    let purge = cache.invalidate(&Invalidation::All).await.expect("purge");
    assert_eq!((purge.memory, purge.durable), (1, 1));
}

#[tokio::test]
async fn cached_values_are_stored_without_the_hit_flag() {
    // Given: A result that was itself served from cache
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::new());
    let cache = file_cache(temp.path(), &clock);
    let entry_key = key(Operation::Sentiment, "flagged");
    let served = AnalysisResult {
        from_cache: true,
        ..sentiment(0.3)
    };

    // When: It is stored and the record is read back from disk
    cache.put(entry_key.clone(), &served).await.expect("put");
    let raw = std::fs::read(record_path(temp.path(), &entry_key)).expect("record");
    let record: CacheEntry = serde_json::from_slice(&raw).expect("decodes");

    // Then: The stored value is a plain provider result
    assert!(!record.value.from_cache);
    assert_eq!(record.key, entry_key);
    assert!(record.expires_at > record.created_at);
}

// =============================================================================
// DuckDB tier
// =============================================================================

#[tokio::test]
async fn warehouse_tier_round_trips_through_duckdb() {
    // Given: A DuckDB-backed cache
    let temp = tempfile::tempdir().expect("tempdir");
    let config = WarehouseConfig {
        db_path: temp.path().join("cache.duckdb"),
        max_pool_size: 2,
    };
    let clock = Arc::new(ManualClock::new());
    let cache = |tier: WarehouseTier| {
        ResultCache::new(CacheConfig::default(), SharedClock::new(clock.clone()))
            .with_durable(Arc::new(tier))
    };
    let keywords = AnalysisResult {
        payload: AnalysisPayload::Keywords(KeywordResult {
            terms: vec![KeywordTerm {
                term: String::from("duckdb"),
                count: 4,
            }],
        }),
        from_cache: false,
        backend: String::from("frequency"),
        elapsed_ms: 2,
    };
    let entry_key = key(Operation::Keywords, "duckdb duckdb duckdb duckdb");

    // When: One instance writes and another reads
    cache(WarehouseTier::open(config.clone()).expect("open"))
        .put(entry_key.clone(), &keywords)
        .await
        .expect("put");
    let reader = cache(WarehouseTier::open(config).expect("reopen"));

    // Then: The record is returned intact and can be invalidated by key
    assert_eq!(reader.get(&entry_key).await, Some(keywords));
    let report = reader
        .invalidate(&Invalidation::Key(entry_key.clone()))
        .await
        .expect("invalidate");
    assert_eq!(report.durable, 1);
}

// =============================================================================
// Failing durable tier
// =============================================================================

#[derive(Debug)]
struct BrokenTier;

impl DurableTier for BrokenTier {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn load<'a>(&'a self, _key: &'a CacheKey) -> DurableFuture<'a, Option<CacheEntry>> {
        Box::pin(async { Err(CacheError::Backend(String::from("disk on fire"))) })
    }

    fn store<'a>(&'a self, _entry: &'a CacheEntry) -> DurableFuture<'a, ()> {
        Box::pin(async { Err(CacheError::Backend(String::from("disk on fire"))) })
    }

    fn remove<'a>(&'a self, _key: &'a CacheKey) -> DurableFuture<'a, bool> {
        Box::pin(async { Err(CacheError::Backend(String::from("disk on fire"))) })
    }

    fn remove_prefix<'a>(&'a self, _prefix: &'a str) -> DurableFuture<'a, usize> {
        Box::pin(async { Err(CacheError::Backend(String::from("disk on fire"))) })
    }

    fn clear(&self) -> DurableFuture<'_, usize> {
        Box::pin(async { Err(CacheError::Backend(String::from("disk on fire"))) })
    }
}

#[tokio::test]
async fn durable_failures_degrade_to_memory_only() {
    // Given: A cache whose durable tier always fails
    let cache = ResultCache::new(
        CacheConfig::default(),
        SharedClock::new(Arc::new(ManualClock::new())),
    )
    .with_durable(Arc::new(BrokenTier));
    let stored = key(Operation::Sentiment, "kept in memory");
    let missing = key(Operation::Sentiment, "never stored");

    // When: A write fails on the durable side
    let write = cache.put(stored.clone(), &sentiment(0.5)).await;

    // Then: The error is reported but memory still serves, and reads never fail
    assert!(matches!(write, Err(CacheError::Backend(_))));
    assert_eq!(cache.get(&stored).await, Some(sentiment(0.5)));
    assert_eq!(cache.get(&missing).await, None);
}

/// Every call outlives any reasonable deadline.
#[derive(Debug)]
struct HangingTier;

async fn hang<T>() -> Result<T, CacheError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Err(CacheError::Backend(String::from("woke up")))
}

impl DurableTier for HangingTier {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn load<'a>(&'a self, _key: &'a CacheKey) -> DurableFuture<'a, Option<CacheEntry>> {
        Box::pin(hang())
    }

    fn store<'a>(&'a self, _entry: &'a CacheEntry) -> DurableFuture<'a, ()> {
        Box::pin(hang())
    }

    fn remove<'a>(&'a self, _key: &'a CacheKey) -> DurableFuture<'a, bool> {
        Box::pin(hang())
    }

    fn remove_prefix<'a>(&'a self, _prefix: &'a str) -> DurableFuture<'a, usize> {
        Box::pin(hang())
    }

    fn clear(&self) -> DurableFuture<'_, usize> {
        Box::pin(hang())
    }
}

#[tokio::test]
async fn hanging_durable_tier_reads_as_a_miss_within_the_deadline() {
    // Given: A durable tier that never answers, bounded at 50ms
    let cache = ResultCache::new(
        CacheConfig {
            durable_timeout: Duration::from_millis(50),
            ..CacheConfig::default()
        },
        SharedClock::new(Arc::new(ManualClock::new())),
    )
    .with_durable(Arc::new(HangingTier));
    let stored = key(Operation::Sentiment, "slow disk");

    // When: A lookup and a write are attempted
    let started = std::time::Instant::now();
    let lookup = cache.get(&stored).await;
    let write = cache.put(stored.clone(), &sentiment(0.2)).await;

    // Then: Both give up at the deadline and memory still holds the write
    assert_eq!(lookup, None);
    assert!(matches!(write, Err(CacheError::Timeout { timeout_ms: 50 })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(cache.get(&stored).await, Some(sentiment(0.2)));
}
