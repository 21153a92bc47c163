use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::Operation;

type KeyedLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, SharedClock, NoOpMiddleware<Instant>>;

/// `limit` requests per `window` for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    #[serde(with = "duration_secs", rename = "window_secs", default = "default_window")]
    pub window: Duration,
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

impl RateLimitRule {
    pub const fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-operation rules plus idle-state eviction cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub rules: BTreeMap<Operation, RateLimitRule>,
    pub idle_eviction_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rules: BTreeMap::from([
                (Operation::Sentiment, RateLimitRule::per_minute(60)),
                (Operation::Keywords, RateLimitRule::per_minute(60)),
                (Operation::Summary, RateLimitRule::per_minute(10)),
            ]),
            idle_eviction_interval: Duration::from_secs(300),
        }
    }
}

/// Per-(principal, operation) request budgets.
///
/// Each operation owns a keyed GCRA limiter; the burst equals the window limit and
/// cells replenish at `window / limit`, which tracks a sliding window without
/// storing request timestamps.
pub struct PrincipalRateLimiter {
    limiters: BTreeMap<Operation, KeyedLimiter>,
    clock: SharedClock,
    idle_eviction_interval: Duration,
    started: Instant,
    /// Milliseconds after `started` of the last eviction sweep.
    last_eviction_ms: AtomicU64,
}

impl PrincipalRateLimiter {
    pub fn new(config: &RateLimitConfig, clock: SharedClock) -> Self {
        let limiters = config
            .rules
            .iter()
            .map(|(operation, rule)| {
                let quota = quota_from_window(rule.window, rule.limit);
                let limiter =
                    RateLimiter::new(quota, DefaultKeyedStateStore::default(), &clock);
                (*operation, limiter)
            })
            .collect();

        Self {
            limiters,
            started: clock.now(),
            last_eviction_ms: AtomicU64::new(0),
            clock,
            idle_eviction_interval: config.idle_eviction_interval,
        }
    }

    /// Consume one request from the budget. `Err` carries the retry-after hint.
    pub fn check(&self, principal: &str, operation: Operation) -> Result<(), Duration> {
        self.maybe_evict_idle();

        let Some(limiter) = self.limiters.get(&operation) else {
            return Ok(());
        };
        match limiter.check_key(&principal.to_owned()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                info!(
                    principal,
                    operation = operation.as_str(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "rate limit exceeded"
                );
                Err(retry_after)
            }
        }
    }

    /// Drop state for principals whose budget has fully replenished.
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        for limiter in self.limiters.values() {
            let before = limiter.len();
            limiter.retain_recent();
            limiter.shrink_to_fit();
            evicted += before.saturating_sub(limiter.len());
        }
        self.last_eviction_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        debug!(evicted, "evicted idle rate-limit state");
        evicted
    }

    /// Principals with live state for `operation`.
    pub fn tracked(&self, operation: Operation) -> usize {
        self.limiters.get(&operation).map_or(0, KeyedLimiter::len)
    }

    /// Sweep when the interval has passed. Only the caller that wins the
    /// exchange sweeps; the rest proceed without waiting.
    fn maybe_evict_idle(&self) {
        let now = self.elapsed_ms();
        let last = self.last_eviction_ms.load(Ordering::Relaxed);
        let interval = u64::try_from(self.idle_eviction_interval.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(last) < interval {
            return;
        }
        if self
            .last_eviction_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.evict_idle();
        }
    }

    fn elapsed_ms(&self) -> u64 {
        let elapsed = self.clock.now().saturating_duration_since(self.started);
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

impl std::fmt::Debug for PrincipalRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalRateLimiter")
            .field("operations", &self.limiters.keys().collect::<Vec<_>>())
            .field("idle_eviction_interval", &self.idle_eviction_interval)
            .finish_non_exhaustive()
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
