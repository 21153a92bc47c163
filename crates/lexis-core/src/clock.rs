//! Time sources shared by the breaker, cache and rate limiter.
//!
//! Every time-dependent component reads from a [`SharedClock`], so tests can swap
//! in a [`ManualClock`] and move time forward without sleeping.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use time::OffsetDateTime;

/// Monotonic plus wall-clock time source.
pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant used for elapsed-time decisions.
    fn now(&self) -> Instant;

    /// Wall-clock time used for persisted timestamps and TTL expiry.
    fn wall_now(&self) -> OffsetDateTime;
}

/// Real process clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: OffsetDateTime,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    pub fn starting_at(wall_origin: OffsetDateTime) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both the monotonic and the wall clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = offset.saturating_add(by);
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn wall_now(&self) -> OffsetDateTime {
        self.wall_origin + self.offset()
    }
}

/// Cheaply clonable handle to a [`Clock`].
///
/// Also implements [`governor::clock::Clock`] so rate limiting observes the same time.
#[derive(Debug, Clone)]
pub struct SharedClock(Arc<dyn Clock>);

impl Default for SharedClock {
    fn default() -> Self {
        Self::system()
    }
}

impl SharedClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self(clock)
    }

    pub fn system() -> Self {
        Self(Arc::new(SystemClock))
    }

    pub fn now(&self) -> Instant {
        self.0.now()
    }

    pub fn wall_now(&self) -> OffsetDateTime {
        self.0.wall_now()
    }

    /// Milliseconds elapsed since `started`, saturating at `u64::MAX`.
    pub fn elapsed_ms(&self, started: Instant) -> u64 {
        let elapsed = self.now().saturating_duration_since(started);
        elapsed.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

impl governor::clock::Clock for SharedClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        self.0.now()
    }
}
