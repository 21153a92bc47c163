use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::SharedClock;

/// Runtime circuit state for one provider/operation pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error, PartialEq)]
pub enum BreakerCallError<E> {
    /// The breaker refused the call; the wrapped operation never ran.
    #[error("circuit breaker is open")]
    Rejected,
    /// The wrapped operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            half_open_probe_in_flight: false,
        }
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Thread-safe circuit breaker guarding a single provider/operation pair.
///
/// State is behind one mutex per breaker; breakers for unrelated providers
/// never contend. The lock is never held across an await point.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Run `call` through the breaker.
    ///
    /// `counts_as_failure` decides whether an error moves the breaker; errors it
    /// declines still propagate but leave the failure counter untouched.
    pub async fn execute<T, E, F, Fut>(
        &self,
        call: F,
        counts_as_failure: impl Fn(&E) -> bool,
    ) -> Result<T, BreakerCallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            return Err(BreakerCallError::Rejected);
        };
        let mut permit = Permit {
            breaker: self,
            admission,
            settled: false,
        };

        let outcome = call().await;
        permit.settled = true;
        match &outcome {
            Ok(_) => self.on_success(admission),
            Err(error) if counts_as_failure(error) => self.on_failure(admission),
            Err(_) => self.on_neutral(admission),
        }
        outcome.map_err(BreakerCallError::Failed)
    }

    /// Whether a call arriving now would be let through. Does not reserve the probe slot.
    pub fn would_admit(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !inner.half_open_probe_in_flight,
            CircuitState::Open => self.reset_timeout_elapsed(&inner),
        }
    }

    /// State a call arriving now is decided under. An Open breaker whose reset
    /// timeout elapsed reports HalfOpen, since that call becomes the probe.
    pub fn decision_state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.reset_timeout_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    /// Stored state. An Open breaker whose timeout elapsed reports Open until
    /// the next call arrives and becomes the probe.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Administrative reset back to Closed with cleared counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        *inner = CircuitInner::default();
        drop(inner);
        info!(breaker = %self.name, from = previous.as_str(), "circuit breaker manually reset");
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::HalfOpen if inner.half_open_probe_in_flight => None,
            CircuitState::HalfOpen => {
                inner.half_open_probe_in_flight = true;
                Some(Admission::Probe)
            }
            CircuitState::Open => {
                if !self.reset_timeout_elapsed(&inner) {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.half_open_probe_in_flight = true;
                drop(inner);
                info!(breaker = %self.name, "circuit breaker half-open, admitting probe");
                Some(Admission::Probe)
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Probe, _) => {
                *inner = CircuitInner::default();
                drop(inner);
                info!(breaker = %self.name, "circuit breaker closed after successful probe");
            }
            (Admission::Normal, CircuitState::Closed) => inner.consecutive_failures = 0,
            // A slow call admitted before the trip does not prove recovery.
            (Admission::Normal, _) => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);

        if admission == Admission::Probe {
            inner.state = CircuitState::Open;
            inner.half_open_probe_in_flight = false;
            drop(inner);
            warn!(breaker = %self.name, "circuit breaker probe failed, reopening");
            return;
        }

        if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            let failures = inner.consecutive_failures;
            drop(inner);
            warn!(
                breaker = %self.name,
                failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "circuit breaker opened"
            );
        }
    }

    /// The call finished with an error that says nothing about health.
    fn on_neutral(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.lock().half_open_probe_in_flight = false;
        }
    }

    fn reset_timeout_elapsed(&self, inner: &CircuitInner) -> bool {
        inner
            .last_failure_at
            .map(|at| self.clock.now().saturating_duration_since(at) >= self.config.reset_timeout)
            .unwrap_or(true)
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        // Every critical section leaves the state consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the half-open probe slot if the wrapped future is dropped mid-call.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_neutral(self.admission);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: u32, reset: Duration) -> (Arc<ManualClock>, CircuitBreaker) {
        let manual = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new(
            "test/sentiment",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: reset,
            },
            SharedClock::new(manual.clone()),
        );
        (manual, breaker)
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerCallError<&'static str>> {
        breaker.execute(|| async { Err("boom") }, |_| true).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u8, BreakerCallError<&'static str>> {
        breaker.execute(|| async { Ok(7) }, |_| true).await
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let (_clock, breaker) = breaker(2, Duration::from_secs(30));

        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut invoked = false;
        let rejected: Result<(), BreakerCallError<&str>> = breaker
            .execute(
                || {
                    invoked = true;
                    async { Ok(()) }
                },
                |_| true,
            )
            .await;
        assert_eq!(rejected, Err(BreakerCallError::Rejected));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn decision_state_reports_the_probe_before_it_is_admitted() {
        let (clock, breaker) = breaker(1, Duration::from_secs(30));
        assert_eq!(breaker.decision_state(), CircuitState::Closed);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.decision_state(), CircuitState::Open);

        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.decision_state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn success_in_closed_state_resets_failure_count() {
        let (_clock, breaker) = breaker(3, Duration::from_secs(30));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.consecutive_failures(), 2);

        assert_eq!(succeed(&breaker).await, Ok(7));
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn probe_success_closes_the_circuit() {
        let (clock, breaker) = breaker(1, Duration::from_secs(30));
        let _ = fail(&breaker).await;
        assert!(!breaker.would_admit());

        clock.advance(Duration::from_secs(30));
        assert!(breaker.would_admit());
        assert_eq!(succeed(&breaker).await, Ok(7));

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_restarts_timer() {
        let (clock, breaker) = breaker(1, Duration::from_secs(30));
        let _ = fail(&breaker).await;

        clock.advance(Duration::from_secs(31));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert_eq!(succeed(&breaker).await, Err(BreakerCallError::Rejected));

        clock.advance(Duration::from_secs(1));
        assert_eq!(succeed(&breaker).await, Ok(7));
    }

    #[tokio::test]
    async fn only_one_probe_is_in_flight() {
        let (clock, breaker) = breaker(1, Duration::from_secs(5));
        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(5));

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let probe = breaker.execute(
            || async move {
                let _ = wait.await;
                Ok::<_, &str>(1)
            },
            |_| true,
        );
        let concurrent = async {
            tokio::task::yield_now().await;
            assert_eq!(breaker.state(), CircuitState::HalfOpen);
            let second = succeed(&breaker).await;
            let _ = release.send(());
            second
        };

        let (probe, second) = tokio::join!(probe, concurrent);
        assert_eq!(probe, Ok(1));
        assert_eq!(second, Err(BreakerCallError::Rejected));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn dropped_probe_frees_the_slot() {
        let (clock, breaker) = breaker(1, Duration::from_secs(5));
        let _ = fail(&breaker).await;
        clock.advance(Duration::from_secs(5));

        {
            let pending = breaker.execute(
                || std::future::pending::<Result<(), &str>>(),
                |_| true,
            );
            let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;
        }

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(succeed(&breaker).await, Ok(7));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn neutral_errors_do_not_trip() {
        let (_clock, breaker) = breaker(1, Duration::from_secs(5));
        let outcome: Result<(), _> = breaker.execute(|| async { Err("bad input") }, |_| false).await;

        assert_eq!(outcome, Err(BreakerCallError::Failed("bad input")));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn manual_reset_closes_an_open_breaker() {
        let (_clock, breaker) = breaker(1, Duration::from_secs(300));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker).await, Ok(7));
    }
}
