//! Per-dependency circuit breakers with lazy state transitions.
//!
//! Each breaker is a pure state machine with no background timers: an open
//! breaker transitions to half-open lazily on the next [`CircuitBreaker::allow`]
//! call after its reset timeout elapses. This avoids extra scheduling at the
//! cost that an idle breaker will not self-heal until next queried, which is
//! intended behavior.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker state machine.
///
/// - `Closed` -> `Open`: when the consecutive failure count reaches the threshold
/// - `Open` -> `HalfOpen`: lazily, on the first `allow()` after the reset timeout
/// - `HalfOpen` -> `Closed`: on an explicit success signal
/// - `HalfOpen` -> `Open`: on any failure during the trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation, calls are allowed through.
    Closed,
    /// Failures exceeded the threshold, calls are blocked.
    Open,
    /// Recovery mode, a single trial call probes the dependency.
    HalfOpen,
}

/// Point-in-time view of a breaker, exposed in monitoring reports.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failure count.
    pub failure_count: u32,
    /// Configured failure threshold.
    pub failure_threshold: u32,
}

/// Mutable breaker state under a single lock so transitions are atomic.
#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// Whether the single half-open trial has already been handed out.
    probe_in_flight: bool,
}

/// Circuit breaker protecting one named dependency.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given threshold and reset timeout.
    #[must_use]
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Whether a call should be allowed through.
    ///
    /// Closed breakers always allow. Open breakers deny until the reset
    /// timeout elapses, then lazily transition to half-open and allow exactly
    /// one trial; further calls are denied until the trial's outcome is
    /// reported via [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed =
                    inner.last_failure_at.map(|at| at.elapsed() >= self.reset_timeout);
                if elapsed == Some(true) {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    warn!("circuit breaker transitioning to half-open for trial call");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call, resetting the failure count and closing the
    /// breaker if it was half-open.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.last_failure_at = None;
                inner.probe_in_flight = false;
                info!("circuit breaker closed after successful call");
            }
        }
    }

    /// Records a failed call. Reaching the threshold opens the breaker; any
    /// failure during a half-open trial reopens it and restarts the timeout.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            BreakerState::Closed | BreakerState::Open => {
                inner.failure_count += 1;
                if inner.state == BreakerState::Closed
                    && inner.failure_count >= self.failure_threshold
                {
                    inner.state = BreakerState::Open;
                    warn!(
                        threshold = self.failure_threshold,
                        "circuit breaker opened after reaching failure threshold"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.failure_count += 1;
                inner.probe_in_flight = false;
                warn!("circuit breaker reopened after failed trial call");
            }
        }
    }

    /// Forces the breaker open immediately, e.g. from a remediation action.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Open;
        inner.last_failure_at = Some(Instant::now());
        inner.probe_in_flight = false;
        warn!("circuit breaker forced open");
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Point-in-time view for reports.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
        }
    }
}

/// Registry of circuit breakers keyed by dependency name.
///
/// Breakers are registered explicitly at startup; operations on unknown names
/// are permissive reads (`allow` returns `true`) and ignored writes, logged
/// for visibility.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: dashmap::DashMap<String, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a breaker for `name`. Re-registration replaces the breaker
    /// and resets its state.
    pub fn register(&self, name: &str, config: BreakerConfig) {
        self.breakers.insert(
            name.to_string(),
            CircuitBreaker::new(config.failure_threshold, config.reset_timeout()),
        );
        debug!(dependency = %name, "circuit breaker registered");
    }

    /// Whether a call to `name` should be allowed. Unknown names fail open.
    #[must_use]
    pub fn allow(&self, name: &str) -> bool {
        match self.breakers.get(name) {
            Some(breaker) => breaker.allow(),
            None => {
                debug!(dependency = %name, "allow() on unregistered breaker, failing open");
                true
            }
        }
    }

    /// Records a success for `name`.
    pub fn record_success(&self, name: &str) {
        match self.breakers.get(name) {
            Some(breaker) => breaker.record_success(),
            None => warn!(dependency = %name, "success recorded for unregistered breaker"),
        }
    }

    /// Records a failure for `name`.
    pub fn record_failure(&self, name: &str) {
        match self.breakers.get(name) {
            Some(breaker) => breaker.record_failure(),
            None => warn!(dependency = %name, "failure recorded for unregistered breaker"),
        }
    }

    /// Forces the breaker for `name` open.
    pub fn force_open(&self, name: &str) {
        match self.breakers.get(name) {
            Some(breaker) => breaker.force_open(),
            None => warn!(dependency = %name, "force_open on unregistered breaker"),
        }
    }

    /// Current state of the breaker for `name`, if registered.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<BreakerState> {
        self.breakers.get(name).map(|breaker| breaker.state())
    }

    /// Whether every registered breaker is open. `false` when the registry
    /// is empty.
    #[must_use]
    pub fn all_open(&self) -> bool {
        !self.breakers.is_empty()
            && self.breakers.iter().all(|entry| entry.value().state() == BreakerState::Open)
    }

    /// Snapshot of every registered breaker, keyed by name.
    #[must_use]
    pub fn states(&self) -> std::collections::BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        assert!(breaker.allow());
        for i in 0..2 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
            assert_eq!(breaker.failure_count(), i + 1);
        }

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_half_open_single_trial() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Zero reset timeout: the next allow() is the half-open trial.
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        // Exactly one trial is handed out until the outcome is reported.
        assert!(!breaker.allow());
        assert!(!breaker.allow());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));

        breaker.record_failure();
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // The timeout restarted at the trial failure; with a zero timeout the
        // next allow() is immediately another trial.
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_open_denies_until_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3600));
        breaker.record_failure();

        assert!(!breaker.allow());
        assert!(!breaker.allow());
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_in_closed_resets_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_force_open() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(3600));
        assert!(breaker.allow());

        breaker.force_open();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_registry_unknown_name_fails_open() {
        let registry = CircuitBreakerRegistry::new();
        assert!(registry.allow("database"));
        registry.record_failure("database");
        assert!(registry.state("database").is_none());
    }

    #[test]
    fn test_registry_tracks_named_breakers() {
        let registry = CircuitBreakerRegistry::new();
        registry
            .register("database", BreakerConfig { failure_threshold: 2, reset_timeout_seconds: 60 });
        registry
            .register("queue", BreakerConfig { failure_threshold: 2, reset_timeout_seconds: 60 });

        registry.record_failure("database");
        registry.record_failure("database");

        assert_eq!(registry.state("database"), Some(BreakerState::Open));
        assert_eq!(registry.state("queue"), Some(BreakerState::Closed));
        assert!(!registry.allow("database"));
        assert!(registry.allow("queue"));
        assert!(!registry.all_open());

        registry.force_open("queue");
        assert!(registry.all_open());

        let states = registry.states();
        assert_eq!(states.len(), 2);
        assert_eq!(states["database"].failure_count, 2);
    }
}
