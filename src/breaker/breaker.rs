//! Three-state failure detector for a single upstream.
//!
//! One `Mutex` guards all mutable state for a given upstream, so the
//! "single probe in HALF_OPEN" invariant holds simply by keeping the lock
//! held across the admission check and its transition — no separate
//! compare-and-swap dance needed.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject,
}

/// Per-upstream threshold configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Set while a HALF_OPEN probe is outstanding — cleared by the
    /// matching `report`. Guarantees only one in-flight probe at a time.
    probe_in_flight: bool,
}

/// A single upstream's breaker. All mutation happens under one `Mutex`,
/// so the "single probe in HALF_OPEN" invariant is enforced simply by
/// holding the lock across the admission check and its transition.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Check admission, performing any due OPEN -> HALF_OPEN transition.
    pub fn allow(&self, now: Instant) -> Admission {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            State::Closed => Admission::Admit,
            State::Open => {
                let opened_at = inner.opened_at.expect("OPEN state always has opened_at set");
                if now.saturating_duration_since(opened_at) >= self.config.recovery_timeout {
                    inner.state = State::HalfOpen;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.probe_in_flight = true;
                    Admission::Admit
                } else {
                    Admission::Reject
                }
            }
            State::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Reject
                } else {
                    inner.probe_in_flight = true;
                    Admission::Admit
                }
            }
        }
    }

    /// Report the outcome of a previously ADMITted call. Must be called
    /// exactly once per `allow` that returned `Admission::Admit`.
    pub fn report(&self, outcome: Outcome, now: Instant) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match (inner.state, outcome) {
            (State::Closed, Outcome::Success) => {
                inner.consecutive_failures = 0;
            }
            (State::Closed, Outcome::Failure) => {
                inner.consecutive_failures += 1;
                inner.consecutive_successes = 0;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(now);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                }
            }
            (State::HalfOpen, Outcome::Success) => {
                inner.probe_in_flight = false;
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            (State::HalfOpen, Outcome::Failure) => {
                inner.probe_in_flight = false;
                inner.state = State::Open;
                inner.opened_at = Some(now);
                inner.consecutive_failures = 0;
                inner.consecutive_successes = 0;
            }
            // A report arriving for an already-OPEN breaker (e.g. a
            // straggling call that was admitted just before a concurrent
            // trip) has no further state to mutate.
            (State::Open, _) => {}
        }
    }

    /// Remaining time until an OPEN breaker would admit a probe. `None`
    /// when not currently OPEN.
    pub fn retry_after(&self, now: Instant) -> Option<Duration> {
        let inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            State::Open => {
                let opened_at = inner.opened_at?;
                let elapsed = now.saturating_duration_since(opened_at);
                Some(self.config.recovery_timeout.saturating_sub(elapsed))
            }
            _ => None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().expect("breaker lock poisoned").consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.inner.lock().expect("breaker lock poisoned").opened_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn starts_closed_admitting_everything() {
        let b = CircuitBreaker::new(cfg());
        assert_eq!(b.state(), State::Closed);
        assert_eq!(b.allow(Instant::now()), Admission::Admit);
    }

    #[test]
    fn trips_open_after_consecutive_failures() {
        let b = CircuitBreaker::new(cfg());
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(b.allow(now), Admission::Admit);
            b.report(Outcome::Failure, now);
        }
        assert_eq!(b.state(), State::Open);
        assert_eq!(b.allow(now), Admission::Reject);
    }

    #[test]
    fn success_resets_failure_streak_in_closed() {
        let b = CircuitBreaker::new(cfg());
        let now = Instant::now();
        b.report(Outcome::Failure, now);
        b.report(Outcome::Failure, now);
        b.report(Outcome::Success, now);
        assert_eq!(b.consecutive_failures(), 0);
        b.report(Outcome::Failure, now);
        b.report(Outcome::Failure, now);
        assert_eq!(b.state(), State::Closed);
    }

    #[test]
    fn no_admission_during_recovery_window() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        assert_eq!(b.state(), State::Open);

        let almost_recovered = t0 + Duration::from_secs(9);
        assert_eq!(b.allow(almost_recovered), Admission::Reject);
    }

    #[test]
    fn admits_probe_after_recovery_timeout_and_moves_to_half_open() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        let recovered = t0 + Duration::from_secs(10);
        assert_eq!(b.allow(recovered), Admission::Admit);
        assert_eq!(b.state(), State::HalfOpen);
    }

    #[test]
    fn only_one_probe_admitted_concurrently_in_half_open() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        let recovered = t0 + Duration::from_secs(10);
        assert_eq!(b.allow(recovered), Admission::Admit);
        // A second concurrent caller must be rejected until report() clears it.
        assert_eq!(b.allow(recovered), Admission::Reject);
        assert_eq!(b.allow(recovered), Admission::Reject);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        let recovered = t0 + Duration::from_secs(10);
        b.allow(recovered);
        b.report(Outcome::Success, recovered);
        assert_eq!(b.state(), State::HalfOpen);

        assert_eq!(b.allow(recovered), Admission::Admit);
        b.report(Outcome::Success, recovered);
        assert_eq!(b.state(), State::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        let recovered = t0 + Duration::from_secs(10);
        b.allow(recovered);
        b.report(Outcome::Failure, recovered);
        assert_eq!(b.state(), State::Open);
    }

    #[test]
    fn retry_after_counts_down_to_zero_at_recovery() {
        let b = CircuitBreaker::new(cfg());
        let t0 = Instant::now();
        for _ in 0..3 {
            b.allow(t0);
            b.report(Outcome::Failure, t0);
        }
        let mid = t0 + Duration::from_secs(4);
        let remaining = b.retry_after(mid).unwrap();
        assert!((remaining.as_secs_f64() - 6.0).abs() < 0.01);
    }
}
