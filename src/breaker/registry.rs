//! Per-upstream circuit breaker lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::breaker::{Admission, BreakerConfig, CircuitBreaker, Outcome, State};

/// A point-in-time view of one breaker, for the admin `/circuit-breakers`
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: State,
    pub consecutive_failures: u32,
    /// Seconds since the breaker last opened; `None` if it never has.
    pub time_in_state_secs: Option<f64>,
}

/// Maps `upstream_name -> CircuitBreaker`, created lazily with the
/// configured thresholds for that upstream (or defaults).
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
    /// Per-upstream overrides, read from the upstream table at boot.
    configs: DashMap<String, BreakerConfig>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            configs: DashMap::new(),
        }
    }

    /// Register a per-upstream threshold override. Must be called before
    /// the first `allow`/`report` for that upstream to take effect —
    /// thresholds are resolved once at startup, not re-read per call.
    pub fn configure(&self, upstream: &str, config: BreakerConfig) {
        self.configs.insert(upstream.to_string(), config);
    }

    fn get_or_create(&self, upstream: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(upstream) {
            return Arc::clone(&existing);
        }
        let config = self
            .configs
            .get(upstream)
            .map(|c| *c)
            .unwrap_or(self.default_config);
        Arc::clone(
            &self
                .breakers
                .entry(upstream.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(config))),
        )
    }

    pub fn allow(&self, upstream: &str, now: Instant) -> Admission {
        self.get_or_create(upstream).allow(now)
    }

    pub fn report(&self, upstream: &str, outcome: Outcome, now: Instant) {
        self.get_or_create(upstream).report(outcome, now);
    }

    pub fn retry_after(&self, upstream: &str, now: Instant) -> Option<Duration> {
        self.breakers.get(upstream).and_then(|b| b.retry_after(now))
    }

    pub fn snapshot(&self, now: Instant) -> Vec<BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| {
                let breaker = entry.value();
                let time_in_state_secs = breaker
                    .opened_at()
                    .map(|opened_at| now.saturating_duration_since(opened_at).as_secs_f64());
                BreakerSnapshot {
                    name: entry.key().clone(),
                    state: breaker.state(),
                    consecutive_failures: breaker.consecutive_failures(),
                    time_in_state_secs,
                }
            })
            .collect()
    }
}
