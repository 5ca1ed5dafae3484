//! Shared application state, threaded through every axum handler.
//!
//! Config lives behind `RwLock<Arc<Config>>` for hot-swap: mutate under a
//! short-held write lock, read the rest lock-free. The three core
//! collaborators (rate limiter, breaker registry, metrics store) are
//! long-lived and not part of that swap.

use std::path::PathBuf;
use std::sync::RwLock;

use crate::breaker::{BreakerConfig, CircuitBreakerRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::forward::Forwarder;
use crate::limiter::{RateLimiterRegistry, Tier};
use crate::metrics::MetricsStore;

pub struct GatewayState {
    pub clock: Box<dyn Clock>,
    pub config: RwLock<std::sync::Arc<Config>>,
    pub config_path: PathBuf,
    pub limiter: RateLimiterRegistry,
    pub breaker: CircuitBreakerRegistry,
    pub metrics: MetricsStore,
    pub forwarder: Forwarder,
}

impl GatewayState {
    pub fn new(config: Config, config_path: PathBuf, forwarder: Forwarder) -> anyhow::Result<Self> {
        Self::with_clock(config, config_path, forwarder, Box::new(SystemClock))
    }

    /// Same as [`GatewayState::new`] but with an injectable [`Clock`] —
    /// used by pipeline-level tests that need to advance time
    /// deterministically (e.g. circuit-breaker recovery) without sleeping.
    pub fn with_clock(
        config: Config,
        config_path: PathBuf,
        forwarder: Forwarder,
        clock: Box<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let default_tier = Tier::parse(&config.gateway.default_tier)
            .expect("validated at config load — default_tier is canonical");

        let breaker = CircuitBreakerRegistry::new(BreakerConfig::default());
        for (name, upstream) in &config.upstreams {
            breaker.configure(name, upstream.breaker_config());
        }

        Ok(Self {
            clock,
            limiter: RateLimiterRegistry::new(default_tier),
            breaker,
            metrics: MetricsStore::new(config.gateway.latency_window),
            forwarder,
            config: RwLock::new(std::sync::Arc::new(config)),
            config_path,
        })
    }

    pub fn config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config.read().expect("config lock poisoned"))
    }

    /// Swap in a freshly loaded config and re-register any per-upstream
    /// breaker thresholds that changed. Scoped to the upstream and route
    /// tables only — `gateway.port`/`gateway.host` are read once at boot
    /// and cannot change while the listener is already bound.
    pub fn replace_config(&self, new_config: Config) {
        for (name, upstream) in &new_config.upstreams {
            self.breaker.configure(name, upstream.breaker_config());
        }
        *self.config.write().expect("config lock poisoned") = std::sync::Arc::new(new_config);
    }
}
