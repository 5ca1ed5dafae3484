//! Configuration types for the gateway.
//!
//! Config is loaded once at startup from a TOML file and validated before
//! the server opens any ports — an invalid config fails fast with a clear
//! error rather than silently falling back to defaults.
//!
//! # Example
//! ```toml
//! [gateway]
//! port = 8000
//! client_header = "X-Client-ID"
//! default_tier = "FREE"
//!
//! [upstreams.payments]
//! base_url = "http://payments.internal:9000"
//! failure_threshold = 5
//! success_threshold = 2
//! recovery_timeout_ms = 30000
//! timeout_ms = 30000
//!
//! [[routes]]
//! pattern = "/api/payments/**"
//! cost = 5
//! ```
//!
//! Routing (which upstream a path forwards to) and the route-cost table
//! are two separate concerns. Routing is resolved by convention — the
//! first path segment after `/api/` names the upstream — so every path
//! under a configured upstream resolves, whether or not it has a
//! route-cost entry. The route-cost table only overrides the default
//! cost of 1 for specific patterns.

use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::limiter::Tier;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Named upstream services the gateway forwards to.
    #[serde(default)]
    pub upstreams: HashMap<String, UpstreamConfig>,

    /// Route-cost table: path pattern -> token cost override. A path
    /// that matches no entry still routes and forwards, at the default
    /// cost of 1.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            Tier::parse(&self.gateway.default_tier).is_some(),
            "gateway.default_tier `{}` is not one of FREE, BASIC, PREMIUM, ENTERPRISE",
            self.gateway.default_tier
        );

        for route in &self.routes {
            anyhow::ensure!(
                route.cost >= 1,
                "route `{}` has cost {} — cost must be >= 1",
                route.pattern,
                route.cost
            );
        }

        Ok(())
    }

    /// Resolve a request path to its upstream by convention: the first
    /// path segment after `/api/` names the upstream. This is deliberately
    /// independent of the route-cost table below — a path under a
    /// configured upstream always routes, whether or not it has a
    /// route-cost entry.
    pub fn resolve_upstream(&self, path: &str) -> Option<(&str, &UpstreamConfig)> {
        let rest = path.strip_prefix("/api/")?;
        let segment = rest.split('/').next().filter(|s| !s.is_empty())?;
        self.upstreams.get_key_value(segment).map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a request path to its token cost, by longest-prefix match
    /// over each route-cost pattern's literal prefix (the part before a
    /// trailing `/**` or `/*`). A path matching no entry costs 1 — the
    /// route-cost table only overrides, never gates, admission.
    pub fn resolve_cost(&self, path: &str) -> u32 {
        self.routes
            .iter()
            .filter(|r| r.matches(path))
            .max_by_key(|r| r.prefix().len())
            .map(|r| r.cost)
            .unwrap_or(1)
    }

    pub fn upstream(&self, name: &str) -> Option<&UpstreamConfig> {
        self.upstreams.get(name)
    }
}

/// Core gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Port for the gateway's HTTP listener (default: 8000).
    pub port: u16,
    /// Bind address (default: 0.0.0.0).
    pub host: String,
    /// Header the gateway reads the client id from (default: X-Client-ID).
    pub client_header: String,
    /// Ring-buffer size for each route's latency estimator (default: 1000).
    pub latency_window: usize,
    /// Tier assigned to a client id the rate-limit registry has never
    /// seen before (default: FREE).
    pub default_tier: String,
    /// How long an idle client record may sit in the rate-limit registry
    /// before the background sweep evicts it (default: 3600s / 1h).
    pub client_idle_ttl_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            client_header: "X-Client-ID".to_string(),
            latency_window: 1000,
            default_tier: "FREE".to_string(),
            client_idle_ttl_secs: 3600,
        }
    }
}

/// A named upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL, no trailing slash required — the forwarder trims it.
    pub base_url: String,

    /// Consecutive failures to trip the breaker from CLOSED (default: 5).
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes in HALF_OPEN required to close (default: 2).
    #[serde(default = "defaults::success_threshold")]
    pub success_threshold: u32,

    /// Dwell time in OPEN before admitting a probe (default: 30000 ms).
    #[serde(default = "defaults::recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Per-request forward timeout (default: 30000 ms).
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Whether a 4xx response from this upstream counts as a breaker
    /// failure. Default `false` — a 4xx reflects the caller's request,
    /// not the upstream's health.
    #[serde(default)]
    pub count_4xx_as_failure: bool,
}

impl UpstreamConfig {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One entry in the route-cost table — a cost override for paths
/// matching `pattern`. Carries no routing information; see
/// [`Config::resolve_upstream`] for how a path picks its upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// A literal path prefix, optionally suffixed with `/**` (matches any
    /// depth) or `/*` (matches exactly one more segment).
    pub pattern: String,
    /// Token cost for this route (default: 1).
    #[serde(default = "defaults::route_cost")]
    pub cost: u32,
}

impl RouteConfig {
    /// The literal prefix before any `/**` or `/*` wildcard suffix.
    fn prefix(&self) -> &str {
        self.pattern
            .strip_suffix("/**")
            .or_else(|| self.pattern.strip_suffix("/*"))
            .unwrap_or(&self.pattern)
    }

    fn matches(&self, path: &str) -> bool {
        if let Some(prefix) = self.pattern.strip_suffix("/**") {
            path == prefix || path.starts_with(&format!("{prefix}/"))
        } else if let Some(prefix) = self.pattern.strip_suffix("/*") {
            path.strip_prefix(prefix)
                .map(|rest| rest.starts_with('/') && !rest[1..].contains('/'))
                .unwrap_or(false)
        } else {
            path == self.pattern
        }
    }
}

mod defaults {
    pub fn failure_threshold() -> u32 {
        5
    }
    pub fn success_threshold() -> u32 {
        2
    }
    pub fn recovery_timeout_ms() -> u64 {
        30_000
    }
    pub fn timeout_ms() -> u64 {
        30_000
    }
    pub fn route_cost() -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
            [gateway]
            port = 8000

            [upstreams.payments]
            base_url = "http://payments.internal:9000"

            [upstreams.search]
            base_url = "http://search.internal:9100"

            [[routes]]
            pattern = "/api/payments/**"
            cost = 5
            "#,
        )
        .expect("minimal config should parse")
    }

    #[test]
    fn gateway_defaults_apply_when_section_is_minimal() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.gateway.client_header, "X-Client-ID");
        assert_eq!(config.gateway.default_tier, "FREE");
        assert_eq!(config.gateway.latency_window, 1000);
    }

    #[test]
    fn validation_rejects_route_with_invalid_cost() {
        let mut config = minimal_config();
        config.routes.push(RouteConfig {
            pattern: "/api/x".into(),
            cost: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_invalid_default_tier() {
        let mut config = minimal_config();
        config.gateway.default_tier = "GOLD".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_cost_matches_double_star_prefix_at_any_depth() {
        let config = minimal_config();
        assert_eq!(config.resolve_cost("/api/payments/charge/123"), 5);
    }

    #[test]
    fn resolve_cost_defaults_to_one_for_unmatched_path() {
        let config = minimal_config();
        assert_eq!(config.resolve_cost("/api/search/widgets"), 1);
    }

    #[test]
    fn resolve_upstream_matches_the_first_path_segment() {
        let config = minimal_config();
        let (name, _upstream) = config.resolve_upstream("/api/payments/charge/123").unwrap();
        assert_eq!(name, "payments");
    }

    #[test]
    fn resolve_upstream_returns_none_for_unconfigured_segment() {
        let config = minimal_config();
        assert!(config.resolve_upstream("/api/unknown/path").is_none());
    }

    #[test]
    fn unlisted_path_still_resolves_and_forwards_at_cost_one() {
        // No route-cost entry for "search", but the upstream exists, so
        // the path still routes — it just costs the default of 1.
        let config = minimal_config();
        let (name, _upstream) = config.resolve_upstream("/api/search/widgets").unwrap();
        assert_eq!(name, "search");
        assert_eq!(config.resolve_cost("/api/search/widgets"), 1);
    }

    #[test]
    fn unlisted_route_defaults_to_cost_one() {
        let config: Config = toml::from_str(
            r#"
            [upstreams.x]
            base_url = "http://x"
            [[routes]]
            pattern = "/api/x/specific"
            cost = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_cost("/api/x/other"), 1);
        assert_eq!(config.resolve_cost("/api/x/specific"), 9);
    }

    #[test]
    fn upstream_breaker_config_uses_configured_thresholds() {
        let mut config = minimal_config();
        config.upstreams.get_mut("payments").unwrap().failure_threshold = 7;
        let breaker_cfg = config.upstream("payments").unwrap().breaker_config();
        assert_eq!(breaker_cfg.failure_threshold, 7);
    }
}
