//! Per-route aggregate counters, a latency estimator per route, and the
//! three global gate counters. Also renders a Prometheus text-exposition
//! encoding of the same data, alongside the plain-JSON snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use super::latency::{LatencyEstimator, LatencySnapshot};

/// Which status-code class a response fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Class2xx,
    Class3xx,
    Class4xx,
    Class5xx,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status / 100 {
            2 => StatusClass::Class2xx,
            3 => StatusClass::Class3xx,
            4 => StatusClass::Class4xx,
            _ => StatusClass::Class5xx,
        }
    }
}

/// What kind of admission-pipeline gate decision to count in the global
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    Allowed,
    RateLimited,
    CircuitRejected,
}

#[derive(Default)]
struct ByStatusClass {
    c2xx: AtomicU64,
    c3xx: AtomicU64,
    c4xx: AtomicU64,
    c5xx: AtomicU64,
}

struct RouteMetrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    by_status_class: ByStatusClass,
    latency: LatencyEstimator,
}

impl RouteMetrics {
    fn new(latency_window: usize) -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            by_status_class: ByStatusClass::default(),
            latency: LatencyEstimator::new(latency_window),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub by_status_class: StatusClassCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusClassCounts {
    #[serde(rename = "2xx")]
    pub c2xx: u64,
    #[serde(rename = "3xx")]
    pub c3xx: u64,
    #[serde(rename = "4xx")]
    pub c4xx: u64,
    #[serde(rename = "5xx")]
    pub c5xx: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub routes: std::collections::BTreeMap<String, RouteSnapshot>,
    pub allowed_total: u64,
    pub rate_limited_total: u64,
    pub circuit_rejected_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshotByRoute(pub std::collections::BTreeMap<String, LatencySnapshot>);

/// The metrics store. Counters are atomics; the per-route map is a
/// `DashMap` so different routes never contend with each other.
pub struct MetricsStore {
    latency_window: usize,
    routes: DashMap<String, RouteMetrics>,
    allowed_total: AtomicU64,
    rate_limited_total: AtomicU64,
    circuit_rejected_total: AtomicU64,
}

impl MetricsStore {
    pub fn new(latency_window: usize) -> Self {
        Self {
            latency_window,
            routes: DashMap::new(),
            allowed_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            circuit_rejected_total: AtomicU64::new(0),
        }
    }

    fn route_entry(&self, route: &str) -> dashmap::mapref::one::Ref<'_, String, RouteMetrics> {
        if !self.routes.contains_key(route) {
            self.routes
                .entry(route.to_string())
                .or_insert_with(|| RouteMetrics::new(self.latency_window));
        }
        self.routes.get(route).expect("just inserted")
    }

    /// Record a completed forward: increments counters and feeds the
    /// route's latency estimator.
    pub fn record(&self, route: &str, status_code: u16, latency_ms: f64) {
        let entry = self.route_entry(route);
        entry.requests_total.fetch_add(1, Ordering::Relaxed);
        let class = StatusClass::from_status(status_code);
        let counter = match class {
            StatusClass::Class2xx => &entry.by_status_class.c2xx,
            StatusClass::Class3xx => &entry.by_status_class.c3xx,
            StatusClass::Class4xx => &entry.by_status_class.c4xx,
            StatusClass::Class5xx => &entry.by_status_class.c5xx,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if class == StatusClass::Class5xx {
            entry.errors_total.fetch_add(1, Ordering::Relaxed);
        }
        entry.latency.observe(latency_ms);
    }

    /// Increment one of the three global gate counters.
    pub fn record_gate(&self, kind: GateKind) {
        let counter = match kind {
            GateKind::Allowed => &self.allowed_total,
            GateKind::RateLimited => &self.rate_limited_total,
            GateKind::CircuitRejected => &self.circuit_rejected_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let routes = self
            .routes
            .iter()
            .map(|entry| {
                let m = entry.value();
                (
                    entry.key().clone(),
                    RouteSnapshot {
                        requests_total: m.requests_total.load(Ordering::Relaxed),
                        errors_total: m.errors_total.load(Ordering::Relaxed),
                        by_status_class: StatusClassCounts {
                            c2xx: m.by_status_class.c2xx.load(Ordering::Relaxed),
                            c3xx: m.by_status_class.c3xx.load(Ordering::Relaxed),
                            c4xx: m.by_status_class.c4xx.load(Ordering::Relaxed),
                            c5xx: m.by_status_class.c5xx.load(Ordering::Relaxed),
                        },
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            routes,
            allowed_total: self.allowed_total.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            circuit_rejected_total: self.circuit_rejected_total.load(Ordering::Relaxed),
        }
    }

    pub fn latency_snapshot(&self) -> LatencySnapshotByRoute {
        LatencySnapshotByRoute(
            self.routes
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().latency.snapshot()))
                .collect(),
        )
    }

    /// Renders the store as Prometheus text-exposition format, with a
    /// `# HELP`/`# TYPE` pair per metric family.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(1024);

        out.push_str("# HELP gateway_requests_total Requests per route, labelled by status class.\n");
        out.push_str("# TYPE gateway_requests_total counter\n");
        let mut rows: Vec<_> = self.routes.iter().collect();
        rows.sort_by(|a, b| a.key().cmp(b.key()));
        for entry in &rows {
            let route = entry.key();
            let m = entry.value();
            for (class, counter) in [
                ("2xx", &m.by_status_class.c2xx),
                ("3xx", &m.by_status_class.c3xx),
                ("4xx", &m.by_status_class.c4xx),
                ("5xx", &m.by_status_class.c5xx),
            ] {
                out.push_str(&format!(
                    "gateway_requests_total{{route=\"{route}\",status_class=\"{class}\"}} {}\n",
                    counter.load(Ordering::Relaxed)
                ));
            }
        }
        out.push('\n');

        out.push_str("# HELP gateway_gate_total Admission-pipeline gate decisions.\n");
        out.push_str("# TYPE gateway_gate_total counter\n");
        out.push_str(&format!(
            "gateway_gate_total{{kind=\"allowed\"}} {}\n",
            self.allowed_total.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "gateway_gate_total{{kind=\"rate_limited\"}} {}\n",
            self.rate_limited_total.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "gateway_gate_total{{kind=\"circuit_rejected\"}} {}\n",
            self.circuit_rejected_total.load(Ordering::Relaxed)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_increments_route_and_status_class_counters() {
        let store = MetricsStore::new(1000);
        store.record("/api/widgets", 200, 12.0);
        store.record("/api/widgets", 500, 8.0);
        let snap = store.snapshot();
        let route = &snap.routes["/api/widgets"];
        assert_eq!(route.requests_total, 2);
        assert_eq!(route.by_status_class.c2xx, 1);
        assert_eq!(route.by_status_class.c5xx, 1);
        assert_eq!(route.errors_total, 1);
    }

    #[test]
    fn gate_counters_are_independent_and_monotonic() {
        let store = MetricsStore::new(1000);
        store.record_gate(GateKind::Allowed);
        store.record_gate(GateKind::Allowed);
        store.record_gate(GateKind::RateLimited);
        let snap = store.snapshot();
        assert_eq!(snap.allowed_total, 2);
        assert_eq!(snap.rate_limited_total, 1);
        assert_eq!(snap.circuit_rejected_total, 0);
    }

    #[test]
    fn latency_snapshot_is_keyed_by_route() {
        let store = MetricsStore::new(1000);
        store.record("/api/a", 200, 10.0);
        store.record("/api/a", 200, 20.0);
        let snap = store.latency_snapshot();
        assert!(snap.0.contains_key("/api/a"));
    }

    #[test]
    fn prometheus_rendering_includes_all_families() {
        let store = MetricsStore::new(1000);
        store.record("/api/a", 200, 10.0);
        store.record_gate(GateKind::CircuitRejected);
        let text = store.render_prometheus();
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("gateway_gate_total{kind=\"circuit_rejected\"} 1"));
    }
}
