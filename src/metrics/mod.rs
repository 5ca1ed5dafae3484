//! Bounded, concurrent counters and streaming latency percentile
//! estimators.

mod latency;
mod store;

pub use latency::{LatencyEstimator, LatencySnapshot};
pub use store::{
    GateKind, LatencySnapshotByRoute, MetricsSnapshot, MetricsStore, RouteSnapshot, StatusClass,
    StatusClassCounts,
};
