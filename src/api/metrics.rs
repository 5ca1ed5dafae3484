//! Prometheus text-exposition encoding of the metrics store.
//!
//! `/metrics` serves a plain JSON snapshot; this module renders the same
//! counters as Prometheus text at `/metrics/prometheus`, for operators who
//! already scrape Prometheus text format from every other service in
//! their fleet.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::state::GatewayState;

/// `GET /metrics/prometheus` — renders `# HELP`/`# TYPE` text format.
pub async fn prometheus(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GatewayConfig};
    use crate::forward::Forwarder;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    #[tokio::test]
    async fn prometheus_endpoint_renders_gate_family() {
        let state = Arc::new(
            GatewayState::new(
                Config {
                    gateway: GatewayConfig::default(),
                    upstreams: Default::default(),
                    routes: Vec::new(),
                },
                PathBuf::from("gateway.toml"),
                Forwarder::new().unwrap(),
            )
            .unwrap(),
        );
        state.metrics.record_gate(crate::metrics::GateKind::Allowed);
        let response = prometheus(State(state)).await.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("gateway_gate_total{kind=\"allowed\"} 1"));
    }
}
