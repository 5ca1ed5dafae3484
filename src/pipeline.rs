//! The admission pipeline: composes the rate limiter, the circuit
//! breaker, the forwarder, and the metrics store into the single request
//! path every inbound call to `/api/**` takes.
//!
//! Collaborator ordering is resolve, check, forward, record — each stage
//! hands off to the next only on admission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use crate::breaker::Outcome;
use crate::error::GatewayError;
use crate::forward::{is_failure, ForwardedResponse};
use crate::metrics::GateKind;
use crate::state::GatewayState;

/// Result of a successful admission: the upstream's response plus the
/// measured forward latency, for the `X-Gateway-Latency-Ms` header.
pub struct AdmittedResponse {
    pub response: ForwardedResponse,
    pub latency_ms: f64,
}

/// Disarmed on a normal return from [`forward_and_report`]; if the
/// enclosing future is dropped before then (the caller abandoned the
/// request), `Drop` reports a breaker failure — tokens already taken are
/// never refunded, but the breaker still learns the upstream call never
/// completed cleanly.
struct BreakerReportGuard<'a> {
    state: &'a GatewayState,
    upstream: &'a str,
    now: Instant,
    armed: AtomicBool,
}

impl<'a> BreakerReportGuard<'a> {
    fn new(state: &'a GatewayState, upstream: &'a str, now: Instant) -> Self {
        Self {
            state,
            upstream,
            now,
            armed: AtomicBool::new(true),
        }
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl Drop for BreakerReportGuard<'_> {
    fn drop(&mut self) {
        if self.armed.load(Ordering::SeqCst) {
            self.state
                .breaker
                .report(self.upstream, Outcome::Failure, self.now);
        }
    }
}

/// Run the full admission pipeline for one request.
///
/// `client_id` and `path` are already extracted by the caller (the proxy
/// handler); `path` is both the route-cost lookup key and the metrics
/// label.
pub async fn admit(
    state: &GatewayState,
    client_id: &str,
    path: &str,
    method: Method,
    query: Option<&str>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<AdmittedResponse, GatewayError> {
    let config = state.config();
    let now = state.clock.now();

    let (upstream_name, upstream) = config
        .resolve_upstream(path)
        .map(|(name, upstream)| (name.to_string(), upstream.clone()))
        .ok_or_else(|| GatewayError::NoRoute(path.to_string()))?;
    let cost = config.resolve_cost(path);

    match state.limiter.check(client_id, cost as f64, now) {
        crate::limiter::TakeResult::Allowed => {}
        crate::limiter::TakeResult::Denied {
            retry_after,
            permanent,
        } => {
            state.metrics.record_gate(GateKind::RateLimited);
            return Err(GatewayError::RateLimitExceeded {
                retry_after,
                permanent,
            });
        }
    }

    match state.breaker.allow(&upstream_name, now) {
        crate::breaker::Admission::Admit => {}
        crate::breaker::Admission::Reject => {
            state.metrics.record_gate(GateKind::CircuitRejected);
            let retry_after = state
                .breaker
                .retry_after(&upstream_name, now)
                .unwrap_or_else(|| std::time::Duration::from_millis(upstream.recovery_timeout_ms));
            return Err(GatewayError::CircuitOpen {
                upstream: upstream_name,
                retry_after,
            });
        }
    }

    let guard = BreakerReportGuard::new(state, &upstream_name, now);

    let path_and_query = match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    };

    let forward_started = state.clock.now();
    let outcome = state
        .forwarder
        .forward(&upstream_name, &upstream, method, &path_and_query, headers, body)
        .await;
    let forward_finished = state.clock.now();
    let latency_ms = forward_finished
        .saturating_duration_since(forward_started)
        .as_secs_f64()
        * 1000.0;

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            // Guard stays armed: Drop reports the failure for us. Both
            // transport failure and timeout synthesize 502 — neither
            // produced an upstream status.
            state.metrics.record(path, 502, latency_ms);
            return Err(err);
        }
    };

    let failed = is_failure(response.status, upstream.count_4xx_as_failure);
    state.breaker.report(
        &upstream_name,
        if failed { Outcome::Failure } else { Outcome::Success },
        forward_finished,
    );
    guard.disarm();

    state.metrics.record(path, response.status, latency_ms);
    state.metrics.record_gate(GateKind::Allowed);

    Ok(AdmittedResponse { response, latency_ms })
}
