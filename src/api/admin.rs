//! Operator-facing introspection and control endpoints.
//!
//! Reads from [`crate::metrics::MetricsStore`] and
//! [`crate::breaker::CircuitBreakerRegistry`] for the read-only routes,
//! plus one mutating call: setting a client's tier.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::GatewayError;
use crate::limiter::Tier;
use crate::state::GatewayState;

pub fn router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/metrics/latency", get(latency))
        .route("/circuit-breakers", get(circuit_breakers))
        .route("/clients/{id}/tier", post(set_tier))
}

/// `GET /metrics` — snapshot of every route's counters plus the three
/// global gate counters.
pub async fn metrics(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// `GET /metrics/latency` — `{route: {p50,p90,p95,p99}}`.
pub async fn latency(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.metrics.latency_snapshot())
}

/// `GET /circuit-breakers` — one entry per upstream that has ever seen a
/// report or admission check.
pub async fn circuit_breakers(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let now = state.clock.now();
    Json(state.breaker.snapshot(now))
}

#[derive(Deserialize)]
pub struct SetTierRequest {
    tier: String,
}

/// `POST /clients/{id}/tier` — `{"tier": "<TIER>"}` -> `{client_id, tier}`,
/// 400 on a tier name outside the canonical set.
pub async fn set_tier(
    State(state): State<Arc<GatewayState>>,
    Path(client_id): Path<String>,
    Json(body): Json<SetTierRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let tier = Tier::parse(&body.tier).ok_or_else(|| GatewayError::UnknownTier(body.tier.clone()))?;
    let now = state.clock.now();
    state.limiter.set_tier(&client_id, tier, now);
    Ok(Json(json!({ "client_id": client_id, "tier": tier })))
}
