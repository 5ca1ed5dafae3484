//! Liveness probe endpoint.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// `GET /health` — always returns 200 OK with `{"status": "ok"}`.
///
/// Has no dependencies and never blocks, making it safe to use as a
/// Docker / Kubernetes liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
