//! The gateway's single HTTP surface: admin introspection/control routes
//! plus the `/api/**` passthrough, all served from one axum [`Router`].

pub mod admin;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod request_id;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::state::GatewayState;

/// Build the full gateway router. Request-id assignment and HTTP tracing
/// are layered on in `main.rs`, outside this function, so every route —
/// including ones a future change might add here — gets them for free.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics/prometheus", get(metrics::prometheus))
        .merge(admin::router())
        .route("/api/{*rest}", axum::routing::any(proxy::proxy))
        .with_state(state)
}
