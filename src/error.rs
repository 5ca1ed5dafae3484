//! Typed gateway errors and their HTTP surfacing.
//!
//! [`GatewayError`] covers the error kinds the core surfaces (rate-limit
//! denial, circuit trip, upstream failure, unknown tier, unmatched route).
//! Limiter and breaker denials are recovered locally — [`IntoResponse`]
//! turns them directly into 429/503/502 responses; they never propagate
//! out of the admission pipeline. A timeout carries no upstream status any
//! more than a transport failure does, so both synthesize 502.
//! Configuration errors are never constructed here — they only ever
//! surface from `main` at boot, via plain `anyhow::Result`.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Cap applied to the `Retry-After` header for a permanent rate-limit
/// denial (requesting more tokens than the bucket could ever hold).
const PERMANENT_RETRY_AFTER_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded {
        retry_after: Duration,
        /// Set when the request asked for more tokens than the bucket's
        /// capacity — this client can never succeed at this cost, not just
        /// right now.
        permanent: bool,
    },

    #[error("circuit open for upstream `{upstream}`, retry after {retry_after:?}")]
    CircuitOpen {
        upstream: String,
        retry_after: Duration,
    },

    #[error("upstream `{upstream}` unavailable: {source}")]
    UpstreamUnavailable {
        upstream: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("upstream `{upstream}` timed out")]
    UpstreamTimeout { upstream: String },

    #[error("unknown tier `{0}`")]
    UnknownTier(String),

    #[error("no route configured for path `{0}`")]
    NoRoute(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::RateLimitExceeded {
                retry_after,
                permanent,
            } => {
                let secs = if permanent {
                    tracing::warn!(permanent = true, "rate limit exceeded permanently (n > capacity)");
                    PERMANENT_RETRY_AFTER_SECS
                } else {
                    retry_after.as_secs_f64().ceil() as u64
                };
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", secs.to_string())],
                    Json(json!({ "error": "rate_limited", "retry_after": secs })),
                )
                    .into_response()
            }
            GatewayError::CircuitOpen {
                upstream,
                retry_after,
            } => {
                let secs = retry_after.as_secs_f64().ceil() as u64;
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [("retry-after", secs.to_string())],
                    Json(json!({ "error": "upstream_unavailable", "upstream": upstream })),
                )
                    .into_response()
            }
            GatewayError::UpstreamUnavailable { upstream, source } => {
                tracing::warn!(%upstream, error = %source, "upstream unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "upstream_error" })),
                )
                    .into_response()
            }
            GatewayError::UpstreamTimeout { upstream } => {
                tracing::warn!(%upstream, "upstream timed out");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "upstream_error" })),
                )
                    .into_response()
            }
            GatewayError::UnknownTier(tier) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "unknown_tier", "tier": tier })),
            )
                .into_response(),
            GatewayError::NoRoute(path) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "no_route", "path": path })),
            )
                .into_response(),
        }
    }
}

/// Wraps [`anyhow::Error`] so arbitrary handler failures (config
/// introspection, JSON (de)serialization, anything not already a
/// [`GatewayError`]) can be returned from axum handlers.
///
/// Any type that implements `Into<anyhow::Error>` converts via the blanket
/// [`From`] implementation below — no manual `map_err`.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "handler error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn rate_limit_response_has_retry_after_header() {
        let err = GatewayError::RateLimitExceeded {
            retry_after: Duration::from_millis(1500),
            permanent: false,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "2");
    }

    #[tokio::test]
    async fn permanent_rate_limit_caps_retry_after_at_one_hour() {
        let err = GatewayError::RateLimitExceeded {
            retry_after: Duration::from_secs(999_999),
            permanent: true,
        };
        let resp = err.into_response();
        assert_eq!(
            resp.headers().get("retry-after").unwrap(),
            &PERMANENT_RETRY_AFTER_SECS.to_string()
        );
    }

    #[tokio::test]
    async fn circuit_open_returns_503_with_upstream_name() {
        let err = GatewayError::CircuitOpen {
            upstream: "payments".into(),
            retry_after: Duration::from_secs(10),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["upstream"], "payments");
    }

    #[tokio::test]
    async fn upstream_timeout_maps_to_502() {
        let err = GatewayError::UpstreamTimeout {
            upstream: "payments".into(),
        };
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
