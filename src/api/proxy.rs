//! `ANY /api/**` passthrough — reads the client-id header, runs the
//! admission pipeline, and relays the upstream response with the gateway's
//! own `X-Gateway-Latency-Ms` header attached.
//!
//! The pipeline call runs inside a `tokio::spawn`ed task so a panic inside
//! it (a bug in the limiter, breaker, or forwarder) surfaces as a
//! `JoinError` here instead of taking down the whole connection — it is
//! translated to a generic 500 and the breaker still learns the call
//! never completed cleanly, per the gateway's panic-handling contract.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::breaker::Outcome;
use crate::pipeline;
use crate::state::GatewayState;

pub async fn proxy(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();

    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(e) => return crate::error::AppError::from(e).into_response(),
    };

    let client_header = state.config().gateway.client_header.clone();
    let client_id = HeaderName::from_bytes(client_header.as_bytes())
        .ok()
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string());

    let path = uri.path().to_string();
    let query = uri.query().map(str::to_string);

    // Resolved up front, outside the spawned task, so a panic inside the
    // pipeline still leaves us able to tell the breaker which upstream
    // the in-flight call was headed for.
    let upstream_name = state
        .config()
        .resolve_upstream(&path)
        .map(|(name, _)| name.to_string());

    let pipeline_state = Arc::clone(&state);
    let pipeline_client_id = client_id.clone();
    let pipeline_path = path.clone();
    let pipeline_query = query.clone();

    let result = tokio::spawn(async move {
        pipeline::admit(
            &pipeline_state,
            &pipeline_client_id,
            &pipeline_path,
            method,
            pipeline_query.as_deref(),
            headers,
            body,
        )
        .await
    })
    .await;

    match result {
        Ok(Ok(admitted)) => {
            let mut response_headers = HeaderMap::new();
            for (name, value) in admitted.response.headers.iter() {
                response_headers.insert(name.clone(), value.clone());
            }
            if let Ok(latency) = HeaderValue::from_str(&format!("{:.3}", admitted.latency_ms)) {
                response_headers.insert("x-gateway-latency-ms", latency);
            }

            let mut response = Response::builder()
                .status(admitted.response.status)
                .body(Body::from(admitted.response.body))
                .expect("status and body are always valid");
            *response.headers_mut() = response_headers;
            response
        }
        Ok(Err(err)) => err.into_response(),
        Err(join_err) => {
            tracing::error!(error = %join_err, path = %path, "panic inside admission pipeline");
            if let Some(upstream) = upstream_name {
                state.breaker.report(&upstream, Outcome::Failure, state.clock.now());
            }
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GatewayConfig, RouteConfig, UpstreamConfig};
    use crate::forward::Forwarder;
    use axum::body::to_bytes;
    use axum::http::Request as HttpRequest;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use wiremock::matchers::{method as method_matcher, path as path_matcher};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_state(upstream_base: &str) -> Arc<GatewayState> {
        let mut upstreams = HashMap::new();
        upstreams.insert(
            "echo".to_string(),
            UpstreamConfig {
                base_url: upstream_base.to_string(),
                failure_threshold: 5,
                success_threshold: 2,
                recovery_timeout_ms: 30_000,
                timeout_ms: 2_000,
                count_4xx_as_failure: false,
            },
        );
        let config = Config {
            gateway: GatewayConfig::default(),
            upstreams,
            routes: vec![RouteConfig {
                pattern: "/api/echo/**".to_string(),
                cost: 1,
            }],
        };
        Arc::new(
            GatewayState::new(config, PathBuf::from("gateway.toml"), Forwarder::new().unwrap())
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn proxy_relays_upstream_response_and_adds_latency_header() {
        let server = MockServer::start().await;
        Mock::given(method_matcher("GET"))
            .and(path_matcher("/api/echo/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;

        let state = test_state(&server.uri());
        let req = HttpRequest::builder()
            .method("GET")
            .uri("/api/echo/hello")
            .body(Body::empty())
            .unwrap();

        let response = proxy(
            State(state),
            ConnectInfo("127.0.0.1:9000".parse().unwrap()),
            req,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-gateway-latency-ms"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hi");
    }

    #[tokio::test]
    async fn proxy_falls_back_to_peer_address_when_client_header_absent() {
        let server = MockServer::start().await;
        Mock::given(method_matcher("GET"))
            .and(path_matcher("/api/echo/x"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let state = test_state(&server.uri());
        let req = HttpRequest::builder()
            .method("GET")
            .uri("/api/echo/x")
            .body(Body::empty())
            .unwrap();

        let response = proxy(
            State(Arc::clone(&state)),
            ConnectInfo("203.0.113.7:1234".parse().unwrap()),
            req,
        )
        .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let snapshot = state.limiter.list(state.clock.now());
        assert_eq!(snapshot[0].client_id, "203.0.113.7:1234");
    }

    /// Sanity check for the mechanism the panic-handling arm above relies
    /// on: a panic inside a spawned task surfaces as a `JoinError` rather
    /// than unwinding into the caller.
    #[tokio::test]
    async fn spawned_panic_surfaces_as_a_join_error() {
        let handle = tokio::spawn(async { panic!("boom") });
        let result = handle.await;
        assert!(result.unwrap_err().is_panic());
    }
}
