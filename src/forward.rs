//! Outbound HTTP client collaborator — forwards an admitted request to its
//! resolved upstream and reports back status code and transport outcome.
//!
//! This forwarder does no body transformation — it passes the caller's
//! method, path, headers, and body straight through to the resolved
//! upstream's base URL. A reverse proxy, not a protocol adapter.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use reqwest::Client;

use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// The response a forward produced, stripped down to what the admission
/// pipeline and proxy handler need.
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Thin wrapper over a shared `reqwest::Client`. One instance is built at
/// boot and shared across every request — `reqwest::Client` is itself
/// cheaply cloneable and pools connections internally.
pub struct Forwarder {
    client: Client,
}

impl Forwarder {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Forward `method path` (with `body`/`headers`) to `upstream`,
    /// bounded by its configured timeout. A timeout or transport failure
    /// is surfaced as [`GatewayError::UpstreamTimeout`] /
    /// [`GatewayError::UpstreamUnavailable`] — callers treat both as a
    /// breaker failure and a synthesized 5xx, per the gateway's forward
    /// contract.
    pub async fn forward(
        &self,
        upstream_name: &str,
        upstream: &UpstreamConfig,
        method: Method,
        path_and_query: &str,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse, GatewayError> {
        let url = format!(
            "{}{}",
            upstream.base_url.trim_end_matches('/'),
            path_and_query
        );

        // The host header belongs to the upstream connection, not the
        // inbound one; reqwest sets it from the URL.
        headers.remove(axum::http::header::HOST);

        let request = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body);

        let send = tokio::time::timeout(upstream.timeout(), request.send());

        let response = match send.await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(GatewayError::UpstreamUnavailable {
                    upstream: upstream_name.to_string(),
                    source: source.into(),
                })
            }
            Err(_) => {
                return Err(GatewayError::UpstreamTimeout {
                    upstream: upstream_name.to_string(),
                })
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| GatewayError::UpstreamUnavailable {
                upstream: upstream_name.to_string(),
                source: source.into(),
            })?;

        Ok(ForwardedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Whether a forward outcome counts as a circuit-breaker failure, per the
/// upstream's `count_4xx_as_failure` setting (default false: a 4xx
/// reflects the caller's request, not upstream health).
pub fn is_failure(status: u16, count_4xx_as_failure: bool) -> bool {
    status >= 500 || (count_4xx_as_failure && (400..500).contains(&status))
}

/// Default per-upstream forward timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_failure_counts_5xx_regardless_of_flag() {
        assert!(is_failure(500, false));
        assert!(is_failure(503, true));
    }

    #[test]
    fn is_failure_ignores_4xx_by_default() {
        assert!(!is_failure(404, false));
        assert!(!is_failure(429, false));
    }

    #[test]
    fn is_failure_counts_4xx_when_configured() {
        assert!(is_failure(404, true));
    }

    #[test]
    fn is_failure_never_counts_2xx_or_3xx() {
        assert!(!is_failure(200, true));
        assert!(!is_failure(301, true));
    }
}
