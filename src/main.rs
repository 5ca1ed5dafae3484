use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod breaker;
mod clock;
mod config;
mod error;
mod forward;
mod limiter;
mod metrics;
mod pipeline;
mod state;

pub use config::Config;
pub use error::{AppError, GatewayError};

#[tokio::main]
async fn main() {
    // When invoked as a Docker HEALTHCHECK, hit /health and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        healthcheck().await;
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=warn".into()),
        )
        .init();

    let config_path = std::env::var("GATEWAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./gateway.toml"));

    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path.display(), error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    apply_env_overrides(&mut config);

    info!(
        port = config.gateway.port,
        host = %config.gateway.host,
        upstreams = config.upstreams.len(),
        routes = config.routes.len(),
        "gateway starting"
    );

    let forwarder = match forward::Forwarder::new() {
        Ok(forwarder) => forwarder,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let gateway_state = match state::GatewayState::new(config, config_path, forwarder) {
        Ok(gateway_state) => Arc::new(gateway_state),
        Err(e) => {
            error!(error = %e, "failed to construct gateway state");
            std::process::exit(1);
        }
    };

    tokio::spawn(idle_eviction_task(Arc::clone(&gateway_state)));
    tokio::spawn(config_watcher(Arc::clone(&gateway_state)));

    let config = gateway_state.config();
    let addr: SocketAddr = match format!("{}:{}", config.gateway.host, config.gateway.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid host/port configuration");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind listener");
            std::process::exit(2);
        }
    };

    info!(%addr, "gateway listening");

    let app = api::router(Arc::clone(&gateway_state))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(tower_http::cors::CorsLayer::permissive());

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = result {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// Apply the gateway's optional environment-variable overrides on top of
/// whatever the config file set. Unset or unparsable variables leave the
/// file's value untouched.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = std::env::var("GATEWAY_PORT").unwrap_or_default().parse() {
        config.gateway.port = port;
    }
    if let Ok(host) = std::env::var("GATEWAY_HOST") {
        config.gateway.host = host;
    }
    if let Ok(header) = std::env::var("GATEWAY_CLIENT_HEADER") {
        config.gateway.client_header = header;
    }
    if let Ok(window) = std::env::var("GATEWAY_LATENCY_WINDOW").unwrap_or_default().parse() {
        config.gateway.latency_window = window;
    }
    if let Ok(tier) = std::env::var("GATEWAY_DEFAULT_TIER") {
        config.gateway.default_tier = tier;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

/// Lightweight healthcheck: GET /health and exit 0 on 200, 1 otherwise.
/// Invoked via `gateway --healthcheck` from a Docker HEALTHCHECK.
async fn healthcheck() {
    let port = std::env::var("GATEWAY_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8000);

    let url = format!("http://127.0.0.1:{port}/health");
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

/// Background task: evicts rate-limit registry entries idle for longer
/// than `gateway.client_idle_ttl_secs`. Runs every 60 seconds — frequent
/// enough to bound memory growth, infrequent enough to never show up on
/// a profile.
async fn idle_eviction_task(gateway_state: Arc<state::GatewayState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.tick().await;

    loop {
        interval.tick().await;
        let ttl = Duration::from_secs(gateway_state.config().gateway.client_idle_ttl_secs);
        let now = gateway_state.clock.now();
        let evicted = gateway_state.limiter.evict_idle(ttl, now);
        if evicted > 0 {
            info!(evicted, "idle client records evicted");
        }
    }
}

/// Background task: polls the config file every 5 seconds and hot-reloads
/// the upstream and route-cost tables on change. Parse/validation
/// failures are logged and the running config is left untouched. Scoped
/// to the upstream/route tables only — `gateway.port`/`gateway.host`
/// cannot change while the listener is already bound.
async fn config_watcher(gateway_state: Arc<state::GatewayState>) {
    let path = gateway_state.config_path.clone();

    let mut last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.tick().await;

    loop {
        interval.tick().await;

        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        if mtime == last_mtime {
            continue;
        }

        match Config::load(&path) {
            Ok(new_config) => {
                gateway_state.replace_config(new_config);
                info!(path = %path.display(), "config hot-reloaded");
                last_mtime = mtime;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config reload failed — keeping previous config");
            }
        }
    }
}
