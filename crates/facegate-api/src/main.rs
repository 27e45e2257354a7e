//! Axum API server binary.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facegate_api::{create_router, metrics, ApiConfig, AppState};

/// Log targets enabled at `info` on top of `RUST_LOG`.
const DEFAULT_LOG_DIRECTIVES: &[&str] = &[
    "facegate_api=info",
    "facegate_access=info",
    "facegate_detector=info",
    "facegate_media=info",
];

/// How often idle per-IP limiter state is pruned.
const IP_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing()?;

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting facegate-api v{}", env!("CARGO_PKG_VERSION"));

    let config = ApiConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        backend = ?config.counter_backend,
        metered = ?config.metered_modes,
        "API config loaded"
    );
    if config.access.app_token.is_none() {
        warn!("APP_TOKEN is not set; detection endpoints will answer 500");
    }

    facegate_api::error::hide_internal_details(config.is_production());

    let state = AppState::new(config.clone()).context("failed to create application state")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let ip_limiter = state.ip_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(IP_LIMITER_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            ip_limiter.retain_recent();
        }
    });

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in DEFAULT_LOG_DIRECTIVES {
        env_filter = env_filter.add_directive(directive.parse()?);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
