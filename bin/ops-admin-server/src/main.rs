//! Admin Operations Server
//!
//! Hosts the operational backbone of the store admin surface: the notification
//! bus with its live stream, the webhook registry and dispatcher, and the
//! shared cache/rate-limiter singletons. All state is in-process; restarting
//! the server starts empty.
//!
//! Configuration is environment-based:
//! - `ADMIN_API_TOKEN` (required) — bearer token accepted by the admin gate
//! - `ADMIN_API_PORT` (default 8080)
//! - `CACHE_MAX_ENTRIES` (default 500), `CACHE_TTL_MS` (default 30000)
//! - `RATE_LIMIT_CAPACITY` (default 60), `RATE_LIMIT_WINDOW_MS` (default 60000)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ops_api::{create_router, AppState, StaticTokenGate};
use ops_cache::TtlCache;
use ops_common::NotificationInput;
use ops_limit::TokenBucketLimiter;
use ops_notify::NotificationBus;
use ops_webhook::{InMemoryEndpointStore, WebhookDispatcher, WebhookDispatcherConfig};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Starting Admin Operations Server");

    // 1. Configuration
    let token = std::env::var("ADMIN_API_TOKEN").context("ADMIN_API_TOKEN must be set")?;
    let port: u16 = env_or("ADMIN_API_PORT", 8080);
    let cache_max_entries: usize = env_or("CACHE_MAX_ENTRIES", 500);
    let cache_ttl_ms: u64 = env_or("CACHE_TTL_MS", 30_000);
    let rate_limit_capacity: u32 = env_or("RATE_LIMIT_CAPACITY", 60);
    let rate_limit_window_ms: u64 = env_or("RATE_LIMIT_WINDOW_MS", 60_000);

    // 2. Process-wide singletons
    let notifications = Arc::new(NotificationBus::new());
    let endpoints = Arc::new(InMemoryEndpointStore::new());
    let dispatcher = WebhookDispatcher::new(endpoints.clone(), WebhookDispatcherConfig::default())
        .context("failed to initialize webhook dispatcher")?;
    let cache = Arc::new(TtlCache::new(
        cache_max_entries,
        Duration::from_millis(cache_ttl_ms),
    ));
    let limiter = Arc::new(TokenBucketLimiter::new(
        rate_limit_capacity,
        rate_limit_window_ms,
    ));

    let state = AppState {
        notifications: notifications.clone(),
        endpoints,
        dispatcher,
        cache,
        limiter,
        gate: Arc::new(StaticTokenGate::new(token)),
    };

    notifications.publish(
        NotificationInput::new("system.startup", "Admin operations server started")
            .with_data(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })),
    );

    // 3. HTTP server
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(port = port, "HTTP API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
