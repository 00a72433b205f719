use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use backend_application::AppState;
use backend_domain::RuntimeConfig;
use backend_interfaces_http::build_router;

use crate::context::AppContext;

/// Per-request bounds for the ingest and query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpLimits {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

impl HttpLimits {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            max_body_bytes: usize::try_from(config.max_body_bytes).unwrap_or(usize::MAX),
            // zero would fail every request
            request_timeout: Duration::from_secs(config.request_timeout_seconds.max(1)),
        }
    }
}

/// Routes plus body limit, request timeout, CORS and request tracing.
/// Tracing is outermost so rejected and timed-out requests are logged too.
pub fn build_router_with_layers(state: AppState) -> Router {
    let limits = HttpLimits::from_config(&state.config);
    build_router(state)
        .layer(RequestBodyLimitLayer::new(limits.max_body_bytes))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn run_standalone(config_path: Option<String>) -> Result<()> {
    let state = AppContext::new(config_path.as_deref()).await?.state;
    let addr: SocketAddr = state
        .config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind_addr '{}'", state.config.bind_addr))?;
    let limits = HttpLimits::from_config(&state.config);
    let places = state.place_index.place_count().await;

    let listener = TcpListener::bind(addr).await?;
    info!(
        "wayfarer listening on {} ({} places indexed, body limit {} bytes, request timeout {}s)",
        addr,
        places,
        limits.max_body_bytes,
        limits.request_timeout.as_secs()
    );

    axum::serve(listener, build_router_with_layers(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("wayfarer stopped");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received, draining requests"),
        _ = terminate => info!("terminate received, draining requests"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_body_bytes: u64, request_timeout_seconds: u64) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: None,
            settings_path: "detection_settings.yaml".to_string(),
            places_path: "places.json".to_string(),
            settings_cache_seconds: 30,
            detection_timeout_seconds: 10,
            visit_history_limit: 500,
            location_buffer_limit: 10_000,
            visit_webhook_url: None,
            visit_webhook_token: None,
            visit_webhook_secret: None,
            max_body_bytes,
            request_timeout_seconds,
        }
    }

    #[test]
    fn limits_follow_runtime_config() {
        let limits = HttpLimits::from_config(&config(8 * 1024 * 1024, 15));
        assert_eq!(limits.max_body_bytes, 8 * 1024 * 1024);
        assert_eq!(limits.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_timeout_is_raised_to_one_second() {
        let limits = HttpLimits::from_config(&config(1024, 0));
        assert_eq!(limits.request_timeout, Duration::from_secs(1));
    }
}
