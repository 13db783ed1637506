//! HTTP surface: router assembly, startup, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::library::PlexClient;
use crate::streaming::StreamProvider;
use crate::transcode::Supervisor;

pub mod routes_images;
pub mod routes_stream;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    /// The one active delivery strategy.
    pub provider: Arc<dyn StreamProvider>,
    /// Remote library client, used directly only by the image routes.
    pub library: Arc<PlexClient>,
    /// Flipped off once shutdown begins.
    pub healthy: Arc<AtomicBool>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/stream/movies/:asset_id/index.m3u8",
            get(routes_stream::playlist),
        )
        .route(
            "/stream/movies/:asset_id/:segment_name",
            get(routes_stream::segment),
        )
        .route("/imgs/movies/:asset_id/:image", get(routes_images::artwork))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    if ctx.healthy.load(Ordering::Relaxed) {
        (StatusCode::OK, Json(serde_json::json!({"healthy": true})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"healthy": false})),
        )
    }
}

/// Start the HTTP server and block until shutdown completes.
///
/// On a shutdown signal the listener stops accepting requests, then the
/// provider releases its sessions and the supervisor terminates every live
/// encoder process before this returns.
pub async fn start_server(
    config: &Config,
    provider: Arc<dyn StreamProvider>,
    library: Arc<PlexClient>,
    supervisor: Arc<Supervisor>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    let healthy = Arc::new(AtomicBool::new(true));
    let ctx = AppContext {
        provider: Arc::clone(&provider),
        library,
        healthy: Arc::clone(&healthy),
    };
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    healthy.store(false, Ordering::Relaxed);
    tracing::info!("Shutting down: releasing sessions and encoder processes");
    provider.shutdown().await;
    supervisor.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
