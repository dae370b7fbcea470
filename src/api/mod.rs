//! REST API and WebSocket server for the sensor hub
//!
//! This module provides a small HTTP surface for health checks and stream
//! discovery, plus WebSocket support for real-time sensor streaming and
//! analytics requests.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check with hub status
//! - `GET /api/v1/streams` - List known stream names
//! - `WS /api/v1/stream` - Real-time sensor streaming and analytics

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser clients
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8080).into(),
            enable_cors: true,
        }
    }
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health_check))
        .route("/api/v1/streams", get(routes::list_streams))
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
