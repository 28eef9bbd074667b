//! HTTP surface of the relay
//!
//! ## Endpoints
//!
//! - `GET /ws` - live stream of every raw payload consumed from the queues
//! - `GET /health` - service status, consumed queues and connected viewers
//! - `GET /api/v1/devices/{mac}/readings` - recent readings of a device
//! - `GET /api/v1/devices/{mac}/alerts` - recent alerts of a device

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{AlertsResponse, HealthResponse, ReadingsResponse};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::info;

use crate::config::HttpConfig;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable permissive CORS for browser dashboards
    pub enable_cors: bool,
}

impl From<&HttpConfig> for ApiConfig {
    fn from(http: &HttpConfig) -> Self {
        Self {
            bind_addr: SocketAddr::new(http.addr, http.port),
            enable_cors: http.enable_cors,
        }
    }
}

/// Build the router with all routes
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/ws", get(websocket::websocket_handler))
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/devices/:mac/readings",
            get(routes::devices::recent_readings),
        )
        .route(
            "/api/v1/devices/:mac/alerts",
            get(routes::devices::recent_alerts),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use anyhow::Context;

    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
