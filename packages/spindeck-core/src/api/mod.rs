//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to the engine; this module owns router
//! construction and server startup.

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::ServerError;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Transport configuration.
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// Port to bind (0 = scan the fallback range).
    pub preferred_port: u16,
    /// Allowed CORS origins; empty means any. Each origin is also accepted
    /// with/without a `www.` prefix.
    pub cors_origins: Vec<String>,
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// The room engine.
    pub engine: Arc<Engine>,
    /// WebSocket connection tracking.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Transport configuration.
    pub api: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, ws_manager: Arc<WsConnectionManager>, api: ApiConfig) -> Self {
        Self {
            engine,
            ws_manager,
            api: Arc::new(api),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.api.preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(49420, 49430).await?
    };

    log::info!("Server listening on http://0.0.0.0:{port}");
    let app = http::create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
