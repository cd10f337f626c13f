//! Application bootstrap and dependency wiring.
//!
//! The composition root: the single place where the engine and its
//! collaborators are instantiated and wired together.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::catalog::{NullCatalog, TrackCatalog};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::persist::{FilePersistence, NoopPersistence, PersistenceSink};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct EngineServices {
    /// The room engine.
    pub engine: Arc<Engine>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl EngineServices {
    /// Initiates graceful shutdown of all services.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown...");
        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!("[Bootstrap] closed {connections_closed} WebSocket connection(s)");
        }

        self.engine.shutdown();
        log::info!("[Bootstrap] shutdown signaled");
    }
}

/// Bootstraps all services with explicit collaborators.
///
/// Validates the engine config, wires the engine, and resurrects any
/// persisted rooms.
pub fn bootstrap_services(
    config: EngineConfig,
    persistence: Arc<dyn PersistenceSink>,
    catalog: Arc<dyn TrackCatalog>,
) -> EngineResult<EngineServices> {
    config
        .validate()
        .map_err(EngineError::InvalidPayload)?;

    let engine = Arc::new(Engine::new(config, persistence, catalog));
    let restored = engine.restore_rooms();
    if restored > 0 {
        log::info!("[Bootstrap] {restored} room(s) resurrected from snapshots");
    }

    Ok(EngineServices {
        engine,
        ws_manager: Arc::new(WsConnectionManager::new()),
        cancel_token: CancellationToken::new(),
    })
}

/// Convenience bootstrap: file persistence when a data dir is given, no-op
/// otherwise; no track catalog.
pub fn bootstrap_default(
    config: EngineConfig,
    data_dir: Option<&Path>,
) -> EngineResult<EngineServices> {
    let persistence: Arc<dyn PersistenceSink> = match data_dir {
        Some(dir) => Arc::new(FilePersistence::new(dir).map_err(|e| {
            EngineError::InvalidPayload(format!("cannot open data dir {}: {e}", dir.display()))
        })?),
        None => Arc::new(NoopPersistence),
    };
    bootstrap_services(config, persistence, Arc::new(NullCatalog))
}
