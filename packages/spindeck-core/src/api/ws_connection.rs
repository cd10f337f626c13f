//! WebSocket connection tracking.
//!
//! Assigns stable connection ids, counts live connections for the health
//! endpoint, and supports force-closing everything on shutdown via
//! hierarchical cancellation tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::utils::now_millis;

struct ConnectionState {
    #[allow(dead_code)]
    connected_at: u64,
}

/// Tracks all active WebSocket connections.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionState>,
    next_id: AtomicU64,
    /// Cancelled to force-close every connection; replaced afterwards so new
    /// connections can still be accepted.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a connection; the returned guard unregisters it on drop.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = format!("conn-{id}");
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(
            conn_id.clone(),
            ConnectionState {
                connected_at: now_millis(),
            },
        );
        log::info!(
            "[WS] connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            log::info!(
                "[WS] connection unregistered: {} (remaining: {})",
                id,
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every connection handler to terminate. Returns how many were
    /// signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] force-closing {count} connection(s)");
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a connection when dropped.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token cancelled on force-close; select on it in the handler loop.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_drop_updates_count() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard = manager.register();
        assert_eq!(manager.connection_count(), 1);
        assert!(guard.id().starts_with("conn-"));
        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let manager = Arc::new(WsConnectionManager::new());
        let a = manager.register();
        let b = manager.register();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn close_all_cancels_live_tokens_and_accepts_new() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard = manager.register();
        let token = guard.cancel_token().clone();
        assert!(!token.is_cancelled());

        assert_eq!(manager.close_all(), 1);
        assert!(token.is_cancelled());

        // New registrations get a fresh, uncancelled token
        let fresh = manager.register();
        assert!(!fresh.cancel_token().is_cancelled());
    }
}
