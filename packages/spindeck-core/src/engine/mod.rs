//! The room engine: composition of store, pipeline, rate limiting,
//! idempotency and persistence behind one root object.
//!
//! The [`Engine`] is transport-agnostic: the API layer resolves WebSocket
//! frames into calls on it and subscribes to per-room broadcast channels for
//! fan-out.

mod actor;
mod apply;
mod idempotency;
mod rate_limit;
mod store;
mod validate;

pub use idempotency::{IdempotencyRecord, SeqClass};
pub use rate_limit::{RateBucket, RateLimiter};

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};

use crate::catalog::TrackCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::RoomState;
use crate::persist::PersistenceSink;
use crate::protocol::{ClientEnvelope, RoomMessage};
use crate::utils::{mint_room_id, now_millis};

use actor::RoomCommand;
use store::RoomIndex;

/// Dependencies shared by the engine root and every room actor.
pub(crate) struct EngineShared {
    pub config: EngineConfig,
    pub rate_limiter: RateLimiter,
    pub persistence: Arc<dyn PersistenceSink>,
    pub catalog: Arc<dyn TrackCatalog>,
}

/// Result of creating or joining a room.
#[derive(Debug)]
pub struct JoinedRoom {
    pub room_id: String,
    pub room_code: String,
    pub client_id: String,
    /// Snapshot taken at join time, consistent with the first broadcast the
    /// receiver will observe.
    pub state: RoomState,
    pub rx: broadcast::Receiver<RoomMessage>,
}

/// Counters for the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub rooms: usize,
    pub clients: usize,
}

/// Authoritative engine for all rooms in this process.
pub struct Engine {
    shared: Arc<EngineShared>,
    index: Arc<RoomIndex>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        persistence: Arc<dyn PersistenceSink>,
        catalog: Arc<dyn TrackCatalog>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limits.clone());
        Self {
            shared: Arc::new(EngineShared {
                config,
                rate_limiter,
                persistence,
                catalog,
            }),
            index: Arc::new(RoomIndex::default()),
        }
    }

    /// Creates a room and joins the creator as its host.
    pub async fn create_room(
        &self,
        host_name: &str,
        connection_id: &str,
    ) -> EngineResult<JoinedRoom> {
        let room_id = mint_room_id();
        let room_code = self.index.reserve_code(&room_id);
        let state = RoomState::new(room_id.clone(), room_code.clone(), now_millis());
        store::spawn_room(
            Arc::clone(&self.index),
            Arc::clone(&self.shared),
            state,
            IdempotencyRecord::new(self.shared.config.recent_event_capacity),
        );
        log::info!("[Engine] room {room_code} created");
        self.join_via(&room_id, host_name, None, connection_id).await
    }

    /// Joins a room by invite code.
    ///
    /// A known `client_id` re-binds the connection to that member
    /// (reconnect); otherwise a new member is added.
    pub async fn join_room(
        &self,
        room_code: &str,
        name: &str,
        client_id: Option<String>,
        connection_id: &str,
    ) -> EngineResult<JoinedRoom> {
        let code = room_code.trim().to_uppercase();
        let room_id = self
            .index
            .codes
            .get(&code)
            .map(|r| r.value().clone())
            .ok_or_else(|| EngineError::RoomNotFound(code.clone()))?;
        self.join_via(&room_id, name, client_id, connection_id).await
    }

    async fn join_via(
        &self,
        room_id: &str,
        name: &str,
        client_id: Option<String>,
        connection_id: &str,
    ) -> EngineResult<JoinedRoom> {
        let tx = self
            .index
            .rooms
            .get(room_id)
            .map(|e| e.tx.clone())
            .ok_or_else(|| EngineError::RoomNotFound(room_id.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(RoomCommand::Join {
            name: name.to_string(),
            client_id,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::RoomNotFound(room_id.to_string()))?;
        let accepted = reply_rx
            .await
            .map_err(|_| EngineError::RoomNotFound(room_id.to_string()))??;

        self.index.connections.insert(
            connection_id.to_string(),
            (room_id.to_string(), accepted.client_id.clone()),
        );
        Ok(JoinedRoom {
            room_id: room_id.to_string(),
            room_code: accepted.state.room_code.clone(),
            client_id: accepted.client_id,
            state: accepted.state,
            rx: accepted.rx,
        })
    }

    /// Removes the connection's member from its room. Idempotent.
    pub fn leave(&self, connection_id: &str) {
        if let Some((_, (room_id, client_id))) = self.index.connections.remove(connection_id) {
            if let Some(entry) = self.index.rooms.get(&room_id) {
                let _ = entry.tx.send(RoomCommand::Leave { client_id });
            }
        }
    }

    /// Enqueues a room event for the connection's room.
    pub fn submit(&self, connection_id: &str, envelope: ClientEnvelope) -> EngineResult<()> {
        let (room_id, client_id) = self
            .index
            .connections
            .get(connection_id)
            .map(|c| c.value().clone())
            .ok_or(EngineError::NotInRoom)?;
        let entry = self
            .index
            .rooms
            .get(&room_id)
            .ok_or_else(|| EngineError::RoomNotFound(room_id.clone()))?;
        entry
            .tx
            .send(RoomCommand::Event {
                client_id,
                envelope,
            })
            .map_err(|_| EngineError::RoomNotFound(room_id.clone()))
    }

    /// Stores a latency measurement for the connection's member.
    pub fn record_latency(&self, connection_id: &str, latency_ms: u64) {
        if let Some(conn) = self.index.connections.get(connection_id) {
            let (room_id, client_id) = conn.value().clone();
            drop(conn);
            if let Some(entry) = self.index.rooms.get(&room_id) {
                let _ = entry.tx.send(RoomCommand::UpdateLatency {
                    client_id,
                    latency_ms,
                });
            }
        }
    }

    /// Consistent snapshot of a room's state, if the room is live.
    pub async fn room_snapshot(&self, room_id: &str) -> Option<RoomState> {
        let tx = self.index.rooms.get(room_id).map(|e| e.tx.clone())?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(RoomCommand::Snapshot { reply: reply_tx }).ok()?;
        reply_rx.await.ok()
    }

    /// Live room and connection counts.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            rooms: self.index.rooms.len(),
            clients: self.index.connections.len(),
        }
    }

    /// Resurrects persisted rooms at startup. Restored rooms come back with
    /// no members and are destroyed after the usual grace unless joined.
    pub fn restore_rooms(&self) -> usize {
        let mut restored = 0;
        for room_id in self.shared.persistence.list() {
            match self.shared.persistence.restore(&room_id) {
                Ok(Some(snapshot)) => {
                    if self.index.rooms.contains_key(&snapshot.state.room_id) {
                        continue;
                    }
                    let idempotency = IdempotencyRecord::from_snapshot(
                        snapshot.idempotency,
                        self.shared.config.recent_event_capacity,
                    );
                    // Connections did not survive the restart: the room comes
                    // back with no members and re-elects a host on first join.
                    let mut state = snapshot.state;
                    state.members.clear();
                    state.control_owners.clear();
                    self.index
                        .codes
                        .insert(state.room_code.clone(), state.room_id.clone());
                    store::spawn_room(
                        Arc::clone(&self.index),
                        Arc::clone(&self.shared),
                        state,
                        idempotency,
                    );
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("[Engine] failed to restore room {room_id}: {e}");
                }
            }
        }
        if restored > 0 {
            log::info!("[Engine] restored {restored} room(s) from persistence");
        }
        restored
    }

    /// Signals every room actor to take a final snapshot and stop.
    pub fn shutdown(&self) {
        for entry in self.index.rooms.iter() {
            let _ = entry.value().tx.send(RoomCommand::Shutdown);
        }
    }

    /// Label of the configured persistence sink (for the health endpoint).
    pub fn persistence_label(&self) -> &'static str {
        self.shared.persistence.label()
    }
}
