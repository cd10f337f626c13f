//! Room registry: id/code/connection maps and actor spawning.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use crate::model::RoomState;
use crate::utils::mint_room_code;

use super::actor::{RoomActor, RoomCommand};
use super::idempotency::IdempotencyRecord;
use super::EngineShared;

/// Handle to a live room's command queue.
pub(crate) struct RoomEntry {
    pub room_code: String,
    pub tx: mpsc::UnboundedSender<RoomCommand>,
}

/// Concurrent maps shared by the engine and room-actor cleanup.
#[derive(Default)]
pub(crate) struct RoomIndex {
    /// room id → live room handle
    pub rooms: DashMap<String, RoomEntry>,
    /// invite code → room id
    pub codes: DashMap<String, String>,
    /// connection id → (room id, client id)
    pub connections: DashMap<String, (String, String)>,
}

impl RoomIndex {
    /// Mints an invite code that is guaranteed unused, reserving it for the
    /// room. Collisions just retry; the code space is ~10^9.
    pub fn reserve_code(&self, room_id: &str) -> String {
        loop {
            let code = mint_room_code();
            match self.codes.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(room_id.to_string());
                    return code;
                }
            }
        }
    }
}

/// Spawns a room actor and registers it in the index.
///
/// The spawned task removes the room from every map when the actor exits, so
/// a destroyed room can never be joined through a stale handle for long; the
/// engine treats a closed command queue as `ROOM_NOT_FOUND`.
pub(crate) fn spawn_room(
    index: Arc<RoomIndex>,
    shared: Arc<EngineShared>,
    state: RoomState,
    idempotency: IdempotencyRecord,
) {
    let room_id = state.room_id.clone();
    let room_code = state.room_code.clone();

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (tx, _) = broadcast::channel(shared.config.room_channel_capacity);

    index.rooms.insert(
        room_id.clone(),
        RoomEntry {
            room_code: room_code.clone(),
            tx: cmd_tx,
        },
    );
    index.codes.entry(room_code.clone()).or_insert_with(|| room_id.clone());

    let actor = RoomActor::new(state, idempotency, tx, cmd_rx, shared);
    tokio::spawn(async move {
        actor.run().await;
        index.rooms.remove(&room_id);
        index.codes.remove(&room_code);
        index.connections.retain(|_, mapped| mapped.0 != room_id);
        log::info!("[RoomStore] room {} ({}) retired", room_id, room_code);
    });
}
