//! Best-effort room snapshot persistence.
//!
//! Snapshots are opportunistic and must never block the event pipeline: the
//! engine clones the room state and hands it to a blocking task. Failures are
//! logged and ignored.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RoomState;

/// Persisted idempotency half of a room snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencySnapshot {
    /// Highest accepted sequence (and its event id) per client.
    pub last_seq_by_client: HashMap<String, (u64, String)>,
    /// Recently accepted event ids with insertion timestamps, oldest first.
    pub recent_event_ids: Vec<(String, u64)>,
}

/// Snapshot of one room, opaque to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub version: u64,
    pub state: RoomState,
    pub idempotency: IdempotencySnapshot,
}

/// Errors from a persistence sink.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Best-effort snapshot sink for room state.
pub trait PersistenceSink: Send + Sync {
    /// Persists a snapshot, replacing any previous one for the room.
    fn snapshot(&self, room_id: &str, snapshot: &RoomSnapshot) -> Result<(), PersistenceError>;

    /// Loads the last snapshot for a room, if any.
    fn restore(&self, room_id: &str) -> Result<Option<RoomSnapshot>, PersistenceError>;

    /// Room ids with stored snapshots (for startup restore).
    fn list(&self) -> Vec<String> {
        Vec::new()
    }

    /// Discards a room's snapshot. Default: no-op.
    fn remove(&self, _room_id: &str) {}

    /// Short label for the health endpoint.
    fn label(&self) -> &'static str;
}

/// Sink that discards everything.
pub struct NoopPersistence;

impl PersistenceSink for NoopPersistence {
    fn snapshot(&self, _room_id: &str, _snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn restore(&self, _room_id: &str) -> Result<Option<RoomSnapshot>, PersistenceError> {
        Ok(None)
    }

    fn label(&self) -> &'static str {
        "none"
    }
}

/// JSON-file sink, one file per room under a data directory.
///
/// Writes go to a temp file first, then an atomic rename, so a crash can
/// never leave a half-written snapshot.
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Creates the sink, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, room_id: &str) -> PathBuf {
        // File names must stay inside the data directory.
        let safe: String = room_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("room-{safe}.json"))
    }
}

impl PersistenceSink for FilePersistence {
    fn snapshot(&self, room_id: &str, snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
        let path = self.path_for(room_id);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string(snapshot)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn restore(&self, room_id: &str) -> Result<Option<RoomSnapshot>, PersistenceError> {
        let path = self.path_for(room_id);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let id = name.strip_prefix("room-")?.strip_suffix(".json")?;
                Some(id.to_string())
            })
            .collect()
    }

    fn remove(&self, room_id: &str) {
        let _ = std::fs::remove_file(self.path_for(room_id));
    }

    fn label(&self) -> &'static str {
        "file"
    }
}
