//! Track catalog abstraction.
//!
//! The engine never talks to the upload service or metadata database
//! directly; it consumes this trait. A catalog hit overrides client-supplied
//! titles/durations on `QUEUE_ADD` and seeds the deck's detected BPM on
//! `DECK_LOAD`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Metadata for a known track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub duration_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
}

/// Lookup into the external track service.
pub trait TrackCatalog: Send + Sync {
    /// Returns metadata for the track, or `None` when unknown.
    fn lookup(&self, track_id: &str) -> Option<TrackInfo>;
}

/// Catalog that knows nothing; client payloads are trusted as-is.
pub struct NullCatalog;

impl TrackCatalog for NullCatalog {
    fn lookup(&self, _track_id: &str) -> Option<TrackInfo> {
        None
    }
}

/// In-memory catalog, used by tests and demo deployments.
#[derive(Default)]
pub struct StaticCatalog {
    tracks: RwLock<HashMap<String, TrackInfo>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a track.
    pub fn insert(&self, track_id: impl Into<String>, info: TrackInfo) {
        self.tracks.write().insert(track_id.into(), info);
    }
}

impl TrackCatalog for StaticCatalog {
    fn lookup(&self, track_id: &str) -> Option<TrackInfo> {
        self.tracks.read().get(track_id).cloned()
    }
}
