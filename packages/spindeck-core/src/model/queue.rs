//! Shared queue items and their deck-driven status transitions.

use serde::{Deserialize, Serialize};

use super::deck::DeckId;

/// Lifecycle status of a queue item.
///
/// Driven by `DECK_LOAD` / `DECK_PLAY` / `DECK_PAUSE` and finalization; an
/// item that is loaded or playing on a deck cannot be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueueItemStatus {
    #[default]
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "loaded_A")]
    LoadedA,
    #[serde(rename = "loaded_B")]
    LoadedB,
    #[serde(rename = "playing_A")]
    PlayingA,
    #[serde(rename = "playing_B")]
    PlayingB,
    #[serde(rename = "played")]
    Played,
}

impl QueueItemStatus {
    /// Status for an item loaded on the given deck.
    pub fn loaded(deck: DeckId) -> Self {
        match deck {
            DeckId::A => Self::LoadedA,
            DeckId::B => Self::LoadedB,
        }
    }

    /// Status for an item playing on the given deck.
    pub fn playing(deck: DeckId) -> Self {
        match deck {
            DeckId::A => Self::PlayingA,
            DeckId::B => Self::PlayingB,
        }
    }

    /// Whether the item currently occupies a deck.
    pub fn is_on_deck(self) -> bool {
        !matches!(self, Self::Queued | Self::Played)
    }
}

/// A track in the shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Server-minted identifier.
    pub id: String,
    pub track_id: String,
    pub title: String,
    pub duration_sec: f64,
    pub added_by: String,
    pub added_at: u64,
    pub status: QueueItemStatus,
}
