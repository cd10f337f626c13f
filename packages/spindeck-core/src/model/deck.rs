//! Deck state and the playback epoch model.
//!
//! An epoch is a contiguous interval during which a deck's playback
//! parameters are unchanged. Any transition (load, play, pause, cue, seek,
//! tempo) starts a new epoch; while playing, the authoritative position at
//! server time `t` is
//! `epoch_start_playhead_sec + (t − epoch_start_time_ms) / 1000 · playback_rate`,
//! clamped to the track duration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which of the room's two decks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    /// Suffix used in queue item statuses (`loaded_A`, `playing_B`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeckId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            _ => Err(()),
        }
    }
}

/// Deck transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    #[default]
    Stopped,
    Cued,
    Paused,
    Playing,
}

/// Authoritative state of one deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub deck_id: DeckId,
    pub loaded_track_id: Option<String>,
    pub loaded_queue_item_id: Option<String>,
    pub duration_sec: Option<f64>,
    pub play_state: PlayState,
    /// Stored authoritative position at the last transition.
    pub playhead_sec: f64,
    pub cue_point_sec: Option<f64>,
    pub hot_cue_point_sec: Option<f64>,
    pub playback_rate: f64,
    pub detected_bpm: Option<f64>,
    /// Unique per play-parameter change; clients discard beacons from old epochs.
    pub epoch_id: u64,
    /// Monotonic within an epoch, bumped per beacon tick while playing.
    pub epoch_seq: u64,
    pub epoch_start_time_ms: u64,
    pub epoch_start_playhead_sec: f64,
}

impl DeckState {
    /// Creates an empty deck.
    pub fn new(deck_id: DeckId, now_ms: u64) -> Self {
        Self {
            deck_id,
            loaded_track_id: None,
            loaded_queue_item_id: None,
            duration_sec: None,
            play_state: PlayState::Stopped,
            playhead_sec: 0.0,
            cue_point_sec: None,
            hot_cue_point_sec: None,
            playback_rate: 1.0,
            detected_bpm: None,
            epoch_id: 0,
            epoch_seq: 0,
            epoch_start_time_ms: now_ms,
            epoch_start_playhead_sec: 0.0,
        }
    }

    /// Authoritative playhead at server time `now_ms`.
    ///
    /// Interpolates from the epoch anchor while playing; otherwise returns
    /// the stored playhead. Clamped to `[0, duration]` when the duration is
    /// known.
    pub fn position_at(&self, now_ms: u64) -> f64 {
        let pos = if self.play_state == PlayState::Playing {
            let elapsed_ms = now_ms.saturating_sub(self.epoch_start_time_ms);
            self.epoch_start_playhead_sec + (elapsed_ms as f64 / 1000.0) * self.playback_rate
        } else {
            self.playhead_sec
        };
        self.clamp_position(pos)
    }

    /// Clamps a position to the playable range of the loaded track.
    pub fn clamp_position(&self, pos: f64) -> f64 {
        let pos = pos.max(0.0);
        match self.duration_sec {
            Some(d) => pos.min(d),
            None => pos,
        }
    }

    /// Starts a new epoch anchored at the current stored playhead.
    ///
    /// Callers must capture an interpolated position into `playhead_sec`
    /// first when the deck was playing.
    pub fn begin_epoch(&mut self, now_ms: u64) {
        self.epoch_id += 1;
        self.epoch_seq = 0;
        self.epoch_start_time_ms = now_ms;
        self.epoch_start_playhead_sec = self.playhead_sec;
    }

    /// Whether a track is loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded_track_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_deck(start_ms: u64, start_playhead: f64, rate: f64) -> DeckState {
        let mut deck = DeckState::new(DeckId::A, start_ms);
        deck.loaded_track_id = Some("t1".into());
        deck.duration_sec = Some(120.0);
        deck.play_state = PlayState::Playing;
        deck.playhead_sec = start_playhead;
        deck.playback_rate = rate;
        deck.begin_epoch(start_ms);
        deck
    }

    #[test]
    fn deck_id_parses_only_a_and_b() {
        assert_eq!("A".parse::<DeckId>(), Ok(DeckId::A));
        assert_eq!("B".parse::<DeckId>(), Ok(DeckId::B));
        assert!("C".parse::<DeckId>().is_err());
        assert!("a".parse::<DeckId>().is_err());
    }

    #[test]
    fn position_interpolates_while_playing() {
        let deck = playing_deck(10_000, 0.0, 1.0);
        assert_eq!(deck.position_at(10_000), 0.0);
        assert!((deck.position_at(15_000) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn position_respects_playback_rate() {
        let deck = playing_deck(0, 10.0, 1.5);
        assert!((deck.position_at(4_000) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn position_clamps_at_duration() {
        let deck = playing_deck(0, 110.0, 1.0);
        assert_eq!(deck.position_at(60_000), 120.0);
    }

    #[test]
    fn position_is_monotonic_while_playing() {
        let deck = playing_deck(1_000, 3.0, 1.25);
        let mut last = 0.0;
        for t in (1_000..30_000).step_by(250) {
            let pos = deck.position_at(t);
            assert!(pos >= last, "playhead went backwards at t={t}");
            last = pos;
        }
    }

    #[test]
    fn position_static_when_paused() {
        let mut deck = playing_deck(0, 0.0, 1.0);
        deck.playhead_sec = 42.0;
        deck.play_state = PlayState::Paused;
        assert_eq!(deck.position_at(1_000_000), 42.0);
    }

    #[test]
    fn begin_epoch_resets_seq_and_anchors() {
        let mut deck = playing_deck(0, 7.5, 1.0);
        deck.epoch_seq = 12;
        let prev_epoch = deck.epoch_id;
        deck.playhead_sec = 9.0;
        deck.begin_epoch(5_000);
        assert_eq!(deck.epoch_id, prev_epoch + 1);
        assert_eq!(deck.epoch_seq, 0);
        assert_eq!(deck.epoch_start_time_ms, 5_000);
        assert_eq!(deck.epoch_start_playhead_sec, 9.0);
    }
}
