//! Room domain model: decks, mixer, queue, members.
//!
//! These types are pure data plus small invariant-preserving helpers; all
//! mutation policy lives in the engine's validate/apply layers.

pub mod deck;
pub mod mixer;
pub mod queue;
pub mod room;

pub use deck::{DeckId, DeckState, PlayState};
pub use mixer::{ControlId, ControlOwner, ControlOwners, EqBand, FxState, FxType, MixerState};
pub use queue::{QueueItem, QueueItemStatus};
pub use room::{CursorState, Member, RoomState};
