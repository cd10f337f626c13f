//! The root room aggregate: members, queue, decks, mixer, ownerships.

use serde::{Deserialize, Serialize};

use super::deck::{DeckId, DeckState};
use super::mixer::{ControlId, ControlOwners, MixerState};
use super::queue::QueueItem;
use crate::protocol_constants::MEMBER_COLORS;

/// A member's shared cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub x: f64,
    pub y: f64,
    pub last_updated: u64,
}

/// A connected member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Stable per session; reconnects re-identify by this id.
    pub client_id: String,
    pub name: String,
    pub color: String,
    pub joined_at: u64,
    pub is_host: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorState>,
    /// Last one-way latency estimate from time sync.
    pub latency_ms: u64,
}

/// Authoritative state of one room. Mutated only on the room's own task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    /// Human-typable invite code.
    pub room_code: String,
    /// Strictly increasing per accepted mutation.
    pub version: u64,
    pub created_at: u64,
    pub host_id: String,
    /// Ordered by join time.
    pub members: Vec<Member>,
    pub queue: Vec<QueueItem>,
    pub deck_a: DeckState,
    pub deck_b: DeckState,
    pub mixer: MixerState,
    pub control_owners: ControlOwners,
}

impl RoomState {
    /// Creates an empty room with default decks and mixer.
    pub fn new(room_id: String, room_code: String, now_ms: u64) -> Self {
        Self {
            room_id,
            room_code,
            version: 0,
            created_at: now_ms,
            host_id: String::new(),
            members: Vec::new(),
            queue: Vec::new(),
            deck_a: DeckState::new(DeckId::A, now_ms),
            deck_b: DeckState::new(DeckId::B, now_ms),
            mixer: MixerState::default(),
            control_owners: ControlOwners::new(),
        }
    }

    pub fn member(&self, client_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.client_id == client_id)
    }

    pub fn member_mut(&mut self, client_id: &str) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.client_id == client_id)
    }

    pub fn deck(&self, deck_id: DeckId) -> &DeckState {
        match deck_id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub fn deck_mut(&mut self, deck_id: DeckId) -> &mut DeckState {
        match deck_id {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    pub fn queue_item(&self, queue_item_id: &str) -> Option<&QueueItem> {
        self.queue.iter().find(|q| q.id == queue_item_id)
    }

    pub fn queue_index(&self, queue_item_id: &str) -> Option<usize> {
        self.queue.iter().position(|q| q.id == queue_item_id)
    }

    /// Appends a new member, assigning a palette color by join index and
    /// making them host when the room was empty.
    pub fn add_member(&mut self, client_id: String, name: String, now_ms: u64) -> &Member {
        let is_host = self.members.is_empty();
        if is_host {
            self.host_id = client_id.clone();
        }
        let color = MEMBER_COLORS[self.members.len() % MEMBER_COLORS.len()].to_string();
        self.members.push(Member {
            client_id,
            name,
            color,
            joined_at: now_ms,
            is_host,
            cursor: None,
            latency_ms: 0,
        });
        self.members.last().expect("member just pushed")
    }

    /// Removes a member, returning it if present.
    pub fn remove_member(&mut self, client_id: &str) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.client_id == client_id)?;
        Some(self.members.remove(idx))
    }

    /// Promotes the earliest-joined remaining member to host.
    ///
    /// Returns the new host's client id, or `None` when the room is empty.
    pub fn migrate_host(&mut self) -> Option<String> {
        let new_host = self
            .members
            .iter_mut()
            .min_by_key(|m| m.joined_at)
            .map(|m| {
                m.is_host = true;
                m.client_id.clone()
            })?;
        self.host_id = new_host.clone();
        for m in &mut self.members {
            m.is_host = m.client_id == self.host_id;
        }
        Some(new_host)
    }

    /// Active (non-expired) owner of a control, if any.
    pub fn active_owner(
        &self,
        control: ControlId,
        now_ms: u64,
        ttl_ms: u64,
    ) -> Option<&super::mixer::ControlOwner> {
        self.control_owners
            .get(&control)
            .filter(|o| o.is_active(now_ms, ttl_ms))
    }

    /// Clears all ownership leases held by a member.
    pub fn clear_ownerships_of(&mut self, client_id: &str) {
        self.control_owners.retain(|_, o| o.client_id != client_id);
    }

    /// Whether the given queue item is referenced by either deck.
    pub fn item_on_deck(&self, queue_item_id: &str) -> Option<DeckId> {
        if self.deck_a.loaded_queue_item_id.as_deref() == Some(queue_item_id) {
            Some(DeckId::A)
        } else if self.deck_b.loaded_queue_item_id.as_deref() == Some(queue_item_id) {
            Some(DeckId::B)
        } else {
            None
        }
    }
}
