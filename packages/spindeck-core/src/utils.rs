//! General utilities shared across the engine.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use uuid::Uuid;

use crate::protocol_constants::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

// ─────────────────────────────────────────────────────────────────────────────
// Time
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Mints a new room identifier.
#[must_use]
pub fn mint_room_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mints a new client identifier (stable for the session).
#[must_use]
pub fn mint_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mints a new server event identifier, echoed in acks and broadcasts.
#[must_use]
pub fn mint_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mints a new queue item identifier.
#[must_use]
pub fn mint_queue_item_id() -> String {
    format!("q-{}", Uuid::new_v4().simple())
}

/// Mints a human-typable room invite code.
///
/// Drawn from an ambiguity-safe alphabet (no I/L/O/0/1) so codes survive
/// being read aloud or scribbled down. Uniqueness against live rooms is the
/// caller's job (the room store retries on collision).
#[must_use]
pub fn mint_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET.as_bytes()[idx] as char
        })
        .collect()
}
