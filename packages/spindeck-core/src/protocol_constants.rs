//! Fixed protocol constants that should NOT be changed.
//!
//! These values define the wire contract between the server and its clients
//! (beacon cadence, lease lifetimes, coordinate spaces). Tunable deployment
//! knobs live in [`crate::config::EngineConfig`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// Playback Epochs & Beacon
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between authoritative beacon broadcasts per room (milliseconds).
///
/// 250 ms keeps client playheads converged within tens of milliseconds while
/// staying far below cursor-update traffic.
pub const BEACON_INTERVAL_MS: u64 = 250;

// ─────────────────────────────────────────────────────────────────────────────
// Control Ownership
// ─────────────────────────────────────────────────────────────────────────────

/// Control ownership lease lifetime, measured from the owner's last movement
/// of the control (milliseconds).
pub const OWNERSHIP_TTL_MS: u64 = 2_000;

// ─────────────────────────────────────────────────────────────────────────────
// Cursors
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum interval between forwarded cursor updates per member (milliseconds).
///
/// ~30 Hz. Faster updates are silently dropped on the lossy cursor path.
pub const CURSOR_THROTTLE_MS: u64 = 33;

/// Inclusive upper bound for cursor coordinates (pixel or percent space).
pub const CURSOR_MAX_COORD: f64 = 10_000.0;

// ─────────────────────────────────────────────────────────────────────────────
// Room Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Grace period before an empty room is destroyed (milliseconds).
pub const EMPTY_ROOM_GRACE_MS: u64 = 60_000;

/// Length of minted room invite codes.
pub const ROOM_CODE_LEN: usize = 6;

/// Alphabet for room invite codes.
///
/// Uppercase alphanumerics minus the ambiguous I/L/O/0/1.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";

// ─────────────────────────────────────────────────────────────────────────────
// Idempotency
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the per-room recent-event-id ring.
pub const RECENT_EVENT_CAPACITY: usize = 10_000;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limits (per client, sliding window)
// ─────────────────────────────────────────────────────────────────────────────

/// Shared window length for all rate-limit buckets (milliseconds).
pub const RATE_WINDOW_MS: u64 = 60_000;

/// Budget per queue bucket (add / remove / reorder / edit each).
pub const QUEUE_BUCKET_MAX: u32 = 20;

/// Shared budget for deck transport actions (load/play/pause/cue/tempo/hotcue).
pub const DECK_BUCKET_MAX: u32 = 100;

/// Budget for deck seeks, which clients issue far more often than transport
/// actions (scrubbing).
pub const DECK_SEEK_BUCKET_MAX: u32 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Deck Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum deck playback rate.
pub const TEMPO_MIN: f64 = 0.5;

/// Maximum deck playback rate.
pub const TEMPO_MAX: f64 = 1.5;

// ─────────────────────────────────────────────────────────────────────────────
// Channels & Heartbeats
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of each room's outbound broadcast channel.
///
/// Slow consumers lag and drop; clients reconcile via `version` and beacons.
pub const ROOM_CHANNEL_CAPACITY: usize = 256;

/// WebSocket heartbeat timeout (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval between WebSocket heartbeat checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "spindeck";

/// Member color palette, assigned round-robin by join order.
pub const MEMBER_COLORS: [&str; 8] = [
    "#f94144", "#f3722c", "#f9c74f", "#90be6d", "#43aa8b", "#4d908e", "#577590", "#b5179e",
];
