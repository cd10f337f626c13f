//! Engine configuration.
//!
//! All fields have defaults taken from [`crate::protocol_constants`]; deploys
//! override only what they need (usually nothing beyond the grace period and
//! the ownership policy).

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    BEACON_INTERVAL_MS, CURSOR_THROTTLE_MS, DECK_BUCKET_MAX, DECK_SEEK_BUCKET_MAX,
    EMPTY_ROOM_GRACE_MS, OWNERSHIP_TTL_MS, QUEUE_BUCKET_MAX, RATE_WINDOW_MS,
    RECENT_EVENT_CAPACITY, ROOM_CHANNEL_CAPACITY,
};

/// Policy for contested control access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Grabs and sets against an active foreign lease are rejected as
    /// `CONTESTED_CONTROL`. Expired leases are always free.
    #[default]
    Strict,
    /// A `CONTROL_GRAB` may steal an active foreign lease; `MIXER_SET` is
    /// still rejected until the grab lands.
    Permissive,
}

/// Sliding-window rate-limit budgets.
///
/// A `window_ms` applies to all buckets; budgets differ per bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length for every bucket (milliseconds).
    pub window_ms: u64,
    /// Budget per queue bucket (add/remove/reorder/edit each have their own).
    pub queue_max: u32,
    /// Shared budget for deck transport actions.
    pub deck_max: u32,
    /// Budget for deck seeks (scrubbing is high-frequency).
    pub seek_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: RATE_WINDOW_MS,
            queue_max: QUEUE_BUCKET_MAX,
            deck_max: DECK_BUCKET_MAX,
            seek_max: DECK_SEEK_BUCKET_MAX,
        }
    }
}

/// Configuration for the room engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grace period before an empty room is destroyed (milliseconds).
    pub empty_room_grace_ms: u64,

    /// Beacon broadcast interval per room (milliseconds).
    pub beacon_interval_ms: u64,

    /// Control ownership lease TTL from last movement (milliseconds).
    pub ownership_ttl_ms: u64,

    /// Contested-control policy.
    pub ownership_policy: OwnershipPolicy,

    /// Minimum interval between forwarded cursor updates per member (ms).
    pub cursor_throttle_ms: u64,

    /// Capacity of the per-room recent-event-id ring.
    pub recent_event_capacity: usize,

    /// Snapshot the room every N accepted versions.
    pub snapshot_version_interval: u64,

    /// Never snapshot more often than this (milliseconds).
    pub snapshot_min_interval_ms: u64,

    /// Capacity of each room's outbound broadcast channel.
    pub room_channel_capacity: usize,

    /// Event types only the host may issue.
    pub host_only_actions: Vec<String>,

    /// Rate-limit budgets.
    pub rate_limits: RateLimitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            empty_room_grace_ms: EMPTY_ROOM_GRACE_MS,
            beacon_interval_ms: BEACON_INTERVAL_MS,
            ownership_ttl_ms: OWNERSHIP_TTL_MS,
            ownership_policy: OwnershipPolicy::default(),
            cursor_throttle_ms: CURSOR_THROTTLE_MS,
            recent_event_capacity: RECENT_EVENT_CAPACITY,
            snapshot_version_interval: 32,
            snapshot_min_interval_ms: 5_000,
            room_channel_capacity: ROOM_CHANNEL_CAPACITY,
            host_only_actions: vec!["QUEUE_CLEAR".to_string(), "KICK".to_string()],
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.beacon_interval_ms == 0 {
            return Err("beacon_interval_ms must be >= 1".to_string());
        }
        if self.room_channel_capacity == 0 {
            return Err(
                "room_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.recent_event_capacity == 0 {
            return Err("recent_event_capacity must be >= 1".to_string());
        }
        if self.rate_limits.window_ms == 0 {
            return Err("rate_limits.window_ms must be >= 1".to_string());
        }
        Ok(())
    }

    /// Whether the given event type requires the room host.
    pub fn is_host_only(&self, event_type: &str) -> bool {
        self.host_only_actions.iter().any(|a| a == event_type)
    }
}
