//! Wire protocol: client→server envelopes and server→client messages.
//!
//! All frames are JSON text. Client intent events travel in a common envelope
//! (`{type, roomId, clientId, clientSeq, payload}`); server messages each
//! carry their own `type` discriminator. Enum tags are SCREAMING_SNAKE_CASE
//! with camelCase payload fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{CursorState, DeckState, PlayState, RoomState};

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level incoming frame: either a connection-level control message or a
/// room-scoped event envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Control(ControlMessage),
    Event(ClientEnvelope),
}

/// Connection-level messages (no room envelope).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    CreateRoom(CreateRoomPayload),
    JoinRoom(JoinRoomPayload),
    LeaveRoom,
    Heartbeat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_code: String,
    pub name: String,
    /// Present on reconnect: re-identify as this member instead of joining
    /// as a new one.
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Room-scoped event envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEnvelope {
    pub room_id: String,
    pub client_id: String,
    /// Per-connection monotonic counter; the server acks exactly once per seq.
    #[serde(default)]
    pub client_seq: u64,
    /// Optional echo of a previously-minted event id, for retries.
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

/// Client intent events, discriminated by `type` with a `payload` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    CursorMove(CursorMovePayload),
    ControlGrab(ControlRefPayload),
    ControlRelease(ControlRefPayload),
    MixerSet(MixerSetPayload),
    FxSet(FxSetPayload),
    FxToggle(FxTogglePayload),
    DeckLoad(DeckLoadPayload),
    DeckPlay(DeckRefPayload),
    DeckPause(DeckRefPayload),
    DeckCue(DeckCuePayload),
    DeckSeek(DeckSeekPayload),
    DeckTempoSet(DeckTempoPayload),
    DeckHotcue(DeckHotcuePayload),
    QueueAdd(QueueAddPayload),
    QueueRemove(QueueItemRefPayload),
    QueueReorder(QueueReorderPayload),
    QueueEdit(QueueEditPayload),
    QueueClear,
    Kick(KickPayload),
    TimePing(TimePingPayload),
}

impl ClientEvent {
    /// Wire name of the event type, echoed in acks and broadcasts.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CursorMove(_) => "CURSOR_MOVE",
            Self::ControlGrab(_) => "CONTROL_GRAB",
            Self::ControlRelease(_) => "CONTROL_RELEASE",
            Self::MixerSet(_) => "MIXER_SET",
            Self::FxSet(_) => "FX_SET",
            Self::FxToggle(_) => "FX_TOGGLE",
            Self::DeckLoad(_) => "DECK_LOAD",
            Self::DeckPlay(_) => "DECK_PLAY",
            Self::DeckPause(_) => "DECK_PAUSE",
            Self::DeckCue(_) => "DECK_CUE",
            Self::DeckSeek(_) => "DECK_SEEK",
            Self::DeckTempoSet(_) => "DECK_TEMPO_SET",
            Self::DeckHotcue(_) => "DECK_HOTCUE",
            Self::QueueAdd(_) => "QUEUE_ADD",
            Self::QueueRemove(_) => "QUEUE_REMOVE",
            Self::QueueReorder(_) => "QUEUE_REORDER",
            Self::QueueEdit(_) => "QUEUE_EDIT",
            Self::QueueClear => "QUEUE_CLEAR",
            Self::Kick(_) => "KICK",
            Self::TimePing(_) => "TIME_PING",
        }
    }

    /// Whether the event takes the high-frequency lossy path (no ack, no
    /// idempotency, no version bump).
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::CursorMove(_) | Self::TimePing(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovePayload {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRefPayload {
    pub control_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerSetPayload {
    pub control_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxSetPayload {
    /// One of `type`, `wetDry`, `param`.
    pub param: String,
    /// A string for `type`, a number otherwise.
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxTogglePayload {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckLoadPayload {
    pub deck_id: String,
    pub track_id: String,
    pub queue_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckRefPayload {
    pub deck_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCuePayload {
    pub deck_id: String,
    #[serde(default)]
    pub cue_point_sec: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSeekPayload {
    pub deck_id: String,
    pub position_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckTempoPayload {
    pub deck_id: String,
    pub playback_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckHotcuePayload {
    pub deck_id: String,
    /// `None` clears the hot cue.
    #[serde(default)]
    pub point_sec: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueAddPayload {
    pub track_id: String,
    pub title: String,
    pub duration_sec: f64,
    #[serde(default)]
    pub insert_at: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemRefPayload {
    pub queue_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReorderPayload {
    pub queue_item_id: String,
    pub new_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEditPayload {
    pub queue_item_id: String,
    pub updates: QueueItemUpdates,
}

/// Editable queue item fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickPayload {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePingPayload {
    pub t0: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// Outgoing server messages.
///
/// Untagged: each variant struct carries its own `type` field, because the
/// mutation broadcast's `type` echoes the originating event type and cannot
/// be a fixed enum tag.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Ack(AckMessage),
    Mutation(MutationBroadcast),
    CursorUpdate(CursorUpdate),
    Beacon(BeaconTick),
    TimePong(TimePong),
    RoomJoined(Box<RoomJoined>),
    MemberKicked(MemberKicked),
    HeartbeatAck(HeartbeatAck),
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Serializes the message to a JSON string for the transport.
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Exactly-one-per-`clientSeq` acknowledgment of a mutation event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub client_seq: u64,
    pub event_id: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl AckMessage {
    pub fn accepted(client_seq: u64, event_id: String) -> Self {
        Self {
            kind: "ACK",
            client_seq,
            event_id,
            accepted: true,
            code: None,
            error: None,
            retry_after_ms: None,
        }
    }

    pub fn rejected(client_seq: u64, event_id: String, err: &crate::error::EngineError) -> Self {
        Self {
            kind: "ACK",
            client_seq,
            event_id,
            accepted: false,
            code: Some(err.code()),
            error: Some(err.to_string()),
            retry_after_ms: err.retry_after_ms(),
        }
    }
}

/// An applied mutation, fanned out to every room member (including the
/// sender, for optimistic-UI reconciliation).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationBroadcast {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub room_id: String,
    pub client_id: String,
    pub client_seq: u64,
    pub event_id: String,
    pub server_ts: u64,
    pub version: u64,
    pub payload: Value,
}

/// Lossy cursor update, sent to everyone except the moving member.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub room_id: String,
    pub client_id: String,
    pub cursor: CursorState,
}

impl CursorUpdate {
    pub fn new(room_id: String, client_id: String, cursor: CursorState) -> Self {
        Self {
            kind: "CURSOR_UPDATE",
            room_id,
            client_id,
            cursor,
        }
    }
}

/// Per-deck slice of a beacon tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckBeacon {
    pub deck_id: crate::model::DeckId,
    pub epoch_id: u64,
    pub epoch_seq: u64,
    pub server_ts: u64,
    pub playhead_sec: f64,
    pub playback_rate: f64,
    pub play_state: PlayState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_bpm: Option<f64>,
}

impl DeckBeacon {
    /// Snapshot of a deck's epoch parameters at `server_ts`.
    pub fn of(deck: &DeckState, server_ts: u64) -> Self {
        Self {
            deck_id: deck.deck_id,
            epoch_id: deck.epoch_id,
            epoch_seq: deck.epoch_seq,
            server_ts,
            playhead_sec: deck.position_at(server_ts),
            playback_rate: deck.playback_rate,
            play_state: deck.play_state,
            detected_bpm: deck.detected_bpm,
        }
    }
}

/// Periodic authoritative playhead broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconTick {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub room_id: String,
    pub payload: BeaconPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconPayload {
    pub server_ts: u64,
    pub version: u64,
    pub deck_a: DeckBeacon,
    pub deck_b: DeckBeacon,
}

impl BeaconTick {
    pub fn new(room_id: String, payload: BeaconPayload) -> Self {
        Self {
            kind: "BEACON_TICK",
            room_id,
            payload,
        }
    }
}

/// Time sync reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePong {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub t0: u64,
    pub server_ts: u64,
}

impl TimePong {
    pub fn new(t0: u64, server_ts: u64) -> Self {
        Self {
            kind: "TIME_PONG",
            t0,
            server_ts,
        }
    }
}

/// Reply to CREATE_ROOM / JOIN_ROOM with the full room snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub room_id: String,
    pub room_code: String,
    pub client_id: String,
    pub server_ts: u64,
    pub state: RoomState,
}

impl RoomJoined {
    pub fn new(state: RoomState, client_id: String, server_ts: u64) -> Self {
        Self {
            kind: "ROOM_JOINED",
            room_id: state.room_id.clone(),
            room_code: state.room_code.clone(),
            client_id,
            server_ts,
            state,
        }
    }
}

/// Targeted notice to a member removed by the host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKicked {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub room_id: String,
    pub client_id: String,
}

impl MemberKicked {
    pub fn new(room_id: String, client_id: String) -> Self {
        Self {
            kind: "MEMBER_KICKED",
            room_id,
            client_id,
        }
    }
}

/// Heartbeat acknowledgment.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatAck {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl HeartbeatAck {
    pub fn new() -> Self {
        Self {
            kind: "HEARTBEAT_ACK",
        }
    }
}

impl Default for HeartbeatAck {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection-level failure (create/join errors, malformed frames).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(err: &crate::error::EngineError) -> Self {
        Self {
            kind: "ERROR",
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Room Fan-out
// ─────────────────────────────────────────────────────────────────────────────

/// Delivery scope of a room-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    AllExcept(String),
    Only(String),
}

impl Target {
    /// Whether a subscriber identified by `client_id` should receive the message.
    pub fn matches(&self, client_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != client_id,
            Self::Only(only) => only == client_id,
        }
    }
}

/// A message on a room's broadcast channel, scoped to a delivery target.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub target: Target,
    pub message: ServerMessage,
}

impl RoomMessage {
    pub fn all(message: ServerMessage) -> Self {
        Self {
            target: Target::All,
            message,
        }
    }

    pub fn all_except(client_id: impl Into<String>, message: ServerMessage) -> Self {
        Self {
            target: Target::AllExcept(client_id.into()),
            message,
        }
    }

    pub fn only(client_id: impl Into<String>, message: ServerMessage) -> Self {
        Self {
            target: Target::Only(client_id.into()),
            message,
        }
    }
}
