//! Centralized error types for the Spindeck core library.
//!
//! Every event rejection maps to a closed taxonomy of machine-readable codes
//! that clients can branch on. The taxonomy is deliberately small; adding a
//! code is a wire-contract change.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Rejection reasons for client events, surfaced in acks and error frames.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Payload failed schema parsing or carried semantically impossible fields.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The connection has not joined a room.
    #[error("Connection is not in a room")]
    NotInRoom,

    /// The envelope's room id does not match the connection's room.
    #[error("Room id does not match this connection's room")]
    RoomMismatch,

    /// The envelope's client id does not match the connection's identity.
    #[error("Client id does not match this connection's identity")]
    ClientMismatch,

    /// No live room with the given code or id.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Deck id is not one of the two decks.
    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    /// Queue item id does not exist in this room.
    #[error("Queue item not found: {0}")]
    QueueItemNotFound(String),

    /// Control id is not in the enumerated control set.
    #[error("Invalid control id: {0}")]
    InvalidControlId(String),

    /// Control value is non-finite or outside the control's range.
    #[error("Value {value} out of bounds for {control}")]
    ValueOutOfBounds { control: String, value: f64 },

    /// Seek/cue position is non-finite, negative, or past the track end.
    #[error("Invalid seek position: {0}")]
    InvalidSeekPosition(f64),

    /// Queue insert/reorder index out of range.
    #[error("Invalid queue index: {0}")]
    InvalidQueueIndex(usize),

    /// Cursor coordinates are non-finite or outside the cursor space.
    #[error("Invalid cursor position")]
    InvalidCursorPosition,

    /// Action is restricted to the room host.
    #[error("Action requires host")]
    NotHost,

    /// Action is not permitted for this member.
    #[error("Permission denied")]
    PermissionDenied,

    /// Client exceeded a rate-limit bucket.
    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// Event was already applied (replay or stale sequence).
    #[error("Duplicate event")]
    Duplicate,

    /// Another member holds an active lease on the control.
    #[error("Control is held by another member")]
    ContestedControl,

    /// Queue item is loaded or playing on a deck and cannot be removed.
    #[error("Cannot remove an item that is loaded on a deck")]
    CannotRemoveLoadedItem,
}

impl EngineError {
    /// Returns the machine-readable error code for acks and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::NotInRoom => "NOT_IN_ROOM",
            Self::RoomMismatch => "ROOM_MISMATCH",
            Self::ClientMismatch => "CLIENT_MISMATCH",
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::DeckNotFound(_) => "DECK_NOT_FOUND",
            Self::QueueItemNotFound(_) => "QUEUE_ITEM_NOT_FOUND",
            Self::InvalidControlId(_) => "INVALID_CONTROL_ID",
            Self::ValueOutOfBounds { .. } => "VALUE_OUT_OF_BOUNDS",
            Self::InvalidSeekPosition(_) => "INVALID_SEEK_POSITION",
            Self::InvalidQueueIndex(_) => "INVALID_QUEUE_INDEX",
            Self::InvalidCursorPosition => "INVALID_CURSOR_POSITION",
            Self::NotHost => "NOT_HOST",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Duplicate => "DUPLICATE",
            Self::ContestedControl => "CONTESTED_CONTROL",
            Self::CannotRemoveLoadedItem => "CANNOT_REMOVE_LOADED_ITEM",
        }
    }

    /// Retry hint carried by rate-limit rejections.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Convenient Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// JSON response body for HTTP error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl EngineError {
    /// Maps the error to an appropriate HTTP status code (for the thin HTTP
    /// surface; the realtime path uses acks instead).
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) | Self::QueueItemNotFound(_) | Self::DeckNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotHost | Self::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
