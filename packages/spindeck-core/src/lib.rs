//! Spindeck Core - authoritative realtime engine for collaborative DJ rooms.
//!
//! Many clients connect over WebSocket and cooperatively drive a shared
//! mixer, two decks, a shared track queue and shared cursors. The server is
//! the single source of truth: clients send intent events, the engine
//! validates, applies and broadcasts the resulting mutations together with a
//! strictly-increasing room version and per-deck playback epochs that let
//! clients converge their audio playheads within tens of milliseconds.
//!
//! # Architecture
//!
//! - [`model`]: room domain types (decks, mixer, queue, members)
//! - [`protocol`]: wire envelopes and server messages
//! - [`engine`]: room store, per-room actors, mutation apply, rate limiting,
//!   idempotency
//! - [`persist`]: best-effort room snapshot sink
//! - [`catalog`]: track metadata collaborator
//! - [`api`]: axum HTTP/WebSocket transport adapter
//! - [`bootstrap`]: composition root
//!
//! Concurrency model: rooms execute in parallel, but each room owns a single
//! actor task and FIFO command queue, so all mutations of one room are
//! serialized and broadcast order equals apply order.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod persist;
pub mod protocol;
pub mod protocol_constants;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{start_server, ApiConfig, AppState, WsConnectionManager};
pub use bootstrap::{bootstrap_default, bootstrap_services, EngineServices};
pub use catalog::{NullCatalog, StaticCatalog, TrackCatalog, TrackInfo};
pub use config::{EngineConfig, OwnershipPolicy, RateLimitConfig};
pub use engine::{Engine, EngineStats, JoinedRoom, RateLimiter};
pub use error::{EngineError, EngineResult, ServerError};
pub use model::{DeckState, MixerState, QueueItem, RoomState};
pub use persist::{FilePersistence, NoopPersistence, PersistenceSink, RoomSnapshot};
pub use protocol::{ClientEnvelope, ClientEvent, RoomMessage, ServerMessage};
pub use utils::now_millis;
