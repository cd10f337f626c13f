//! WebSocket handler for realtime room traffic.
//!
//! One task per socket. The loop multiplexes four sources: inbound client
//! frames, the joined room's broadcast channel, the force-close token and a
//! heartbeat timeout check. All room mutations go through the engine; this
//! layer only parses, routes and forwards.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::api::AppState;
use crate::error::EngineError;
use crate::protocol::{
    AckMessage, ClientEvent, ClientMessage, ControlMessage, ErrorMessage, HeartbeatAck,
    RoomJoined, RoomMessage, ServerMessage, TimePong,
};
use crate::protocol_constants::{WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS};
use crate::utils::{mint_event_id, now_millis};

/// The connection's live room subscription.
struct RoomSession {
    room_id: String,
    client_id: String,
    rx: broadcast::Receiver<RoomMessage>,
}

enum LoopEvent {
    Cancelled,
    Inbound(Option<Result<Message, axum::Error>>),
    Room(Result<RoomMessage, broadcast::error::RecvError>),
    Heartbeat,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket connection loop.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();
    let connection_id = conn_guard.id().to_string();
    let mut session: Option<RoomSession> = None;
    let mut last_activity = Instant::now();

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_secs(WS_HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        // Branches only produce a LoopEvent; all state mutation happens after
        // the select completes, so the room receiver can live inside
        // `session` without fighting the borrow checker.
        let event = tokio::select! {
            _ = cancel_token.cancelled() => LoopEvent::Cancelled,
            msg = receiver.next() => LoopEvent::Inbound(msg),
            res = session_recv(&mut session) => LoopEvent::Room(res),
            _ = heartbeat_interval.tick() => LoopEvent::Heartbeat,
        };

        match event {
            LoopEvent::Cancelled => {
                log::info!("[WS] connection force-closed: {connection_id}");
                break;
            }
            LoopEvent::Inbound(msg) => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(&state, &connection_id, &mut session, &mut sender, &text)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            LoopEvent::Room(Ok(room_msg)) => {
                let Some(current) = session.as_ref() else {
                    continue;
                };
                if !room_msg.target.matches(&current.client_id) {
                    continue;
                }
                let kicked_me = matches!(
                    &room_msg.message,
                    ServerMessage::MemberKicked(k) if k.client_id == current.client_id
                );
                if send_message(&mut sender, &room_msg.message).await.is_err() {
                    break;
                }
                if kicked_me {
                    state.engine.leave(&connection_id);
                    session = None;
                }
            }
            LoopEvent::Room(Err(broadcast::error::RecvError::Lagged(n))) => {
                // Clients recover via version numbers and the next beacon.
                log::warn!("[WS] {connection_id} lagged {n} room messages");
            }
            LoopEvent::Room(Err(broadcast::error::RecvError::Closed)) => {
                if let Some(gone) = session.take() {
                    log::info!("[WS] room {} closed under {connection_id}", gone.room_id);
                }
            }
            LoopEvent::Heartbeat => {
                if last_activity.elapsed() > Duration::from_secs(WS_HEARTBEAT_TIMEOUT_SECS) {
                    log::warn!("[WS] heartbeat timeout: {connection_id}");
                    break;
                }
            }
        }
    }

    state.engine.leave(&connection_id);
    // ConnectionGuard::drop unregisters the connection.
}

/// Awaits the session's room channel, or forever when not in a room.
async fn session_recv(
    session: &mut Option<RoomSession>,
) -> Result<RoomMessage, broadcast::error::RecvError> {
    match session.as_mut() {
        Some(s) => s.rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match message.to_json() {
        Some(json) => sender.send(Message::Text(json.into())).await,
        None => Ok(()),
    }
}

/// Handles one inbound text frame. `Err` means the socket is dead.
async fn handle_text(
    state: &AppState,
    connection_id: &str,
    session: &mut Option<RoomSession>,
    sender: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> Result<(), axum::Error> {
    let parsed = serde_json::from_str::<ClientMessage>(text);
    let msg = match parsed {
        Ok(msg) => msg,
        Err(e) => {
            return reject_unparseable(sender, text, e).await;
        }
    };

    match msg {
        ClientMessage::Control(ControlMessage::CreateRoom(payload)) => {
            if session.is_some() {
                state.engine.leave(connection_id);
                *session = None;
            }
            match state.engine.create_room(&payload.name, connection_id).await {
                Ok(joined) => install_session(session, sender, joined).await,
                Err(err) => send_message(sender, &ServerMessage::Error(ErrorMessage::new(&err))).await,
            }
        }
        ClientMessage::Control(ControlMessage::JoinRoom(payload)) => {
            if session.is_some() {
                state.engine.leave(connection_id);
                *session = None;
            }
            match state
                .engine
                .join_room(&payload.room_code, &payload.name, payload.client_id, connection_id)
                .await
            {
                Ok(joined) => install_session(session, sender, joined).await,
                Err(err) => send_message(sender, &ServerMessage::Error(ErrorMessage::new(&err))).await,
            }
        }
        ClientMessage::Control(ControlMessage::LeaveRoom) => {
            state.engine.leave(connection_id);
            *session = None;
            Ok(())
        }
        ClientMessage::Control(ControlMessage::Heartbeat) => {
            send_message(sender, &ServerMessage::HeartbeatAck(HeartbeatAck::new())).await
        }
        ClientMessage::Event(envelope) => {
            // Time sync is answered inline for minimal turnaround; the
            // latency estimate is forwarded to the room off the hot path.
            if let ClientEvent::TimePing(ping) = &envelope.event {
                let now = now_millis();
                let latency_ms = now.saturating_sub(ping.t0) / 2;
                state.engine.record_latency(connection_id, latency_ms);
                return send_message(sender, &ServerMessage::TimePong(TimePong::new(ping.t0, now)))
                    .await;
            }

            match state.engine.submit(connection_id, envelope.clone()) {
                Ok(()) => Ok(()),
                // Cursor failures are dropped silently on the lossy path
                Err(_) if envelope.event.is_lossy() => Ok(()),
                Err(err) => {
                    let ack = AckMessage::rejected(envelope.client_seq, mint_event_id(), &err);
                    send_message(sender, &ServerMessage::Ack(ack)).await
                }
            }
        }
    }
}

/// Sends ROOM_JOINED and stores the session.
async fn install_session(
    session: &mut Option<RoomSession>,
    sender: &mut SplitSink<WebSocket, Message>,
    joined: crate::engine::JoinedRoom,
) -> Result<(), axum::Error> {
    let reply = RoomJoined::new(joined.state, joined.client_id.clone(), now_millis());
    let result = send_message(sender, &ServerMessage::RoomJoined(Box::new(reply))).await;
    *session = Some(RoomSession {
        room_id: joined.room_id,
        client_id: joined.client_id,
        rx: joined.rx,
    });
    result
}

/// Best-effort rejection of frames that failed schema parsing.
///
/// Cursor frames are dropped silently (high-frequency, non-critical); other
/// frames get a rejected ack with a generated event id so the client's seq
/// bookkeeping stays sane.
async fn reject_unparseable(
    sender: &mut SplitSink<WebSocket, Message>,
    text: &str,
    parse_err: serde_json::Error,
) -> Result<(), axum::Error> {
    let value = serde_json::from_str::<serde_json::Value>(text).unwrap_or_default();
    let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("?");
    if event_type == "CURSOR_MOVE" {
        return Ok(());
    }
    log::warn!("[WS] unparseable {event_type} frame: {parse_err}");
    let client_seq = value.get("clientSeq").and_then(|s| s.as_u64()).unwrap_or(0);
    let err = EngineError::InvalidPayload(parse_err.to_string());
    let ack = AckMessage::rejected(client_seq, mint_event_id(), &err);
    send_message(sender, &ServerMessage::Ack(ack)).await
}
