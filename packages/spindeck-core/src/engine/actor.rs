//! Per-room actor task.
//!
//! Every room owns one task and an unbounded command queue; inbound events,
//! membership changes, latency updates and beacon ticks are all processed on
//! that queue, so no two mutations of the same room ever run concurrently
//! and broadcast order equals apply order.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use crate::error::EngineError;
use crate::model::{PlayState, RoomState};
use crate::persist::RoomSnapshot;
use crate::protocol::{
    AckMessage, BeaconPayload, BeaconTick, ClientEnvelope, ClientEvent, CursorUpdate, DeckBeacon,
    MemberKicked, MutationBroadcast, RoomMessage, ServerMessage,
};
use crate::utils::{mint_client_id, mint_event_id, now_millis};

use super::apply::{apply, ApplyOutcome};
use super::idempotency::{IdempotencyRecord, SeqClass};
use super::validate::{cursor_in_bounds, validate_event};
use super::EngineShared;

/// Commands on a room's serialized queue.
pub(crate) enum RoomCommand {
    Join {
        name: String,
        /// Present on reconnect: re-identify as this member.
        client_id: Option<String>,
        reply: oneshot::Sender<Result<JoinAccepted, EngineError>>,
    },
    Leave {
        client_id: String,
    },
    Event {
        /// Identity resolved from the connection map, not the envelope.
        client_id: String,
        envelope: ClientEnvelope,
    },
    UpdateLatency {
        client_id: String,
        latency_ms: u64,
    },
    Snapshot {
        reply: oneshot::Sender<RoomState>,
    },
    Shutdown,
}

/// Successful join result handed back through the oneshot.
pub(crate) struct JoinAccepted {
    pub client_id: String,
    pub state: RoomState,
    pub rx: broadcast::Receiver<RoomMessage>,
}

enum Flow {
    Continue,
    Stop,
}

enum Exit {
    /// Empty-room grace elapsed; the room and its snapshot are discarded.
    Destroyed,
    /// Server shutdown or queue closed; a final snapshot is taken.
    Shutdown,
}

/// Owns one room's state and processes its command queue.
pub(crate) struct RoomActor {
    state: RoomState,
    idempotency: IdempotencyRecord,
    tx: broadcast::Sender<RoomMessage>,
    cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
    shared: Arc<EngineShared>,
    grace_deadline: Option<Instant>,
    last_snapshot_version: u64,
    last_snapshot_ms: u64,
}

impl RoomActor {
    pub(crate) fn new(
        state: RoomState,
        idempotency: IdempotencyRecord,
        tx: broadcast::Sender<RoomMessage>,
        cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
        shared: Arc<EngineShared>,
    ) -> Self {
        let version = state.version;
        Self {
            state,
            idempotency,
            tx,
            cmd_rx,
            shared,
            grace_deadline: None,
            last_snapshot_version: version,
            last_snapshot_ms: now_millis(),
        }
    }

    /// Runs the actor until the room is destroyed or the server shuts down.
    pub(crate) async fn run(mut self) {
        let mut beacon = interval(Duration::from_millis(self.shared.config.beacon_interval_ms));
        beacon.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Restored rooms start empty and are subject to the same grace.
        if self.state.members.is_empty() {
            self.arm_grace();
        }

        let exit = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => break Exit::Shutdown,
                        Some(RoomCommand::Shutdown) => break Exit::Shutdown,
                        Some(cmd) => {
                            if let Flow::Stop = self.handle_command(cmd) {
                                break Exit::Shutdown;
                            }
                        }
                    }
                }
                _ = beacon.tick() => {
                    self.beacon_tick();
                }
                _ = grace_sleep(self.grace_deadline) => {
                    if self.state.members.is_empty() {
                        log::info!(
                            "[Room {}] destroying empty room after grace",
                            self.state.room_code
                        );
                        break Exit::Destroyed;
                    }
                    self.grace_deadline = None;
                }
            }
        };

        match exit {
            Exit::Destroyed => {
                let sink = Arc::clone(&self.shared.persistence);
                let room_id = self.state.room_id.clone();
                tokio::task::spawn_blocking(move || sink.remove(&room_id));
            }
            Exit::Shutdown => self.persist(true),
        }
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                name,
                client_id,
                reply,
            } => {
                let _ = reply.send(self.handle_join(name, client_id));
            }
            RoomCommand::Leave { client_id } => self.handle_leave(&client_id),
            RoomCommand::Event {
                client_id,
                envelope,
            } => self.handle_event(&client_id, envelope),
            RoomCommand::UpdateLatency {
                client_id,
                latency_ms,
            } => {
                if let Some(member) = self.state.member_mut(&client_id) {
                    member.latency_ms = latency_ms;
                }
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            RoomCommand::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    // ─────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────

    fn handle_join(
        &mut self,
        name: String,
        requested: Option<String>,
    ) -> Result<JoinAccepted, EngineError> {
        let now = now_millis();
        self.grace_deadline = None;

        // Deterministic re-identification: a reconnect with a known client id
        // re-binds to the existing member instead of adding a duplicate.
        if let Some(id) = requested {
            if self.state.member(&id).is_some() {
                log::info!("[Room {}] member {} reconnected", self.state.room_code, id);
                return Ok(JoinAccepted {
                    client_id: id,
                    state: self.state.clone(),
                    rx: self.tx.subscribe(),
                });
            }
        }

        let client_id = mint_client_id();
        let member = self
            .state
            .add_member(client_id.clone(), name, now)
            .clone();
        self.state.version += 1;
        log::info!(
            "[Room {}] {} joined as {} (members: {})",
            self.state.room_code,
            member.name,
            client_id,
            self.state.members.len()
        );
        self.broadcast_mutation("MEMBER_JOINED", &client_id, 0, mint_event_id(), now, json!({ "member": member }));
        self.persist(false);

        // Subscribe after the join broadcast so the joiner starts from the
        // snapshot without seeing their own MEMBER_JOINED.
        Ok(JoinAccepted {
            client_id,
            state: self.state.clone(),
            rx: self.tx.subscribe(),
        })
    }

    fn handle_leave(&mut self, client_id: &str) {
        let now = now_millis();
        let Some(member) = self.state.remove_member(client_id) else {
            return;
        };
        self.state.clear_ownerships_of(client_id);
        self.shared.rate_limiter.forget_client(client_id);

        self.state.version += 1;
        log::info!(
            "[Room {}] {} left (members: {})",
            self.state.room_code,
            member.name,
            self.state.members.len()
        );
        self.broadcast_mutation(
            "MEMBER_LEFT",
            client_id,
            0,
            mint_event_id(),
            now,
            json!({ "clientId": member.client_id, "name": member.name }),
        );

        if member.is_host {
            if let Some(new_host) = self.state.migrate_host() {
                self.state.version += 1;
                self.broadcast_mutation(
                    "HOST_CHANGED",
                    &new_host,
                    0,
                    mint_event_id(),
                    now,
                    json!({ "hostId": new_host }),
                );
            }
        }

        if self.state.members.is_empty() {
            self.arm_grace();
        }
        self.persist(false);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event Pipeline
    // ─────────────────────────────────────────────────────────────────────

    fn handle_event(&mut self, client_id: &str, envelope: ClientEnvelope) {
        let now = now_millis();

        if envelope.room_id != self.state.room_id {
            self.reject(client_id, &envelope, EngineError::RoomMismatch);
            return;
        }
        if envelope.client_id != client_id {
            self.reject(client_id, &envelope, EngineError::ClientMismatch);
            return;
        }
        if self.state.member(client_id).is_none() {
            self.reject(client_id, &envelope, EngineError::NotInRoom);
            return;
        }

        // High-frequency lossy path: no ack, no idempotency, no rate limit.
        if let ClientEvent::CursorMove(p) = &envelope.event {
            if !cursor_in_bounds(p.x, p.y) {
                log::debug!(
                    "[Room {}] dropped out-of-bounds cursor from {}",
                    self.state.room_code,
                    client_id
                );
                return;
            }
            if let Some(last) = self
                .state
                .member(client_id)
                .and_then(|m| m.cursor)
                .map(|c| c.last_updated)
            {
                if now.saturating_sub(last) < self.shared.config.cursor_throttle_ms {
                    return;
                }
            }
            if let Ok(ApplyOutcome::Cursor { next, cursor }) =
                apply(&self.state, client_id, &envelope.event, now, &*self.shared.catalog)
            {
                self.state = next;
                let msg = ServerMessage::CursorUpdate(CursorUpdate::new(
                    self.state.room_id.clone(),
                    client_id.to_string(),
                    cursor,
                ));
                let _ = self.tx.send(RoomMessage::all_except(client_id, msg));
            }
            return;
        }

        // Time pings are answered at the transport; ignore strays.
        if matches!(envelope.event, ClientEvent::TimePing(_)) {
            return;
        }

        match self
            .idempotency
            .classify(client_id, envelope.client_seq, envelope.event_id.as_deref())
        {
            SeqClass::ReplayOf(original_event_id) => {
                // Already applied: ack with the original id, no re-broadcast.
                self.send_to(
                    client_id,
                    ServerMessage::Ack(AckMessage::accepted(envelope.client_seq, original_event_id)),
                );
                return;
            }
            SeqClass::Duplicate => {
                self.reject(client_id, &envelope, EngineError::Duplicate);
                return;
            }
            SeqClass::Fresh => {}
        }

        if let Err(err) = self
            .shared
            .rate_limiter
            .check_and_record(client_id, &envelope.event)
        {
            self.reject(client_id, &envelope, err);
            return;
        }

        if let Err(err) =
            validate_event(&self.state, &self.shared.config, client_id, &envelope.event, now)
        {
            self.reject(client_id, &envelope, err);
            return;
        }

        let event_id = envelope.event_id.clone().unwrap_or_else(mint_event_id);
        match apply(&self.state, client_id, &envelope.event, now, &*self.shared.catalog) {
            Err(err) => self.reject(client_id, &envelope, err),
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked,
            }) => {
                self.state = next;
                self.idempotency
                    .record(client_id, envelope.client_seq, &event_id, now);
                self.send_to(
                    client_id,
                    ServerMessage::Ack(AckMessage::accepted(envelope.client_seq, event_id.clone())),
                );
                self.broadcast_mutation(
                    envelope.event.type_name(),
                    client_id,
                    envelope.client_seq,
                    event_id,
                    now,
                    payload,
                );
                if let Some(victim) = kicked {
                    self.shared.rate_limiter.forget_client(&victim);
                    let msg = ServerMessage::MemberKicked(MemberKicked::new(
                        self.state.room_id.clone(),
                        victim.clone(),
                    ));
                    let _ = self.tx.send(RoomMessage::only(victim, msg));
                }
                self.persist(false);
            }
            // CURSOR_MOVE is handled on the lossy path above.
            Ok(ApplyOutcome::Cursor { .. }) => {}
        }
    }

    fn reject(&self, client_id: &str, envelope: &ClientEnvelope, err: EngineError) {
        log::warn!(
            "[Room {}] rejected {} from {}: {} ({})",
            self.state.room_code,
            envelope.event.type_name(),
            client_id,
            err,
            err.code()
        );
        let event_id = envelope.event_id.clone().unwrap_or_else(mint_event_id);
        self.send_to(
            client_id,
            ServerMessage::Ack(AckMessage::rejected(envelope.client_seq, event_id, &err)),
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Beacon
    // ─────────────────────────────────────────────────────────────────────

    fn beacon_tick(&mut self) {
        let now = now_millis();
        if self.state.deck_a.play_state == PlayState::Playing {
            self.state.deck_a.epoch_seq += 1;
        }
        if self.state.deck_b.play_state == PlayState::Playing {
            self.state.deck_b.epoch_seq += 1;
        }
        let payload = BeaconPayload {
            server_ts: now,
            version: self.state.version,
            deck_a: DeckBeacon::of(&self.state.deck_a, now),
            deck_b: DeckBeacon::of(&self.state.deck_b, now),
        };
        tracing::trace!(
            room = %self.state.room_code,
            version = self.state.version,
            "beacon_tick"
        );
        let msg = ServerMessage::Beacon(BeaconTick::new(self.state.room_id.clone(), payload));
        let _ = self.tx.send(RoomMessage::all(msg));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Fan-out & Persistence
    // ─────────────────────────────────────────────────────────────────────

    fn send_to(&self, client_id: &str, message: ServerMessage) {
        let _ = self.tx.send(RoomMessage::only(client_id, message));
    }

    fn broadcast_mutation(
        &self,
        kind: &'static str,
        client_id: &str,
        client_seq: u64,
        event_id: String,
        server_ts: u64,
        payload: Value,
    ) {
        let msg = ServerMessage::Mutation(MutationBroadcast {
            kind,
            room_id: self.state.room_id.clone(),
            client_id: client_id.to_string(),
            client_seq,
            event_id,
            server_ts,
            version: self.state.version,
            payload,
        });
        let _ = self.tx.send(RoomMessage::all(msg));
    }

    fn arm_grace(&mut self) {
        self.grace_deadline =
            Some(Instant::now() + Duration::from_millis(self.shared.config.empty_room_grace_ms));
    }

    /// Opportunistic snapshot hint; never blocks the pipeline.
    fn persist(&mut self, force: bool) {
        let now = now_millis();
        let version_due = self.state.version.saturating_sub(self.last_snapshot_version)
            >= self.shared.config.snapshot_version_interval;
        let time_due = self.state.version != self.last_snapshot_version
            && now.saturating_sub(self.last_snapshot_ms)
                >= self.shared.config.snapshot_min_interval_ms;
        if !(force || version_due || time_due) {
            return;
        }
        self.last_snapshot_version = self.state.version;
        self.last_snapshot_ms = now;

        let snapshot = RoomSnapshot {
            room_id: self.state.room_id.clone(),
            version: self.state.version,
            state: self.state.clone(),
            idempotency: self.idempotency.to_snapshot(),
        };
        let sink = Arc::clone(&self.shared.persistence);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = sink.snapshot(&snapshot.room_id, &snapshot) {
                log::warn!("[Persist] snapshot failed for room {}: {}", snapshot.room_id, e);
            }
        });
    }
}

/// Sleeps until the grace deadline, or forever when none is armed.
async fn grace_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
