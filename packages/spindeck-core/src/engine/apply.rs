//! The mutation state machine.
//!
//! `apply` is a pure function from (state, validated event, server time) to
//! an independent next state plus the broadcast payload. The only counter it
//! touches is the room version; scheduling, acks and fan-out belong to the
//! room actor.

use serde_json::{json, Value};

use crate::catalog::TrackCatalog;
use crate::error::EngineError;
use crate::model::{ControlOwner, CursorState, PlayState, QueueItem, QueueItemStatus, RoomState};
use crate::protocol::ClientEvent;
use crate::utils::mint_queue_item_id;

use super::validate::{parse_control, parse_deck};

/// Result of applying one event.
#[derive(Debug)]
pub(crate) enum ApplyOutcome {
    /// A versioned mutation: broadcast to the whole room.
    Mutation {
        next: RoomState,
        payload: Value,
        /// Set for KICK: the removed member, who also gets a targeted notice.
        kicked: Option<String>,
    },
    /// A cursor move: no version bump, broadcast to others only.
    Cursor { next: RoomState, cursor: CursorState },
}

/// Applies a validated event to the room state.
///
/// Returns an independent next state; the input is never aliased, so
/// snapshots taken from earlier states remain stable.
pub(crate) fn apply(
    state: &RoomState,
    client_id: &str,
    event: &ClientEvent,
    server_ts: u64,
    catalog: &dyn TrackCatalog,
) -> Result<ApplyOutcome, EngineError> {
    let mut next = state.clone();

    match event {
        ClientEvent::CursorMove(p) => {
            let cursor = CursorState {
                x: p.x,
                y: p.y,
                last_updated: server_ts,
            };
            let member = next
                .member_mut(client_id)
                .ok_or(EngineError::NotInRoom)?;
            member.cursor = Some(cursor);
            return Ok(ApplyOutcome::Cursor { next, cursor });
        }

        ClientEvent::ControlGrab(p) => {
            let control = parse_control(&p.control_id)?;
            next.control_owners.insert(
                control,
                ControlOwner {
                    client_id: client_id.to_string(),
                    acquired_at: server_ts,
                    last_moved_at: server_ts,
                },
            );
            next.version += 1;
            let payload = json!({ "controlId": control, "clientId": client_id });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::ControlRelease(p) => {
            let control = parse_control(&p.control_id)?;
            next.control_owners.remove(&control);
            next.version += 1;
            let payload = json!({ "controlId": control });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::MixerSet(p) => {
            let control = parse_control(&p.control_id)?;
            let applied = next
                .mixer
                .set(control, p.value)
                .ok_or_else(|| EngineError::InvalidControlId(p.control_id.clone()))?;
            if let Some(owner) = next.control_owners.get_mut(&control) {
                if owner.client_id == client_id {
                    owner.last_moved_at = server_ts;
                }
            }
            next.version += 1;
            let payload = json!({ "controlId": control, "value": applied });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::FxSet(p) => {
            match p.param.as_str() {
                "wetDry" => {
                    let v = p.value.as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
                    next.mixer.fx.wet_dry = v;
                }
                "param" => {
                    let v = p.value.as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
                    next.mixer.fx.param = v;
                }
                "type" => {
                    let name = p.value.as_str().unwrap_or("none");
                    next.mixer.fx.fx_type = crate::model::FxType::parse(name)
                        .ok_or_else(|| EngineError::InvalidPayload(format!("unknown fx type: {name}")))?;
                }
                other => {
                    return Err(EngineError::InvalidPayload(format!("unknown fx param: {other}")));
                }
            }
            next.version += 1;
            let payload = json!({ "param": p.param, "value": p.value, "fx": next.mixer.fx });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::FxToggle(p) => {
            next.mixer.fx.enabled = p.enabled;
            next.version += 1;
            let payload = json!({ "enabled": p.enabled });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckLoad(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let item = next
                .queue_item(&p.queue_item_id)
                .ok_or_else(|| EngineError::QueueItemNotFound(p.queue_item_id.clone()))?
                .clone();
            if item.track_id != p.track_id {
                return Err(EngineError::InvalidPayload(
                    "trackId does not match the queue item".into(),
                ));
            }
            if let Some(other) = next.item_on_deck(&p.queue_item_id) {
                if other != deck_id {
                    return Err(EngineError::InvalidPayload(format!(
                        "item already loaded on deck {other}"
                    )));
                }
            }

            // Release the previously loaded item back to the queue
            if let Some(prev_id) = next.deck(deck_id).loaded_queue_item_id.clone() {
                if prev_id != p.queue_item_id {
                    if let Some(prev) = next.queue.iter_mut().find(|q| q.id == prev_id) {
                        prev.status = QueueItemStatus::Played;
                    }
                }
            }

            let info = catalog.lookup(&p.track_id);
            let deck = next.deck_mut(deck_id);
            deck.loaded_track_id = Some(item.track_id.clone());
            deck.loaded_queue_item_id = Some(item.id.clone());
            deck.duration_sec = Some(item.duration_sec);
            deck.play_state = PlayState::Stopped;
            deck.playhead_sec = 0.0;
            deck.cue_point_sec = None;
            deck.hot_cue_point_sec = None;
            deck.detected_bpm = info.and_then(|i| i.bpm);
            deck.begin_epoch(server_ts);

            if let Some(q) = next.queue.iter_mut().find(|q| q.id == p.queue_item_id) {
                q.status = QueueItemStatus::loaded(deck_id);
            }
            next.version += 1;
            let payload = json!({
                "deckId": deck_id,
                "queueItemId": p.queue_item_id,
                "deck": next.deck(deck_id),
            });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckPlay(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            if !next.deck(deck_id).is_loaded() {
                return Err(EngineError::InvalidPayload("no track loaded".into()));
            }
            let deck = next.deck_mut(deck_id);
            deck.playhead_sec = deck.position_at(server_ts);
            deck.play_state = PlayState::Playing;
            deck.begin_epoch(server_ts);
            if let Some(item_id) = deck.loaded_queue_item_id.clone() {
                if let Some(q) = next.queue.iter_mut().find(|q| q.id == item_id) {
                    q.status = QueueItemStatus::playing(deck_id);
                }
            }
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "deck": next.deck(deck_id) });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckPause(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let deck = next.deck_mut(deck_id);
            deck.playhead_sec = deck.position_at(server_ts);
            deck.play_state = PlayState::Paused;
            deck.begin_epoch(server_ts);
            if let Some(item_id) = deck.loaded_queue_item_id.clone() {
                if let Some(q) = next.queue.iter_mut().find(|q| q.id == item_id) {
                    q.status = QueueItemStatus::loaded(deck_id);
                }
            }
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "deck": next.deck(deck_id) });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckCue(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let deck = next.deck_mut(deck_id);
            if let Some(cue) = p.cue_point_sec {
                deck.cue_point_sec = Some(deck.clamp_position(cue));
            }
            deck.playhead_sec = deck.cue_point_sec.unwrap_or(0.0);
            deck.play_state = PlayState::Cued;
            deck.begin_epoch(server_ts);
            if let Some(item_id) = deck.loaded_queue_item_id.clone() {
                if let Some(q) = next.queue.iter_mut().find(|q| q.id == item_id) {
                    q.status = QueueItemStatus::loaded(deck_id);
                }
            }
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "deck": next.deck(deck_id) });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckSeek(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let deck = next.deck_mut(deck_id);
            deck.playhead_sec = deck.clamp_position(p.position_sec);
            deck.begin_epoch(server_ts);
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "deck": next.deck(deck_id) });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckTempoSet(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let deck = next.deck_mut(deck_id);
            // Capture the position under the old rate first so the playhead
            // stays continuous across the rate change.
            deck.playhead_sec = deck.position_at(server_ts);
            deck.playback_rate = p.playback_rate.clamp(
                crate::protocol_constants::TEMPO_MIN,
                crate::protocol_constants::TEMPO_MAX,
            );
            deck.begin_epoch(server_ts);
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "deck": next.deck(deck_id) });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::DeckHotcue(p) => {
            let deck_id = parse_deck(&p.deck_id)?;
            let deck = next.deck_mut(deck_id);
            deck.hot_cue_point_sec = p.point_sec.map(|s| deck.clamp_position(s));
            next.version += 1;
            let payload = json!({ "deckId": deck_id, "hotCuePointSec": next.deck(deck_id).hot_cue_point_sec });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::QueueAdd(p) => {
            let info = catalog.lookup(&p.track_id);
            let (title, duration_sec) = match info {
                Some(i) => (i.title, i.duration_sec),
                None => (p.title.clone(), p.duration_sec),
            };
            let item = QueueItem {
                id: mint_queue_item_id(),
                track_id: p.track_id.clone(),
                title,
                duration_sec,
                added_by: client_id.to_string(),
                added_at: server_ts,
                status: QueueItemStatus::Queued,
            };
            let idx = p.insert_at.unwrap_or(next.queue.len()).min(next.queue.len());
            next.queue.insert(idx, item.clone());
            next.version += 1;
            let payload = json!({
                "queueItemId": item.id,
                "item": item,
                "insertAt": idx,
            });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::QueueRemove(p) => {
            let idx = next
                .queue_index(&p.queue_item_id)
                .ok_or_else(|| EngineError::QueueItemNotFound(p.queue_item_id.clone()))?;
            if next.queue[idx].status.is_on_deck() {
                return Err(EngineError::CannotRemoveLoadedItem);
            }
            next.queue.remove(idx);
            next.version += 1;
            let payload = json!({ "queueItemId": p.queue_item_id });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::QueueReorder(p) => {
            let idx = next
                .queue_index(&p.queue_item_id)
                .ok_or_else(|| EngineError::QueueItemNotFound(p.queue_item_id.clone()))?;
            let item = next.queue.remove(idx);
            let target = p.new_index.min(next.queue.len());
            next.queue.insert(target, item);
            next.version += 1;
            let payload = json!({ "queueItemId": p.queue_item_id, "newIndex": target });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::QueueEdit(p) => {
            let idx = next
                .queue_index(&p.queue_item_id)
                .ok_or_else(|| EngineError::QueueItemNotFound(p.queue_item_id.clone()))?;
            if let Some(title) = &p.updates.title {
                next.queue[idx].title = title.clone();
            }
            next.version += 1;
            let payload = json!({ "queueItemId": p.queue_item_id, "updates": p.updates });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::QueueClear => {
            let removed: Vec<String> = next
                .queue
                .iter()
                .filter(|q| !q.status.is_on_deck())
                .map(|q| q.id.clone())
                .collect();
            next.queue.retain(|q| q.status.is_on_deck());
            next.version += 1;
            let payload = json!({ "removed": removed });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: None,
            })
        }

        ClientEvent::Kick(p) => {
            let member = next
                .remove_member(&p.client_id)
                .ok_or_else(|| EngineError::InvalidPayload(format!("unknown client: {}", p.client_id)))?;
            next.clear_ownerships_of(&p.client_id);
            next.version += 1;
            let payload = json!({ "clientId": member.client_id, "name": member.name });
            Ok(ApplyOutcome::Mutation {
                next,
                payload,
                kicked: Some(member.client_id),
            })
        }

        // Time pings are answered at the transport; they never reach apply.
        ClientEvent::TimePing(_) => Err(EngineError::InvalidPayload(
            "TIME_PING is not a mutation".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NullCatalog, StaticCatalog, TrackInfo};
    use crate::model::DeckId;
    use crate::protocol::*;

    fn base_room() -> RoomState {
        let mut state = RoomState::new("r1".into(), "ABCD23".into(), 1_000);
        state.add_member("c1".into(), "Alice".into(), 1_000);
        state.add_member("c2".into(), "Bob".into(), 2_000);
        state
    }

    fn apply_ok(state: &RoomState, client: &str, event: ClientEvent, ts: u64) -> RoomState {
        match apply(state, client, &event, ts, &NullCatalog).unwrap() {
            ApplyOutcome::Mutation { next, .. } => next,
            ApplyOutcome::Cursor { next, .. } => next,
        }
    }

    fn queue_add(track: &str, title: &str, duration: f64) -> ClientEvent {
        ClientEvent::QueueAdd(QueueAddPayload {
            track_id: track.into(),
            title: title.into(),
            duration_sec: duration,
            insert_at: None,
        })
    }

    fn load_first_item(state: &RoomState) -> (RoomState, String) {
        let item_id = state.queue[0].id.clone();
        let next = apply_ok(
            state,
            "c1",
            ClientEvent::DeckLoad(DeckLoadPayload {
                deck_id: "A".into(),
                track_id: state.queue[0].track_id.clone(),
                queue_item_id: item_id.clone(),
            }),
            5_000,
        );
        (next, item_id)
    }

    #[test]
    fn every_mutation_bumps_version_by_one() {
        let state = base_room();
        let v0 = state.version;
        let next = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        assert_eq!(next.version, v0 + 1);
    }

    #[test]
    fn cursor_move_does_not_bump_version() {
        let state = base_room();
        let outcome = apply(
            &state,
            "c1",
            &ClientEvent::CursorMove(CursorMovePayload { x: 0.5, y: 0.25 }),
            5_000,
            &NullCatalog,
        )
        .unwrap();
        match outcome {
            ApplyOutcome::Cursor { next, cursor } => {
                assert_eq!(next.version, state.version);
                assert_eq!(cursor.x, 0.5);
                assert_eq!(next.member("c1").unwrap().cursor.unwrap().y, 0.25);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn apply_returns_independent_state() {
        let state = base_room();
        let next = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        assert_eq!(state.queue.len(), 0);
        assert_eq!(next.queue.len(), 1);
    }

    #[test]
    fn queue_add_then_reorder_matches_expected_order() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let s2 = apply_ok(&s1, "c1", queue_add("t2", "B", 90.0), 5_001);
        let q2 = s2.queue[1].id.clone();
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::QueueReorder(QueueReorderPayload {
                queue_item_id: q2.clone(),
                new_index: 0,
            }),
            5_002,
        );
        assert_eq!(s3.queue[0].id, q2);
        assert_eq!(s3.queue[0].title, "B");
        assert_eq!(s3.queue[1].title, "A");
        assert_eq!(s3.version, state.version + 3);
    }

    #[test]
    fn queue_add_broadcast_includes_minted_id() {
        let state = base_room();
        let outcome = apply(&state, "c1", &queue_add("t1", "A", 120.0), 5_000, &NullCatalog).unwrap();
        match outcome {
            ApplyOutcome::Mutation { next, payload, .. } => {
                let id = payload["queueItemId"].as_str().unwrap();
                assert_eq!(next.queue[0].id, id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn queue_add_respects_catalog_metadata() {
        let catalog = StaticCatalog::new();
        catalog.insert(
            "t1",
            TrackInfo {
                title: "Proper Title".into(),
                duration_sec: 200.0,
                bpm: Some(128.0),
            },
        );
        let state = base_room();
        let outcome = apply(&state, "c1", &queue_add("t1", "wrong", 1.0), 5_000, &catalog).unwrap();
        let ApplyOutcome::Mutation { next, .. } = outcome else {
            panic!("expected mutation");
        };
        assert_eq!(next.queue[0].title, "Proper Title");
        assert_eq!(next.queue[0].duration_sec, 200.0);
    }

    #[test]
    fn remove_loaded_item_is_rejected() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, item_id) = load_first_item(&s1);

        let err = apply(
            &s2,
            "c1",
            &ClientEvent::QueueRemove(QueueItemRefPayload {
                queue_item_id: item_id,
            }),
            6_000,
            &NullCatalog,
        )
        .unwrap_err();
        assert_eq!(err.code(), "CANNOT_REMOVE_LOADED_ITEM");
        assert_eq!(s2.queue.len(), 1);
    }

    #[test]
    fn load_sets_deck_and_item_status() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, item_id) = load_first_item(&s1);

        let deck = s2.deck(DeckId::A);
        assert_eq!(deck.loaded_track_id.as_deref(), Some("t1"));
        assert_eq!(deck.loaded_queue_item_id.as_deref(), Some(item_id.as_str()));
        assert_eq!(deck.duration_sec, Some(120.0));
        assert_eq!(deck.play_state, PlayState::Stopped);
        assert_eq!(deck.playhead_sec, 0.0);
        assert_eq!(s2.queue[0].status, QueueItemStatus::LoadedA);
    }

    #[test]
    fn load_seeds_bpm_from_catalog() {
        let catalog = StaticCatalog::new();
        catalog.insert(
            "t1",
            TrackInfo {
                title: "A".into(),
                duration_sec: 120.0,
                bpm: Some(140.0),
            },
        );
        let state = base_room();
        let s1 = match apply(&state, "c1", &queue_add("t1", "A", 120.0), 5_000, &catalog).unwrap() {
            ApplyOutcome::Mutation { next, .. } => next,
            _ => unreachable!(),
        };
        let item_id = s1.queue[0].id.clone();
        let s2 = match apply(
            &s1,
            "c1",
            &ClientEvent::DeckLoad(DeckLoadPayload {
                deck_id: "A".into(),
                track_id: "t1".into(),
                queue_item_id: item_id,
            }),
            5_100,
            &catalog,
        )
        .unwrap()
        {
            ApplyOutcome::Mutation { next, .. } => next,
            _ => unreachable!(),
        };
        assert_eq!(s2.deck(DeckId::A).detected_bpm, Some(140.0));
    }

    #[test]
    fn play_then_pause_captures_interpolated_playhead() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, item_id) = load_first_item(&s1);

        let t0 = 100_000;
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::DeckPlay(DeckRefPayload { deck_id: "A".into() }),
            t0,
        );
        let deck = s3.deck(DeckId::A);
        assert_eq!(deck.play_state, PlayState::Playing);
        assert_eq!(deck.epoch_start_time_ms, t0);
        assert_eq!(deck.epoch_start_playhead_sec, 0.0);
        assert_eq!(s3.queue[0].status, QueueItemStatus::PlayingA);

        let s4 = apply_ok(
            &s3,
            "c1",
            ClientEvent::DeckPause(DeckRefPayload { deck_id: "A".into() }),
            t0 + 5_000,
        );
        let deck = s4.deck(DeckId::A);
        assert_eq!(deck.play_state, PlayState::Paused);
        assert!((deck.playhead_sec - 5.0).abs() < 0.050, "playhead {}", deck.playhead_sec);
        assert_eq!(deck.epoch_seq, 0);
        assert_ne!(deck.epoch_id, s3.deck(DeckId::A).epoch_id);
        assert_eq!(s4.queue[0].status, QueueItemStatus::LoadedA);
        let _ = item_id;
    }

    #[test]
    fn play_without_track_rejected() {
        let state = base_room();
        let err = apply(
            &state,
            "c1",
            &ClientEvent::DeckPlay(DeckRefPayload { deck_id: "A".into() }),
            5_000,
            &NullCatalog,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn seek_preserves_play_state_and_starts_epoch() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, _) = load_first_item(&s1);
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::DeckPlay(DeckRefPayload { deck_id: "A".into() }),
            10_000,
        );
        let s4 = apply_ok(
            &s3,
            "c1",
            ClientEvent::DeckSeek(DeckSeekPayload {
                deck_id: "A".into(),
                position_sec: 60.0,
            }),
            12_000,
        );
        let deck = s4.deck(DeckId::A);
        assert_eq!(deck.play_state, PlayState::Playing);
        assert_eq!(deck.playhead_sec, 60.0);
        assert_eq!(deck.epoch_start_playhead_sec, 60.0);
        assert_eq!(deck.epoch_start_time_ms, 12_000);
        // Still advancing from the new anchor
        assert!((deck.position_at(13_000) - 61.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_keeps_playhead_continuous() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 600.0), 5_000);
        let (s2, _) = load_first_item(&s1);
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::DeckPlay(DeckRefPayload { deck_id: "A".into() }),
            10_000,
        );
        // 10s at rate 1.0 → playhead 10s, then speed up
        let s4 = apply_ok(
            &s3,
            "c1",
            ClientEvent::DeckTempoSet(DeckTempoPayload {
                deck_id: "A".into(),
                playback_rate: 1.5,
            }),
            20_000,
        );
        let deck = s4.deck(DeckId::A);
        assert!((deck.epoch_start_playhead_sec - 10.0).abs() < 1e-9);
        assert_eq!(deck.playback_rate, 1.5);
        // 4s later at 1.5x → 16s
        assert!((deck.position_at(24_000) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn cue_snaps_playhead() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, _) = load_first_item(&s1);
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::DeckCue(DeckCuePayload {
                deck_id: "A".into(),
                cue_point_sec: Some(30.0),
            }),
            10_000,
        );
        let deck = s3.deck(DeckId::A);
        assert_eq!(deck.cue_point_sec, Some(30.0));
        assert_eq!(deck.playhead_sec, 30.0);
        assert_eq!(deck.play_state, PlayState::Cued);
    }

    #[test]
    fn hotcue_sets_and_clears_without_moving_playhead() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let (s2, _) = load_first_item(&s1);
        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::DeckHotcue(DeckHotcuePayload {
                deck_id: "A".into(),
                point_sec: Some(45.0),
            }),
            10_000,
        );
        assert_eq!(s3.deck(DeckId::A).hot_cue_point_sec, Some(45.0));
        assert_eq!(s3.deck(DeckId::A).playhead_sec, 0.0);
        assert_eq!(
            s3.deck(DeckId::A).epoch_id,
            s2.deck(DeckId::A).epoch_id,
            "hot cue must not start a new epoch"
        );

        let s4 = apply_ok(
            &s3,
            "c1",
            ClientEvent::DeckHotcue(DeckHotcuePayload {
                deck_id: "A".into(),
                point_sec: None,
            }),
            11_000,
        );
        assert_eq!(s4.deck(DeckId::A).hot_cue_point_sec, None);
    }

    #[test]
    fn mixer_set_updates_owner_touch_time() {
        let mut state = base_room();
        state.control_owners.insert(
            crate::model::ControlId::Crossfader,
            ControlOwner {
                client_id: "c1".into(),
                acquired_at: 4_000,
                last_moved_at: 4_000,
            },
        );
        let next = apply_ok(
            &state,
            "c1",
            ClientEvent::MixerSet(MixerSetPayload {
                control_id: "crossfader".into(),
                value: 0.8,
            }),
            6_000,
        );
        assert_eq!(next.mixer.crossfader, 0.8);
        assert_eq!(
            next.control_owners[&crate::model::ControlId::Crossfader].last_moved_at,
            6_000
        );
    }

    #[test]
    fn grab_and_release_round_trip() {
        let state = base_room();
        let grabbed = apply_ok(
            &state,
            "c2",
            ClientEvent::ControlGrab(ControlRefPayload {
                control_id: "fx.wetDry".into(),
            }),
            5_000,
        );
        let owner = &grabbed.control_owners[&crate::model::ControlId::FxWetDry];
        assert_eq!(owner.client_id, "c2");
        assert_eq!(owner.acquired_at, 5_000);

        let released = apply_ok(
            &grabbed,
            "c2",
            ClientEvent::ControlRelease(ControlRefPayload {
                control_id: "fx.wetDry".into(),
            }),
            5_500,
        );
        assert!(released
            .control_owners
            .get(&crate::model::ControlId::FxWetDry)
            .is_none());
    }

    #[test]
    fn queue_clear_keeps_deck_items() {
        let state = base_room();
        let s1 = apply_ok(&state, "c1", queue_add("t1", "A", 120.0), 5_000);
        let s2 = apply_ok(&s1, "c1", queue_add("t2", "B", 90.0), 5_001);
        let (s3, loaded_id) = load_first_item(&s2);

        let s4 = apply_ok(&s3, "c1", ClientEvent::QueueClear, 6_000);
        assert_eq!(s4.queue.len(), 1);
        assert_eq!(s4.queue[0].id, loaded_id);
    }

    #[test]
    fn kick_removes_member_and_ownerships() {
        let mut state = base_room();
        state.control_owners.insert(
            crate::model::ControlId::Crossfader,
            ControlOwner {
                client_id: "c2".into(),
                acquired_at: 4_000,
                last_moved_at: 4_000,
            },
        );
        let outcome = apply(
            &state,
            "c1",
            &ClientEvent::Kick(KickPayload {
                client_id: "c2".into(),
            }),
            6_000,
            &NullCatalog,
        )
        .unwrap();
        let ApplyOutcome::Mutation { next, kicked, .. } = outcome else {
            panic!("expected mutation");
        };
        assert_eq!(kicked.as_deref(), Some("c2"));
        assert!(next.member("c2").is_none());
        assert!(next.control_owners.is_empty());
    }

    #[test]
    fn fx_set_and_toggle() {
        let state = base_room();
        let s1 = apply_ok(
            &state,
            "c1",
            ClientEvent::FxSet(FxSetPayload {
                param: "type".into(),
                value: serde_json::json!("reverb"),
            }),
            5_000,
        );
        assert_eq!(s1.mixer.fx.fx_type, crate::model::FxType::Reverb);

        let s2 = apply_ok(
            &s1,
            "c1",
            ClientEvent::FxSet(FxSetPayload {
                param: "wetDry".into(),
                value: serde_json::json!(0.9),
            }),
            5_001,
        );
        assert_eq!(s2.mixer.fx.wet_dry, 0.9);

        let s3 = apply_ok(
            &s2,
            "c1",
            ClientEvent::FxToggle(FxTogglePayload { enabled: true }),
            5_002,
        );
        assert!(s3.mixer.fx.enabled);
    }
}
