//! Pure validation predicates over state + payload.
//!
//! Everything here is deterministic and side-effect free; failures map to
//! the closed error taxonomy. Existence checks that belong to a transition
//! (queue item present, track loaded) live in `apply` instead.

use crate::config::{EngineConfig, OwnershipPolicy};
use crate::error::EngineError;
use crate::model::{ControlId, DeckId, RoomState};
use crate::protocol::ClientEvent;
use crate::protocol_constants::{CURSOR_MAX_COORD, TEMPO_MAX, TEMPO_MIN};

/// Parses a wire deck id.
pub(crate) fn parse_deck(deck_id: &str) -> Result<DeckId, EngineError> {
    deck_id
        .parse()
        .map_err(|()| EngineError::DeckNotFound(deck_id.to_string()))
}

/// Parses a wire control id.
pub(crate) fn parse_control(control_id: &str) -> Result<ControlId, EngineError> {
    control_id
        .parse()
        .map_err(|()| EngineError::InvalidControlId(control_id.to_string()))
}

/// Whether cursor coordinates are inside the cursor space.
pub(crate) fn cursor_in_bounds(x: f64, y: f64) -> bool {
    x.is_finite()
        && y.is_finite()
        && (0.0..=CURSOR_MAX_COORD).contains(&x)
        && (0.0..=CURSOR_MAX_COORD).contains(&y)
}

fn check_position(pos: f64, duration: Option<f64>) -> Result<(), EngineError> {
    if !pos.is_finite() || pos < 0.0 {
        return Err(EngineError::InvalidSeekPosition(pos));
    }
    if let Some(d) = duration {
        if pos > d {
            return Err(EngineError::InvalidSeekPosition(pos));
        }
    }
    Ok(())
}

fn check_control_value(control: ControlId, value: f64) -> Result<(), EngineError> {
    let (min, max) = control.bounds();
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::ValueOutOfBounds {
            control: control.to_string(),
            value,
        });
    }
    Ok(())
}

/// What the sender wants to do with a control, for contention decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlIntent {
    /// Move the control's value.
    Move,
    /// Acquire the lease.
    Grab,
    /// Drop the lease.
    Release,
}

/// Decides whether the sender may act on a control given current leases.
fn check_contention(
    state: &RoomState,
    config: &EngineConfig,
    control: ControlId,
    client_id: &str,
    now_ms: u64,
    intent: ControlIntent,
) -> Result<(), EngineError> {
    let Some(owner) = state.active_owner(control, now_ms, config.ownership_ttl_ms) else {
        return Ok(());
    };
    if owner.client_id == client_id {
        return Ok(());
    }
    match intent {
        ControlIntent::Move | ControlIntent::Release => Err(EngineError::ContestedControl),
        ControlIntent::Grab => match config.ownership_policy {
            OwnershipPolicy::Strict => Err(EngineError::ContestedControl),
            OwnershipPolicy::Permissive => Ok(()),
        },
    }
}

/// Validates a client event against the current room state.
pub(crate) fn validate_event(
    state: &RoomState,
    config: &EngineConfig,
    client_id: &str,
    event: &ClientEvent,
    now_ms: u64,
) -> Result<(), EngineError> {
    if config.is_host_only(event.type_name()) {
        let is_host = state.member(client_id).is_some_and(|m| m.is_host);
        if !is_host {
            return Err(EngineError::NotHost);
        }
    }

    match event {
        ClientEvent::CursorMove(p) => {
            if !cursor_in_bounds(p.x, p.y) {
                return Err(EngineError::InvalidCursorPosition);
            }
        }
        ClientEvent::ControlGrab(p) => {
            let control = parse_control(&p.control_id)?;
            check_contention(state, config, control, client_id, now_ms, ControlIntent::Grab)?;
        }
        ClientEvent::ControlRelease(p) => {
            let control = parse_control(&p.control_id)?;
            check_contention(
                state,
                config,
                control,
                client_id,
                now_ms,
                ControlIntent::Release,
            )?;
        }
        ClientEvent::MixerSet(p) => {
            let control = parse_control(&p.control_id)?;
            if !control.is_mixer_addressable() {
                return Err(EngineError::InvalidControlId(p.control_id.clone()));
            }
            check_control_value(control, p.value)?;
            check_contention(state, config, control, client_id, now_ms, ControlIntent::Move)?;
        }
        ClientEvent::FxSet(p) => match p.param.as_str() {
            "wetDry" | "param" => {
                let value = p
                    .value
                    .as_f64()
                    .ok_or_else(|| EngineError::InvalidPayload("fx value must be a number".into()))?;
                if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                    return Err(EngineError::ValueOutOfBounds {
                        control: format!("fx.{}", p.param),
                        value,
                    });
                }
            }
            "type" => {
                let name = p
                    .value
                    .as_str()
                    .ok_or_else(|| EngineError::InvalidPayload("fx type must be a string".into()))?;
                if crate::model::FxType::parse(name).is_none() {
                    return Err(EngineError::InvalidPayload(format!("unknown fx type: {name}")));
                }
            }
            other => {
                return Err(EngineError::InvalidPayload(format!("unknown fx param: {other}")));
            }
        },
        ClientEvent::FxToggle(_) => {}
        ClientEvent::DeckLoad(p) => {
            parse_deck(&p.deck_id)?;
        }
        ClientEvent::DeckPlay(p) | ClientEvent::DeckPause(p) => {
            parse_deck(&p.deck_id)?;
        }
        ClientEvent::DeckCue(p) => {
            let deck = parse_deck(&p.deck_id)?;
            if let Some(cue) = p.cue_point_sec {
                check_position(cue, state.deck(deck).duration_sec)?;
            }
        }
        ClientEvent::DeckSeek(p) => {
            let deck = parse_deck(&p.deck_id)?;
            check_position(p.position_sec, state.deck(deck).duration_sec)?;
        }
        ClientEvent::DeckTempoSet(p) => {
            let deck = parse_deck(&p.deck_id)?;
            if !p.playback_rate.is_finite()
                || p.playback_rate < TEMPO_MIN
                || p.playback_rate > TEMPO_MAX
            {
                return Err(EngineError::ValueOutOfBounds {
                    control: ControlId::tempo_of(deck).to_string(),
                    value: p.playback_rate,
                });
            }
            check_contention(
                state,
                config,
                ControlId::tempo_of(deck),
                client_id,
                now_ms,
                ControlIntent::Move,
            )?;
        }
        ClientEvent::DeckHotcue(p) => {
            let deck = parse_deck(&p.deck_id)?;
            if let Some(point) = p.point_sec {
                check_position(point, state.deck(deck).duration_sec)?;
            }
        }
        ClientEvent::QueueAdd(p) => {
            if !p.duration_sec.is_finite() || p.duration_sec <= 0.0 {
                return Err(EngineError::InvalidPayload(
                    "durationSec must be a positive number".into(),
                ));
            }
            if let Some(insert_at) = p.insert_at {
                if insert_at > state.queue.len() {
                    return Err(EngineError::InvalidQueueIndex(insert_at));
                }
            }
        }
        ClientEvent::QueueReorder(p) => {
            if !state.queue.is_empty() && p.new_index >= state.queue.len() {
                return Err(EngineError::InvalidQueueIndex(p.new_index));
            }
        }
        ClientEvent::QueueRemove(_) | ClientEvent::QueueEdit(_) | ClientEvent::QueueClear => {}
        ClientEvent::Kick(p) => {
            if p.client_id == client_id {
                return Err(EngineError::InvalidPayload("cannot kick yourself".into()));
            }
            if state.member(&p.client_id).is_none() {
                return Err(EngineError::InvalidPayload(format!(
                    "unknown client: {}",
                    p.client_id
                )));
            }
        }
        ClientEvent::TimePing(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ControlOwner, RoomState};
    use crate::protocol::*;

    fn room_with_members() -> RoomState {
        let mut state = RoomState::new("r1".into(), "ABCD23".into(), 1_000);
        state.add_member("host".into(), "Alice".into(), 1_000);
        state.add_member("guest".into(), "Bob".into(), 2_000);
        state
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn mixer_set(control: &str, value: f64) -> ClientEvent {
        ClientEvent::MixerSet(MixerSetPayload {
            control_id: control.into(),
            value,
        })
    }

    #[test]
    fn mixer_set_accepts_in_bounds_values() {
        let state = room_with_members();
        assert!(validate_event(&state, &config(), "host", &mixer_set("crossfader", 0.7), 5_000).is_ok());
    }

    #[test]
    fn mixer_set_rejects_out_of_bounds() {
        let state = room_with_members();
        let err =
            validate_event(&state, &config(), "host", &mixer_set("crossfader", 1.5), 5_000)
                .unwrap_err();
        assert_eq!(err.code(), "VALUE_OUT_OF_BOUNDS");
    }

    #[test]
    fn mixer_set_rejects_non_finite() {
        let state = room_with_members();
        let err = validate_event(
            &state,
            &config(),
            "host",
            &mixer_set("channelA.gain", f64::NAN),
            5_000,
        )
        .unwrap_err();
        assert_eq!(err.code(), "VALUE_OUT_OF_BOUNDS");
    }

    #[test]
    fn mixer_set_rejects_unknown_control() {
        let state = room_with_members();
        let err = validate_event(&state, &config(), "host", &mixer_set("volume", 0.5), 5_000)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONTROL_ID");
    }

    #[test]
    fn mixer_set_rejects_grab_only_controls() {
        let state = room_with_members();
        let err = validate_event(&state, &config(), "host", &mixer_set("deckA.jog", 0.5), 5_000)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONTROL_ID");
    }

    #[test]
    fn contested_control_rejected_for_non_owner() {
        let mut state = room_with_members();
        state.control_owners.insert(
            ControlId::Crossfader,
            ControlOwner {
                client_id: "host".into(),
                acquired_at: 5_000,
                last_moved_at: 5_000,
            },
        );
        let err = validate_event(&state, &config(), "guest", &mixer_set("crossfader", 0.5), 6_000)
            .unwrap_err();
        assert_eq!(err.code(), "CONTESTED_CONTROL");
    }

    #[test]
    fn expired_lease_frees_the_control() {
        let mut state = room_with_members();
        state.control_owners.insert(
            ControlId::Crossfader,
            ControlOwner {
                client_id: "host".into(),
                acquired_at: 5_000,
                last_moved_at: 5_000,
            },
        );
        // 2s TTL elapsed
        assert!(validate_event(&state, &config(), "guest", &mixer_set("crossfader", 0.5), 7_100).is_ok());
    }

    #[test]
    fn owner_may_move_their_control() {
        let mut state = room_with_members();
        state.control_owners.insert(
            ControlId::Crossfader,
            ControlOwner {
                client_id: "guest".into(),
                acquired_at: 5_000,
                last_moved_at: 5_000,
            },
        );
        assert!(validate_event(&state, &config(), "guest", &mixer_set("crossfader", 0.5), 6_000).is_ok());
    }

    #[test]
    fn grab_steals_only_under_permissive_policy() {
        let mut state = room_with_members();
        state.control_owners.insert(
            ControlId::Crossfader,
            ControlOwner {
                client_id: "host".into(),
                acquired_at: 5_000,
                last_moved_at: 5_000,
            },
        );
        let grab = ClientEvent::ControlGrab(ControlRefPayload {
            control_id: "crossfader".into(),
        });

        let strict = config();
        assert_eq!(
            validate_event(&state, &strict, "guest", &grab, 6_000)
                .unwrap_err()
                .code(),
            "CONTESTED_CONTROL"
        );

        let permissive = EngineConfig {
            ownership_policy: OwnershipPolicy::Permissive,
            ..EngineConfig::default()
        };
        assert!(validate_event(&state, &permissive, "guest", &grab, 6_000).is_ok());
    }

    #[test]
    fn tempo_set_respects_tempo_lease() {
        let mut state = room_with_members();
        state.control_owners.insert(
            ControlId::DeckTempo(DeckId::A),
            ControlOwner {
                client_id: "host".into(),
                acquired_at: 5_000,
                last_moved_at: 5_000,
            },
        );
        let tempo = ClientEvent::DeckTempoSet(DeckTempoPayload {
            deck_id: "A".into(),
            playback_rate: 1.2,
        });
        assert_eq!(
            validate_event(&state, &config(), "guest", &tempo, 6_000)
                .unwrap_err()
                .code(),
            "CONTESTED_CONTROL"
        );
    }

    #[test]
    fn tempo_outside_range_rejected() {
        let state = room_with_members();
        let tempo = ClientEvent::DeckTempoSet(DeckTempoPayload {
            deck_id: "A".into(),
            playback_rate: 2.0,
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &tempo, 6_000)
                .unwrap_err()
                .code(),
            "VALUE_OUT_OF_BOUNDS"
        );
    }

    #[test]
    fn unknown_deck_rejected() {
        let state = room_with_members();
        let play = ClientEvent::DeckPlay(DeckRefPayload {
            deck_id: "C".into(),
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &play, 6_000)
                .unwrap_err()
                .code(),
            "DECK_NOT_FOUND"
        );
    }

    #[test]
    fn cursor_bounds_enforced() {
        assert!(cursor_in_bounds(0.0, 0.0));
        assert!(cursor_in_bounds(10_000.0, 5.0));
        assert!(!cursor_in_bounds(-1.0, 5.0));
        assert!(!cursor_in_bounds(10_001.0, 5.0));
        assert!(!cursor_in_bounds(f64::NAN, 5.0));
        assert!(!cursor_in_bounds(5.0, f64::INFINITY));
    }

    #[test]
    fn host_only_actions_require_host() {
        let state = room_with_members();
        assert_eq!(
            validate_event(&state, &config(), "guest", &ClientEvent::QueueClear, 5_000)
                .unwrap_err()
                .code(),
            "NOT_HOST"
        );
        assert!(validate_event(&state, &config(), "host", &ClientEvent::QueueClear, 5_000).is_ok());
    }

    #[test]
    fn kick_requires_known_target() {
        let state = room_with_members();
        let kick = ClientEvent::Kick(KickPayload {
            client_id: "ghost".into(),
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &kick, 5_000)
                .unwrap_err()
                .code(),
            "INVALID_PAYLOAD"
        );
    }

    #[test]
    fn queue_insert_index_bounds() {
        let state = room_with_members();
        let add = ClientEvent::QueueAdd(QueueAddPayload {
            track_id: "t1".into(),
            title: "A".into(),
            duration_sec: 120.0,
            insert_at: Some(1),
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &add, 5_000)
                .unwrap_err()
                .code(),
            "INVALID_QUEUE_INDEX"
        );
    }

    #[test]
    fn fx_set_validates_param_and_value() {
        let state = room_with_members();
        let bad_param = ClientEvent::FxSet(FxSetPayload {
            param: "depth".into(),
            value: serde_json::json!(0.5),
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &bad_param, 5_000)
                .unwrap_err()
                .code(),
            "INVALID_PAYLOAD"
        );

        let bad_value = ClientEvent::FxSet(FxSetPayload {
            param: "wetDry".into(),
            value: serde_json::json!(1.5),
        });
        assert_eq!(
            validate_event(&state, &config(), "host", &bad_value, 5_000)
                .unwrap_err()
                .code(),
            "VALUE_OUT_OF_BOUNDS"
        );

        let good_type = ClientEvent::FxSet(FxSetPayload {
            param: "type".into(),
            value: serde_json::json!("echo"),
        });
        assert!(validate_event(&state, &config(), "host", &good_type, 5_000).is_ok());
    }
}
