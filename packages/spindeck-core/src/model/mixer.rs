//! Mixer state and the enumerated control surface.
//!
//! Every grabbable/settable control in a room has a [`ControlId`]. The wire
//! form is a dotted path (`channelA.eq.low`, `fx.wetDry`); the closed enum is
//! what validation and ownership key on.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use super::deck::DeckId;
use crate::protocol_constants::{TEMPO_MAX, TEMPO_MIN};

// ─────────────────────────────────────────────────────────────────────────────
// Control Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// EQ band within a channel strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

/// A named, grabbable control in the room.
///
/// `DeckJog` and `DeckTempo` exist for ownership (a member "holds" the jog
/// wheel or tempo fader); they are not addressable via `MIXER_SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    Crossfader,
    MasterVolume,
    ChannelFader(DeckId),
    ChannelGain(DeckId),
    ChannelEq(DeckId, EqBand),
    ChannelFilter(DeckId),
    FxWetDry,
    FxParam,
    DeckJog(DeckId),
    DeckTempo(DeckId),
}

impl ControlId {
    /// Inclusive (min, max) bounds for the control's value.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Self::Crossfader
            | Self::MasterVolume
            | Self::ChannelFader(_)
            | Self::ChannelFilter(_)
            | Self::FxWetDry
            | Self::FxParam => (0.0, 1.0),
            Self::ChannelGain(_) | Self::ChannelEq(_, _) | Self::DeckJog(_) => (-1.0, 1.0),
            Self::DeckTempo(_) => (TEMPO_MIN, TEMPO_MAX),
        }
    }

    /// Whether `MIXER_SET` may address this control.
    ///
    /// Deck jog/tempo are grab-only; their values move via deck events.
    pub fn is_mixer_addressable(&self) -> bool {
        !matches!(self, Self::DeckJog(_) | Self::DeckTempo(_))
    }

    /// The ownership control gating a deck's tempo fader.
    pub fn tempo_of(deck: DeckId) -> Self {
        Self::DeckTempo(deck)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crossfader => write!(f, "crossfader"),
            Self::MasterVolume => write!(f, "masterVolume"),
            Self::ChannelFader(d) => write!(f, "channel{}.fader", d),
            Self::ChannelGain(d) => write!(f, "channel{}.gain", d),
            Self::ChannelEq(d, band) => write!(f, "channel{}.eq.{}", d, band.as_str()),
            Self::ChannelFilter(d) => write!(f, "channel{}.filter", d),
            Self::FxWetDry => write!(f, "fx.wetDry"),
            Self::FxParam => write!(f, "fx.param"),
            Self::DeckJog(d) => write!(f, "deck{}.jog", d),
            Self::DeckTempo(d) => write!(f, "deck{}.tempo", d),
        }
    }
}

impl FromStr for ControlId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crossfader" => return Ok(Self::Crossfader),
            "masterVolume" => return Ok(Self::MasterVolume),
            "fx.wetDry" => return Ok(Self::FxWetDry),
            "fx.param" => return Ok(Self::FxParam),
            _ => {}
        }
        let (prefix, rest) = s.split_once('.').ok_or(())?;
        let deck = |p: &str, tag: &str| -> Result<DeckId, ()> {
            match p.strip_prefix(tag) {
                Some("A") => Ok(DeckId::A),
                Some("B") => Ok(DeckId::B),
                _ => Err(()),
            }
        };
        if let Ok(d) = deck(prefix, "channel") {
            return match rest {
                "fader" => Ok(Self::ChannelFader(d)),
                "gain" => Ok(Self::ChannelGain(d)),
                "filter" => Ok(Self::ChannelFilter(d)),
                "eq.low" => Ok(Self::ChannelEq(d, EqBand::Low)),
                "eq.mid" => Ok(Self::ChannelEq(d, EqBand::Mid)),
                "eq.high" => Ok(Self::ChannelEq(d, EqBand::High)),
                _ => Err(()),
            };
        }
        if let Ok(d) = deck(prefix, "deck") {
            return match rest {
                "jog" => Ok(Self::DeckJog(d)),
                "tempo" => Ok(Self::DeckTempo(d)),
                _ => Err(()),
            };
        }
        Err(())
    }
}

impl Serialize for ControlId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ControlId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|()| de::Error::custom(format!("invalid control id: {s}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mixer State
// ─────────────────────────────────────────────────────────────────────────────

/// Three-band EQ settings, each −1..1 around flat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqState {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl Default for EqState {
    fn default() -> Self {
        Self {
            low: 0.0,
            mid: 0.0,
            high: 0.0,
        }
    }
}

/// One channel strip of the shared mixer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStrip {
    pub fader: f64,
    pub gain: f64,
    pub eq: EqState,
    pub filter: f64,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            fader: 1.0,
            gain: 0.0,
            eq: EqState::default(),
            filter: 0.5,
        }
    }
}

/// Selectable FX unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxType {
    #[default]
    None,
    Echo,
    Reverb,
    Filter,
}

impl FxType {
    /// Parses the wire form used by `FX_SET {param: "type"}`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "echo" => Some(Self::Echo),
            "reverb" => Some(Self::Reverb),
            "filter" => Some(Self::Filter),
            _ => None,
        }
    }
}

/// Shared FX unit state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxState {
    #[serde(rename = "type")]
    pub fx_type: FxType,
    pub enabled: bool,
    pub wet_dry: f64,
    pub param: f64,
}

impl Default for FxState {
    fn default() -> Self {
        Self {
            fx_type: FxType::None,
            enabled: false,
            wet_dry: 0.5,
            param: 0.5,
        }
    }
}

/// The shared mixer: crossfader, master, two channel strips, one FX unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerState {
    pub crossfader: f64,
    pub master_volume: f64,
    pub channel_a: ChannelStrip,
    pub channel_b: ChannelStrip,
    pub fx: FxState,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            crossfader: 0.5,
            master_volume: 1.0,
            channel_a: ChannelStrip::default(),
            channel_b: ChannelStrip::default(),
            fx: FxState::default(),
        }
    }
}

impl MixerState {
    /// Applies `value` (clamped to the control's bounds) to the addressed
    /// field. Returns the clamped value, or `None` for grab-only controls.
    pub fn set(&mut self, control: ControlId, value: f64) -> Option<f64> {
        let (min, max) = control.bounds();
        let v = value.clamp(min, max);
        let slot = match control {
            ControlId::Crossfader => &mut self.crossfader,
            ControlId::MasterVolume => &mut self.master_volume,
            ControlId::ChannelFader(d) => &mut self.channel_mut(d).fader,
            ControlId::ChannelGain(d) => &mut self.channel_mut(d).gain,
            ControlId::ChannelEq(d, EqBand::Low) => &mut self.channel_mut(d).eq.low,
            ControlId::ChannelEq(d, EqBand::Mid) => &mut self.channel_mut(d).eq.mid,
            ControlId::ChannelEq(d, EqBand::High) => &mut self.channel_mut(d).eq.high,
            ControlId::ChannelFilter(d) => &mut self.channel_mut(d).filter,
            ControlId::FxWetDry => &mut self.fx.wet_dry,
            ControlId::FxParam => &mut self.fx.param,
            ControlId::DeckJog(_) | ControlId::DeckTempo(_) => return None,
        };
        *slot = v;
        Some(v)
    }

    fn channel_mut(&mut self, deck: DeckId) -> &mut ChannelStrip {
        match deck {
            DeckId::A => &mut self.channel_a,
            DeckId::B => &mut self.channel_b,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control Ownership
// ─────────────────────────────────────────────────────────────────────────────

/// A short-lived lease granting a member exclusive edit rights to a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOwner {
    pub client_id: String,
    pub acquired_at: u64,
    pub last_moved_at: u64,
}

impl ControlOwner {
    /// Whether the lease is still active at `now` for the given TTL.
    pub fn is_active(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_moved_at) < ttl_ms
    }
}

/// Map of control ids to their current lease, serialized with dotted-path keys.
pub type ControlOwners = HashMap<ControlId, ControlOwner>;
