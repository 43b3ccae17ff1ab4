//! Command action bodies
//!
//! An action body is the command-specific payload carried in field 4 of a
//! command packet. The fixed bodies below were taken from captures of the
//! vendor app; the brightness body is built by
//! [`build_brightness_body`](crate::packet::build_brightness_body).

use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Turn the light on
pub const TURN_ON: &[u8] = &[0x1a, 0x02, 0x08, 0x02];

/// Turn the light off
pub const TURN_OFF: &[u8] = &[0x1a, 0x02, 0x08, 0x04];

/// Pause the dimming sequence
pub const PAUSE: &[u8] = &[0x1a, 0x02, 0x08, 0x05];

/// Resume the dimming sequence
pub const RESUME: &[u8] = &[0x1a, 0x02, 0x08, 0x06];

/// Ask the device to report its state (empty field 19)
pub const QUERY_STATE: &[u8] = &[0x9a, 0x01, 0x00];

/// Immutable action payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionBody(Bytes);

impl ActionBody {
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for ActionBody {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ActionBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl AsRef<[u8]> for ActionBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Brightness levels offered by the vendor app (levels 1 to 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Brightness {
    Pct60,
    Pct70,
    Pct80,
    Pct90,
    Pct100,
}

impl Brightness {
    pub const ALL: [Brightness; 5] = [
        Brightness::Pct60,
        Brightness::Pct70,
        Brightness::Pct80,
        Brightness::Pct90,
        Brightness::Pct100,
    ];

    pub fn percent(self) -> u8 {
        match self {
            Brightness::Pct60 => 60,
            Brightness::Pct70 => 70,
            Brightness::Pct80 => 80,
            Brightness::Pct90 => 90,
            Brightness::Pct100 => 100,
        }
    }
}

impl TryFrom<u8> for Brightness {
    type Error = Error;

    fn try_from(percent: u8) -> Result<Self> {
        Brightness::ALL
            .into_iter()
            .find(|b| b.percent() == percent)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "invalid brightness {}; must be one of 60, 70, 80, 90, 100",
                    percent
                ))
            })
    }
}

impl From<Brightness> for u8 {
    fn from(b: Brightness) -> u8 {
        b.percent()
    }
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// Dimming durations offered by the vendor app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DimmingTime {
    Min15,
    Min30,
    Min45,
    Min60,
    Min90,
}

impl DimmingTime {
    pub const ALL: [DimmingTime; 5] = [
        DimmingTime::Min15,
        DimmingTime::Min30,
        DimmingTime::Min45,
        DimmingTime::Min60,
        DimmingTime::Min90,
    ];

    /// Used when no duration has been configured yet
    pub const DEFAULT: DimmingTime = DimmingTime::Min15;

    pub fn minutes(self) -> u32 {
        match self {
            DimmingTime::Min15 => 15,
            DimmingTime::Min30 => 30,
            DimmingTime::Min45 => 45,
            DimmingTime::Min60 => 60,
            DimmingTime::Min90 => 90,
        }
    }

    pub fn millis(self) -> u64 {
        minutes_to_millis(self.minutes())
    }
}

impl TryFrom<u32> for DimmingTime {
    type Error = Error;

    fn try_from(minutes: u32) -> Result<Self> {
        DimmingTime::ALL
            .into_iter()
            .find(|d| d.minutes() == minutes)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "invalid dimming time {}; must be one of 15, 30, 45, 60, 90",
                    minutes
                ))
            })
    }
}

impl From<DimmingTime> for u32 {
    fn from(d: DimmingTime) -> u32 {
        d.minutes()
    }
}

impl fmt::Display for DimmingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.minutes())
    }
}

pub(crate) const MILLIS_PER_MINUTE: u64 = 60_000;

#[inline]
pub(crate) fn minutes_to_millis(minutes: u32) -> u64 {
    u64::from(minutes) * MILLIS_PER_MINUTE
}

/// A command the client can send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TurnOn,
    TurnOff,
    Pause,
    Resume,
    QueryState,
    /// Brightness plus the dimming duration the device should use, in minutes
    SetBrightness {
        brightness: Brightness,
        dimming_minutes: u32,
    },
}

impl Action {
    /// The body to send for this action
    pub fn body(&self) -> ActionBody {
        match self {
            Action::TurnOn => ActionBody::from_static(TURN_ON),
            Action::TurnOff => ActionBody::from_static(TURN_OFF),
            Action::Pause => ActionBody::from_static(PAUSE),
            Action::Resume => ActionBody::from_static(RESUME),
            Action::QueryState => ActionBody::from_static(QUERY_STATE),
            Action::SetBrightness {
                brightness,
                dimming_minutes,
            } => crate::packet::build_brightness_body(
                *brightness,
                minutes_to_millis(*dimming_minutes),
            ),
        }
    }

    /// Whether the device answers this action with a state notification
    pub fn expects_state_response(&self) -> bool {
        matches!(self, Action::QueryState)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::TurnOn => "turn_on",
            Action::TurnOff => "turn_off",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::QueryState => "query_state",
            Action::SetBrightness { .. } => "set_brightness",
        }
    }
}

/// Per-level bodies from early reverse engineering.
///
/// These have NOT been confirmed against captures and are believed to be
/// wrong. The client never sends them; they are kept so they can be tried
/// by hand through the CLI's `raw` command.
pub mod unverified {
    /// Brightness levels 1 to 5
    pub const BRIGHTNESS_LEVEL: [&[u8]; 5] = [
        &[0x1a, 0x04, 0x08, 0x04, 0x10, 0x01],
        &[0x1a, 0x04, 0x08, 0x04, 0x10, 0x02],
        &[0x1a, 0x04, 0x08, 0x04, 0x10, 0x03],
        &[0x1a, 0x04, 0x08, 0x04, 0x10, 0x04],
        &[0x1a, 0x04, 0x08, 0x04, 0x10, 0x05],
    ];

    /// Dimming durations, keyed by minutes
    pub const DIMMING: [(u32, &[u8]); 5] = [
        (15, &[0x1a, 0x04, 0x08, 0x02, 0x10, 0x0f]),
        (30, &[0x1a, 0x04, 0x08, 0x02, 0x10, 0x1e]),
        (45, &[0x1a, 0x04, 0x08, 0x02, 0x10, 0x2d]),
        (60, &[0x1a, 0x04, 0x08, 0x02, 0x10, 0x3c]),
        (90, &[0x1a, 0x04, 0x08, 0x02, 0x10, 0x5a]),
    ];

    /// Look up an unverified body by name: `brightness-1`..`brightness-5`
    /// or `dim-15`, `dim-30`, `dim-45`, `dim-60`, `dim-90`.
    pub fn lookup(name: &str) -> Option<&'static [u8]> {
        if let Some(level) = name.strip_prefix("brightness-") {
            let level: usize = level.parse().ok()?;
            return BRIGHTNESS_LEVEL.get(level.checked_sub(1)?).copied();
        }
        if let Some(minutes) = name.strip_prefix("dim-") {
            let minutes: u32 = minutes.parse().ok()?;
            return DIMMING
                .iter()
                .find(|(m, _)| *m == minutes)
                .map(|(_, body)| *body);
        }
        None
    }
}
