//! Device state decoding
//!
//! State arrives as field 19 nested inside field 4 of a notification. The
//! sub-fields of field 19 are:
//!
//! | sub-field | type  | meaning                                          |
//! |-----------|-------|--------------------------------------------------|
//! | 1         | varint| power: 1 = on, 3 = off                           |
//! | 2         | varint| remaining dimming time, ms (counts down)         |
//! | 3         | varint| configured dimming duration, ms (0 while off)    |
//! | 4         | varint| paused: non-zero = paused                        |
//! | 7         | bytes | nested; inner field 2 is the battery level enum  |
//! | 8         | varint| always 100 in captures; not the battery          |
//!
//! Brightness is never reported by the device.

use crate::action::{Brightness, MILLIS_PER_MINUTE};
use crate::fields::{parse_nested, FieldMap};
use crate::{RESPONSE_FIELD, STATE_RESPONSE_FIELD};
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

const POWER_FIELD: u32 = 1;
const REMAINING_FIELD: u32 = 2;
const CONFIGURED_FIELD: u32 = 3;
const PAUSED_FIELD: u32 = 4;
const BATTERY_FIELD: u32 = 7;
const BATTERY_LEVEL_FIELD: u32 = 2;

const POWER_ON: u64 = 1;
const POWER_OFF: u64 = 3;

/// Discrete battery level reported in sub-field 7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryLevel {
    Pct25,
    Pct50,
    Pct75,
    Pct100,
    /// A raw value outside the known range
    Unknown(u64),
}

impl BatteryLevel {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            3 => BatteryLevel::Pct25,
            4 => BatteryLevel::Pct50,
            5 => BatteryLevel::Pct75,
            6 => BatteryLevel::Pct100,
            other => {
                debug!("Unrecognised battery level raw value: {}", other);
                BatteryLevel::Unknown(other)
            }
        }
    }

    /// Approximate charge, if the level is known
    pub fn percentage(&self) -> Option<u8> {
        match self {
            BatteryLevel::Pct25 => Some(25),
            BatteryLevel::Pct50 => Some(50),
            BatteryLevel::Pct75 => Some(75),
            BatteryLevel::Pct100 => Some(100),
            BatteryLevel::Unknown(_) => None,
        }
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percentage() {
            Some(pct) => write!(f, "{}%", pct),
            None => write!(f, "unknown"),
        }
    }
}

impl Serialize for BatteryLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.percentage() {
            Some(pct) => serializer.serialize_u8(pct),
            None => serializer.serialize_none(),
        }
    }
}

/// What one state notification says about the device
///
/// `None` means the notification did not carry that piece of state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub is_on: Option<bool>,
    pub remaining_minutes: Option<u32>,
    pub configured_minutes: Option<u32>,
    pub is_paused: Option<bool>,
    pub battery: Option<BatteryLevel>,
    /// The full notification the delta was decoded from
    pub raw: Bytes,
}

impl StateDelta {
    fn from_fields(fields: &FieldMap, raw: Bytes) -> Self {
        let mut delta = StateDelta {
            raw,
            ..Default::default()
        };

        match fields.last_varint(POWER_FIELD) {
            Some(POWER_ON) => delta.is_on = Some(true),
            Some(POWER_OFF) => delta.is_on = Some(false),
            Some(other) => debug!("Ignoring unrecognised power indicator {}", other),
            None => {}
        }

        delta.remaining_minutes = fields.last_varint(REMAINING_FIELD).map(millis_to_minutes);

        // The device reports 0 here while off; only a whole, non-zero minute count is a setting
        delta.configured_minutes = fields
            .last_varint(CONFIGURED_FIELD)
            .map(millis_to_minutes)
            .filter(|minutes| *minutes > 0);

        delta.is_paused = fields.last_varint(PAUSED_FIELD).map(|v| v != 0);

        delta.battery = fields
            .last_bytes(BATTERY_FIELD)
            .and_then(|nested| FieldMap::parse(nested).last_varint(BATTERY_LEVEL_FIELD))
            .map(BatteryLevel::from_raw);

        if delta.is_on == Some(false) {
            delta.remaining_minutes = Some(0);
            delta.is_paused = Some(false);
        }

        delta
    }
}

fn millis_to_minutes(ms: u64) -> u32 {
    u32::try_from(ms / MILLIS_PER_MINUTE).unwrap_or(u32::MAX)
}

/// Decode the state carried by a notification, if it carries any
pub fn decode_state(notification: &[u8]) -> Option<StateDelta> {
    let fields = parse_nested(notification, RESPONSE_FIELD, STATE_RESPONSE_FIELD)?;
    Some(StateDelta::from_fields(
        &fields,
        Bytes::copy_from_slice(notification),
    ))
}

/// Last known state of a light
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub is_on: Option<bool>,
    /// Only known locally, from the last successful brightness command
    pub brightness: Option<Brightness>,
    /// Remaining time of the current dimming sequence
    pub remaining_minutes: Option<u32>,
    /// Total duration of the dimming sequence, as last configured
    pub configured_minutes: Option<u32>,
    pub is_paused: Option<bool>,
    pub battery: Option<BatteryLevel>,
    /// Last notification that carried state
    #[serde(serialize_with = "serialize_hex")]
    pub raw_state: Option<Bytes>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a decoded delta. Fields absent from the delta are left alone.
    pub fn apply(&mut self, delta: &StateDelta) {
        if let Some(on) = delta.is_on {
            self.is_on = Some(on);
        }
        if let Some(remaining) = delta.remaining_minutes {
            self.remaining_minutes = Some(remaining);
        }
        if let Some(configured) = delta.configured_minutes {
            self.configured_minutes = Some(configured);
        }
        if let Some(paused) = delta.is_paused {
            self.is_paused = Some(paused);
        }
        if let Some(battery) = delta.battery {
            self.battery = Some(battery);
        }
        self.raw_state = Some(delta.raw.clone());

        if self.is_on == Some(false) {
            self.remaining_minutes = Some(0);
            self.is_paused = Some(false);
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".to_string())
        }

        let power = match self.is_on {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        };
        write!(
            f,
            "power={} brightness={} remaining={}min configured={}min paused={} battery={}",
            power,
            opt(&self.brightness),
            opt(&self.remaining_minutes),
            opt(&self.configured_minutes),
            opt(&self.is_paused),
            opt(&self.battery),
        )
    }
}

fn serialize_hex<S: Serializer>(raw: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match raw {
        Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}
