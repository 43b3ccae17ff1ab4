//! Glow Core
//!
//! Wire codec and protocol primitives for Casper Glow BLE lights.
//!
//! This crate provides:
//! - Base-128 varint encoding/decoding ([`varint`])
//! - A tolerant protobuf-like field parser ([`FieldMap`], [`fields`])
//! - Handshake notification classification ([`notify`])
//! - State notification decoding ([`StateDelta`], [`DeviceState`])
//! - Command packet construction ([`packet`], [`Action`])
//!
//! Nothing in here performs I/O. Decoders over notification bytes never fail;
//! malformed input degrades to partial or absent results.

pub mod action;
pub mod error;
pub mod fields;
pub mod notify;
pub mod packet;
pub mod state;
pub mod varint;

pub use action::{Action, ActionBody, Brightness, DimmingTime};
pub use error::{Error, Result};
pub use fields::{parse_fields, parse_nested, FieldMap, FieldValue, WireType};
pub use notify::{contains_ready_marker, extract_session_token, Notification, Readiness};
pub use packet::{build_action_packet, build_brightness_body};
pub use state::{decode_state, BatteryLevel, DeviceState, StateDelta};

use uuid::Uuid;

/// GATT service advertised by Glow lights (used for discovery only)
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x9bb30001_fee9_4c24_8361_443b5b7c88f6);

/// Characteristic commands are written to
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x9bb30002_fee9_4c24_8361_443b5b7c88f6);

/// Characteristic the device notifies handshake and state on
pub const READ_CHAR_UUID: Uuid = Uuid::from_u128(0x9bb30003_fee9_4c24_8361_443b5b7c88f6);

/// Advertised local name prefix
pub const DEVICE_NAME_PREFIX: &str = "Jar";

/// Fixed packet that opens a session
pub const RECONNECT_PACKET: &[u8] = &[0x08, 0x01, 0x22, 0x02, 0x6a, 0x00];

/// Byte sequence signalling the device is ready for a command
pub const READY_MARKER: &[u8] = &[0x72, 0x02, 0x08, 0x00];

/// Default time to wait for the ready marker (seconds)
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default time to wait for a state response after a query (seconds)
pub const STATE_RESPONSE_TIMEOUT_SECS: u64 = 5;

/// Outer notification field that carries a response envelope
pub const RESPONSE_FIELD: u32 = 4;

/// Field inside the response envelope that carries device state
pub const STATE_RESPONSE_FIELD: u32 = 19;
