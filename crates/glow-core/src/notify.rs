//! Notification classification
//!
//! During the handshake the device notifies a payload carrying the session
//! token in field 1 and the ready marker as a trailing length-delimited
//! field. State notifications may arrive interleaved with it.

use crate::fields::{Tag, WireType};
use crate::state::{decode_state, StateDelta};
use crate::varint;
use crate::READY_MARKER;

const TOKEN_FIELD: u32 = 1;

/// Whether the ready marker appears anywhere in `payload`
pub fn contains_ready_marker(payload: &[u8]) -> bool {
    payload
        .windows(READY_MARKER.len())
        .any(|window| window == READY_MARKER)
}

/// Extract the session token: the first varint field 1 in `payload`
///
/// Length-delimited fields before it are skipped. Gives up on truncated
/// input or on a wire type whose length cannot be known.
pub fn extract_session_token(payload: &[u8]) -> Option<u64> {
    let mut pos = 0;

    while pos < payload.len() {
        let (tag, next) = Tag::read(payload, pos).ok()??;

        match tag.wire_type()? {
            WireType::Varint => {
                let (value, next) = varint::decode(payload, next).ok()?;
                if tag.field == TOKEN_FIELD {
                    return Some(value);
                }
                pos = next;
            }
            WireType::LengthDelimited => {
                let (len, start) = varint::decode(payload, next).ok()?;
                pos = usize::try_from(len).ok()?.checked_add(start)?;
            }
        }
    }

    None
}

/// Handshake status carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No ready marker
    NotReady,
    /// Ready marker with a usable session token
    Token(u64),
    /// Ready marker present but no token could be extracted
    MarkerWithoutToken,
}

/// Everything the client needs to know about one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub state: Option<StateDelta>,
    pub ready: Readiness,
}

impl Notification {
    /// Classify a raw notification payload. Never fails.
    pub fn inspect(payload: &[u8]) -> Self {
        let state = decode_state(payload);
        let ready = if contains_ready_marker(payload) {
            match extract_session_token(payload) {
                Some(token) => Readiness::Token(token),
                None => Readiness::MarkerWithoutToken,
            }
        } else {
            Readiness::NotReady
        };

        Self { state, ready }
    }
}
