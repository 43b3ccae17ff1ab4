//! Client configuration

use glow_core::{HANDSHAKE_TIMEOUT_SECS, STATE_RESPONSE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exchange timeouts
///
/// Serialized with durations in (fractional) seconds, so it can be read
/// straight from a `[session]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long to wait for the ready marker
    #[serde(rename = "handshake_timeout_secs", with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// How long a state query waits for a state notification
    #[serde(rename = "state_response_timeout_secs", with = "duration_secs")]
    pub state_response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            state_response_timeout: Duration::from_secs(STATE_RESPONSE_TIMEOUT_SECS),
        }
    }
}

mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid duration: {} seconds", secs)))
    }
}
