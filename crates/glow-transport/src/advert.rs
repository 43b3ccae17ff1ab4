//! Advertisement matching

use glow_core::{DEVICE_NAME_PREFIX, SERVICE_UUID};
use uuid::Uuid;

/// Whether an advertisement looks like a Glow light: it lists the Glow
/// service or its local name starts with the Glow prefix.
pub fn is_glow_advertisement(local_name: Option<&str>, services: &[Uuid]) -> bool {
    services.contains(&SERVICE_UUID)
        || local_name.is_some_and(|name| name.starts_with(DEVICE_NAME_PREFIX))
}
