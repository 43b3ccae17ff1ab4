//! Glow Client Library
//!
//! High-level async client for Casper Glow lights.
//!
//! # Example
//!
//! ```ignore
//! use glow_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let glow = Glow::builder().connector(connector).build()?;
//!
//!     glow.register_observer(|state| println!("{}", state));
//!
//!     glow.turn_on(Some(Brightness::Pct80)).await?;
//!     glow.set_dimming_time(DimmingTime::Min30).await?;
//!
//!     if let StateSnapshot::Fresh(state) = glow.query_state().await? {
//!         println!("battery: {:?}", state.battery);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod session;

pub use builder::GlowBuilder;
pub use client::{Glow, ObserverId, StateObserver, StateSnapshot};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::SessionState;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::GlowBuilder;
    pub use crate::client::{Glow, ObserverId, StateSnapshot};
    pub use crate::config::ClientConfig;
    pub use crate::error::{ClientError, Result};
    pub use glow_core::{BatteryLevel, Brightness, DeviceState, DimmingTime};
}
