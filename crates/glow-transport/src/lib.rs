//! Glow Transport Layer
//!
//! Connection abstractions used by the Glow client:
//! - [`Connector`] opens a new link to one light
//! - [`Connection`] writes characteristics and delivers notifications
//! - BLE backend built on btleplug (feature `ble`)

pub mod advert;
pub mod error;
pub mod traits;

#[cfg(feature = "ble")]
pub mod ble;

pub use advert::is_glow_advertisement;
pub use error::{Result, TransportError};
pub use traits::{Connection, Connector, NotificationReceiver, TransportEvent};

#[cfg(feature = "ble")]
pub use ble::{BleConfig, BleConnection, BleConnector, BleScanner, DiscoveredGlow};
