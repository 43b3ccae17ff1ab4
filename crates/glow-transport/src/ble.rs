//! Bluetooth Low Energy backend built on btleplug
//!
//! Glow GATT layout:
//! - Service `9bb30001-…`: advertised, used for discovery only
//! - Write characteristic `9bb30002-…`: command and handshake packets
//! - Read characteristic `9bb30003-…`: notifications (handshake, state)

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advert::is_glow_advertisement;
use crate::error::{Result, TransportError};
use crate::traits::{Connection, Connector, NotificationReceiver, TransportEvent};

/// BLE backend configuration
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Scan duration in seconds
    pub scan_duration_secs: u64,
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    /// Delay before retry n is n times this
    pub retry_backoff: Duration,
    /// Write with response instead of without
    pub write_with_response: bool,
    /// Notification channel depth
    pub channel_capacity: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 10,
            connect_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            write_with_response: true,
            channel_capacity: 64,
        }
    }
}

/// Scans the first BLE adapter for Glow lights
pub struct BleScanner {
    config: BleConfig,
    adapter: Adapter,
}

impl BleScanner {
    /// Create a scanner on the first adapter
    pub async fn new() -> Result<Self> {
        Self::with_config(BleConfig::default()).await
    }

    /// Create with custom config
    pub async fn with_config(config: BleConfig) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("BLE manager error: {}", e)))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("No BLE adapters: {}", e)))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ConnectionFailed("No BLE adapter found".into()))?;

        info!("BLE adapter initialized");

        Ok(Self { config, adapter })
    }

    /// Scan for lights advertising the Glow service or name prefix
    pub async fn scan(&self) -> Result<Vec<DiscoveredGlow>> {
        info!(
            "Starting BLE scan for {} seconds",
            self.config.scan_duration_secs
        );

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Scan failed: {}", e)))?;

        tokio::time::sleep(Duration::from_secs(self.config.scan_duration_secs)).await;

        self.adapter
            .stop_scan()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Stop scan failed: {}", e)))?;

        let peripherals = self.adapter.peripherals().await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to get peripherals: {}", e))
        })?;

        let mut devices = Vec::new();

        for peripheral in peripherals {
            let props = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Skipping peripheral without properties: {}", e);
                    continue;
                }
            };

            if !is_glow_advertisement(props.local_name.as_deref(), &props.services) {
                continue;
            }

            devices.push(DiscoveredGlow {
                name: props.local_name.clone(),
                address: props.address.to_string(),
                rssi: props.rssi,
                peripheral,
            });
        }

        info!("Found {} Glow lights", devices.len());
        Ok(devices)
    }

    pub fn config(&self) -> &BleConfig {
        &self.config
    }
}

/// A light found during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredGlow {
    /// Advertised local name
    pub name: Option<String>,
    /// Device address
    pub address: String,
    /// Signal strength
    pub rssi: Option<i16>,
    peripheral: Peripheral,
}

impl DiscoveredGlow {
    /// Connector that opens connections to this light
    pub fn connector(&self, config: BleConfig) -> BleConnector {
        BleConnector {
            peripheral: self.peripheral.clone(),
            label: self.name.clone().unwrap_or_else(|| self.address.clone()),
            config,
        }
    }
}

/// Opens [`BleConnection`]s to one discovered light
pub struct BleConnector {
    peripheral: Peripheral,
    label: String,
    config: BleConfig,
}

impl BleConnector {
    /// A connection that has not been opened yet
    pub fn connection(&self) -> BleConnection {
        BleConnection {
            peripheral: self.peripheral.clone(),
            label: self.label.clone(),
            config: self.config.clone(),
            connected: Arc::new(Mutex::new(false)),
            subscriptions: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Connector for BleConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let connection = self.connection();
        Connection::connect(&connection).await?;
        Ok(Box::new(connection))
    }
}

/// GATT connection to one light
pub struct BleConnection {
    peripheral: Peripheral,
    label: String,
    config: BleConfig,
    connected: Arc<Mutex<bool>>,
    /// Latest subscription generation per characteristic
    subscriptions: Arc<tokio::sync::Mutex<HashMap<Uuid, u64>>>,
}

impl BleConnection {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    fn write_type(&self) -> WriteType {
        if self.config.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }
}

#[async_trait]
impl Connection for BleConnection {
    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn connect(&self) -> Result<()> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!("Connecting to {} (attempt {}/{})", self.label, attempt, attempts);

            match self.peripheral.connect().await {
                Ok(()) => {
                    self.peripheral.discover_services().await.map_err(|e| {
                        TransportError::ConnectionFailed(format!(
                            "Service discovery failed: {}",
                            e
                        ))
                    })?;
                    *self.connected.lock() = true;
                    info!("BLE connected to {}", self.label);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connect attempt {} to {} failed: {}", attempt, self.label, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }

        Err(TransportError::ConnectionFailed(format!(
            "{} after {} attempts: {}",
            self.label, attempts, last_error
        )))
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationReceiver> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let target = self.characteristic(characteristic)?;

        // Open the stream before subscribing so no early notification is lost
        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        let generation = {
            let mut subscriptions = self.subscriptions.lock().await;
            self.peripheral
                .subscribe(&target)
                .await
                .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
            let generation = subscriptions.entry(characteristic).or_insert(0);
            *generation += 1;
            *generation
        };

        let (tx, receiver) = NotificationReceiver::channel(self.config.channel_capacity);
        let connected = Arc::clone(&self.connected);
        let subscriptions = Arc::clone(&self.subscriptions);
        let peripheral = self.peripheral.clone();

        tokio::spawn(async move {
            match forward_notifications(notifications, characteristic, &tx).await {
                ForwardEnd::ReceiverClosed => {
                    // A newer subscribe on the same characteristic owns it now
                    let subscriptions = subscriptions.lock().await;
                    if subscriptions.get(&characteristic) != Some(&generation) {
                        return;
                    }
                    debug!("Receiver dropped, unsubscribing from {}", characteristic);
                    if let Err(e) = peripheral.unsubscribe(&target).await {
                        debug!("Unsubscribe from {} failed: {}", characteristic, e);
                    }
                }
                ForwardEnd::StreamEnded => {
                    *connected.lock() = false;
                    let _ = tx
                        .send(TransportEvent::Disconnected {
                            reason: Some("notification stream ended".into()),
                        })
                        .await;
                }
            }
        });

        debug!("Subscribed to {}", characteristic);
        Ok(receiver)
    }

    async fn write(&self, characteristic: Uuid, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let target = self.characteristic(characteristic)?;

        self.peripheral
            .write(&target, &data, self.write_type())
            .await
            .map_err(|e| TransportError::WriteFailed(format!("BLE write failed: {}", e)))?;

        debug!("BLE wrote {} bytes to {}", data.len(), characteristic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.connected.lock() = false;
        self.peripheral.disconnect().await.map_err(|e| {
            error!("Disconnect from {} failed: {}", self.label, e);
            TransportError::Other(format!("Disconnect failed: {}", e))
        })?;
        info!("Disconnected from {}", self.label);
        Ok(())
    }
}

/// Why a notification forwarder stopped
#[derive(Debug, PartialEq, Eq)]
enum ForwardEnd {
    /// The [`NotificationReceiver`] was dropped
    ReceiverClosed,
    /// The peripheral's notification stream ended
    StreamEnded,
}

/// Forward `characteristic` notifications into `tx` until either side ends
async fn forward_notifications<S>(
    mut notifications: S,
    characteristic: Uuid,
    tx: &mpsc::Sender<TransportEvent>,
) -> ForwardEnd
where
    S: Stream<Item = ValueNotification> + Unpin,
{
    loop {
        let data = tokio::select! {
            data = notifications.next() => data,
            _ = tx.closed() => return ForwardEnd::ReceiverClosed,
        };
        let Some(data) = data else {
            return ForwardEnd::StreamEnded;
        };

        if data.uuid != characteristic {
            continue;
        }
        debug!("BLE notification: {} bytes", data.value.len());
        if tx
            .send(TransportEvent::Data(Bytes::from(data.value)))
            .await
            .is_err()
        {
            return ForwardEnd::ReceiverClosed;
        }
    }
}
