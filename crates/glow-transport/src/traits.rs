//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Events delivered on a notification subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Notification payload
    Data(Bytes),
    /// Link dropped; no further events follow
    Disconnected { reason: Option<String> },
    /// Non-fatal error reported by the backend
    Error(String),
}

/// Receiving half of a notification subscription
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

impl NotificationReceiver {
    pub fn new(rx: mpsc::Receiver<TransportEvent>) -> Self {
        Self { rx }
    }

    /// Create a bounded channel whose receiving half is a `NotificationReceiver`
    pub fn channel(buffer: usize) -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    /// Receive the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// An open (or re-openable) link to one light
#[async_trait]
pub trait Connection: Send + Sync {
    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Re-establish the link if it dropped
    async fn connect(&self) -> Result<()>;

    /// Start notifications on `characteristic`
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationReceiver>;

    /// Write `data` to `characteristic`
    async fn write(&self, characteristic: Uuid, data: Bytes) -> Result<()>;

    /// Close the link
    async fn disconnect(&self) -> Result<()>;
}

/// Opens new connections to a light
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}
