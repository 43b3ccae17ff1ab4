//! Common test helpers for Glow tests
//!
//! This crate provides:
//! - A scripted in-memory light ([`MockDevice`]) behind the transport traits
//! - Builders for handshake and state notifications
//! - Write/connect/disconnect bookkeeping for assertions

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use glow_core::fields::{put_bytes_field, put_varint_field};
use glow_core::{action, FieldMap, READY_MARKER, RECONNECT_PACKET, WRITE_CHAR_UUID};
use glow_transport::{
    Connection, Connector, NotificationReceiver, Result, TransportError, TransportEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Notification builders
// ============================================================================

/// Handshake-ready notification: `08 <token>` followed by the ready marker
pub fn ready_notification(token: u64) -> Bytes {
    let mut buf = BytesMut::new();
    put_varint_field(&mut buf, 1, token);
    buf.extend_from_slice(READY_MARKER);
    buf.freeze()
}

/// Contents of a synthetic state notification
#[derive(Debug, Clone, Default)]
pub struct StateReport {
    /// Raw power indicator (1 = on, 3 = off)
    pub power: Option<u64>,
    pub remaining_ms: Option<u64>,
    pub configured_ms: Option<u64>,
    pub paused: Option<u64>,
    /// Raw battery level (3..=6)
    pub battery: Option<u64>,
}

impl StateReport {
    pub fn on(remaining_ms: u64, configured_ms: u64) -> Self {
        Self {
            power: Some(1),
            remaining_ms: Some(remaining_ms),
            configured_ms: Some(configured_ms),
            paused: Some(0),
            battery: Some(6),
        }
    }

    pub fn off() -> Self {
        Self {
            power: Some(3),
            remaining_ms: Some(0),
            configured_ms: Some(0),
            paused: Some(0),
            battery: Some(6),
        }
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = Some(u64::from(paused));
        self
    }

    pub fn battery(mut self, raw: u64) -> Self {
        self.battery = Some(raw);
        self
    }

    /// Encode as `08 <token> 22 <len> 9a 01 <len> <sub-fields>`
    pub fn encode(&self, token: u64) -> Bytes {
        let mut inner = BytesMut::new();
        if let Some(v) = self.power {
            put_varint_field(&mut inner, 1, v);
        }
        if let Some(v) = self.remaining_ms {
            put_varint_field(&mut inner, 2, v);
        }
        if let Some(v) = self.configured_ms {
            put_varint_field(&mut inner, 3, v);
        }
        if let Some(v) = self.paused {
            put_varint_field(&mut inner, 4, v);
        }
        if let Some(v) = self.battery {
            let mut battery = BytesMut::new();
            put_varint_field(&mut battery, 1, 0);
            put_varint_field(&mut battery, 2, v);
            put_bytes_field(&mut inner, 7, &battery);
        }
        put_varint_field(&mut inner, 8, 100);

        let mut envelope = BytesMut::new();
        put_bytes_field(&mut envelope, 19, &inner);

        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 1, token);
        put_bytes_field(&mut buf, 4, &envelope);
        buf.freeze()
    }
}

// ============================================================================
// Mock device
// ============================================================================

/// How the mock answers the reconnect packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    /// Ready marker with this token
    Token(u64),
    /// Ready marker without a field-1 token
    MarkerOnly,
    /// Never answer
    Silent,
    /// Drop the link instead of answering
    Hangup,
}

struct Script {
    handshake: HandshakeReply,
    before_ready: Vec<Bytes>,
    state_reply: Option<Bytes>,
    after_command: Vec<Bytes>,
    fail_connect: bool,
    fail_commands: bool,
}

struct Shared {
    script: Mutex<Script>,
    writes: Mutex<Vec<(Uuid, Bytes)>>,
    subscriptions: Mutex<Vec<Uuid>>,
    subscribers: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    connected: AtomicBool,
    connects: AtomicU32,
    disconnects: AtomicU32,
}

/// Scripted in-memory light
///
/// Answers the reconnect packet per its [`HandshakeReply`] and, when
/// configured, answers a state query with a state notification. Every
/// connection and connector made from one device shares its bookkeeping.
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockDevice {
    /// A light that hands out `token` and starts disconnected
    pub fn new(token: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                script: Mutex::new(Script {
                    handshake: HandshakeReply::Token(token),
                    before_ready: Vec::new(),
                    state_reply: None,
                    after_command: Vec::new(),
                    fail_connect: false,
                    fail_commands: false,
                }),
                writes: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
                connects: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }),
        }
    }

    pub fn with_handshake(self, reply: HandshakeReply) -> Self {
        self.shared.script.lock().handshake = reply;
        self
    }

    /// Notify `payload` right before the ready notification
    pub fn with_notification_before_ready(self, payload: Bytes) -> Self {
        self.shared.script.lock().before_ready.push(payload);
        self
    }

    /// Answer a state query with `payload`
    pub fn with_state_reply(self, payload: Bytes) -> Self {
        self.shared.script.lock().state_reply = Some(payload);
        self
    }

    /// Notify `payload` after every command write
    pub fn with_notification_after_command(self, payload: Bytes) -> Self {
        self.shared.script.lock().after_command.push(payload);
        self
    }

    /// Make every connect attempt fail
    pub fn failing_connect(self) -> Self {
        self.shared.script.lock().fail_connect = true;
        self
    }

    /// Make every command write fail (the reconnect packet still goes through)
    pub fn failing_commands(self) -> Self {
        self.shared.script.lock().fail_commands = true;
        self
    }

    /// A connection that is already open
    pub fn connected(self) -> Self {
        self.shared.connected.store(true, Ordering::SeqCst);
        self
    }

    pub fn connection(&self) -> MockConnection {
        MockConnection {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Every write, in order
    pub fn writes(&self) -> Vec<(Uuid, Bytes)> {
        self.shared.writes.lock().clone()
    }

    /// Writes other than the reconnect packet
    pub fn command_writes(&self) -> Vec<Bytes> {
        self.shared
            .writes
            .lock()
            .iter()
            .filter(|(_, data)| data.as_ref() != RECONNECT_PACKET)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<Uuid> {
        self.shared.subscriptions.lock().clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.shared.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Shared {
    fn notify(&self, payload: Bytes) {
        for tx in self.subscribers.lock().iter() {
            let _ = tx.try_send(TransportEvent::Data(payload.clone()));
        }
    }

    fn hang_up(&self) {
        self.connected.store(false, Ordering::SeqCst);
        for tx in self.subscribers.lock().drain(..) {
            let _ = tx.try_send(TransportEvent::Disconnected {
                reason: Some("peer hung up".into()),
            });
        }
    }

    fn respond(&self, data: &Bytes) -> Result<()> {
        let script = self.script.lock();

        if data.as_ref() == RECONNECT_PACKET {
            for payload in &script.before_ready {
                self.notify(payload.clone());
            }
            match &script.handshake {
                HandshakeReply::Token(token) => self.notify(ready_notification(*token)),
                HandshakeReply::MarkerOnly => self.notify(Bytes::from_static(READY_MARKER)),
                HandshakeReply::Silent => {}
                HandshakeReply::Hangup => self.hang_up(),
            }
            return Ok(());
        }

        if script.fail_commands {
            return Err(TransportError::WriteFailed("scripted failure".into()));
        }

        let fields = FieldMap::parse(data);
        let is_query = fields
            .last_bytes(4)
            .is_some_and(|body| body.as_ref() == action::QUERY_STATE);

        if is_query {
            if let Some(reply) = &script.state_reply {
                self.notify(reply.clone());
            }
        }
        for payload in &script.after_command {
            self.notify(payload.clone());
        }
        Ok(())
    }
}

/// Connection half of a [`MockDevice`]
#[derive(Clone)]
pub struct MockConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for MockConnection {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        if self.shared.script.lock().fail_connect {
            return Err(TransportError::ConnectionFailed("scripted failure".into()));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationReceiver> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = NotificationReceiver::channel(CHANNEL_CAPACITY);
        self.shared.subscriptions.lock().push(characteristic);
        self.shared.subscribers.lock().push(tx);
        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if characteristic != WRITE_CHAR_UUID {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        self.shared.writes.lock().push((characteristic, data.clone()));
        self.shared.respond(&data)
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.disconnects.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.subscribers.lock().clear();
        Ok(())
    }
}

/// Connector half of a [`MockDevice`]
pub struct MockConnector {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let connection = MockConnection {
            shared: Arc::clone(&self.shared),
        };
        Connection::connect(&connection).await?;
        Ok(Box::new(connection))
    }
}
