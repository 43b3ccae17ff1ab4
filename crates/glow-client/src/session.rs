//! One request/response exchange with a light
//!
//! Every operation runs the same sequence on a fresh session:
//!
//! ```text
//! Idle -> Connecting -> AwaitingReady -> ReadyTokenKnown -> CommandSent
//!      -> [AwaitingStateResponse] -> Disconnecting -> Idle
//! ```
//!
//! The session token is only valid for the connection it was issued on, so
//! it is never cached between exchanges.

use bytes::Bytes;
use glow_core::{
    build_action_packet, decode_state, Action, ActionBody, DeviceState, Notification, Readiness,
    READ_CHAR_UUID, RECONNECT_PACKET, WRITE_CHAR_UUID,
};
use glow_transport::{Connection, NotificationReceiver, TransportError, TransportEvent};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Where an exchange is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingReady,
    ReadyTokenKnown,
    CommandSent,
    AwaitingStateResponse,
    Disconnecting,
}

/// The connection an exchange runs on
pub(crate) enum Link {
    /// Supplied by the caller; left open afterwards
    External(Arc<dyn Connection>),
    /// Opened for this exchange; closed afterwards
    Owned(Box<dyn Connection>),
}

impl Link {
    fn connection(&self) -> &dyn Connection {
        match self {
            Link::External(conn) => conn.as_ref(),
            Link::Owned(conn) => conn.as_ref(),
        }
    }
}

/// What an exchange does once the device is ready
#[derive(Debug, Clone)]
pub(crate) enum Request {
    /// Nothing; only proves the device answers
    Handshake,
    /// Write one command
    Command(ActionBody),
    /// Write the state query and wait for a state notification
    Query,
}

/// Result of a successful exchange
#[derive(Debug)]
pub(crate) struct Outcome {
    /// Device state with every notification of the exchange applied
    pub state: DeviceState,
    /// Whether a query got its state response in time
    pub fresh: bool,
}

pub(crate) struct Exchange<'a> {
    link: Link,
    config: &'a ClientConfig,
    state: SessionState,
    /// Every state this exchange passed through, for diagnostics
    path: Vec<SessionState>,
    staged: DeviceState,
    notifications: Option<NotificationReceiver>,
}

impl<'a> Exchange<'a> {
    /// Staged state starts from `base` and is only handed back on success
    pub(crate) fn new(link: Link, config: &'a ClientConfig, base: DeviceState) -> Self {
        Self {
            link,
            config,
            state: SessionState::Idle,
            path: vec![SessionState::Idle],
            staged: base,
            notifications: None,
        }
    }

    /// Run `request` to completion. The link is released before returning.
    pub(crate) async fn run(mut self, request: Request) -> Result<Outcome> {
        let result = self.drive(&request).await;
        self.close().await;

        let fresh = result?;
        Ok(Outcome {
            state: self.staged,
            fresh,
        })
    }

    fn transition(&mut self, next: SessionState) {
        trace!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
        self.path.push(next);
    }

    async fn drive(&mut self, request: &Request) -> Result<bool> {
        self.open().await?;
        let token = self.await_ready().await?;

        match request {
            Request::Handshake => Ok(false),
            Request::Command(body) => {
                self.send(token, body).await?;
                Ok(false)
            }
            Request::Query => {
                self.send(token, &Action::QueryState.body()).await?;
                Ok(self.await_state().await)
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        self.transition(SessionState::Connecting);

        let conn = self.link.connection();
        if !conn.is_connected() {
            debug!("Connection idle, reconnecting");
            conn.connect().await?;
        }

        let notifications = conn.subscribe(READ_CHAR_UUID).await?;
        self.notifications = Some(notifications);

        self.transition(SessionState::AwaitingReady);
        self.link
            .connection()
            .write(WRITE_CHAR_UUID, Bytes::from_static(RECONNECT_PACKET))
            .await?;
        Ok(())
    }

    async fn await_ready(&mut self) -> Result<u64> {
        let limit = self.config.handshake_timeout;
        let waited = timeout(limit, self.next_ready()).await;
        match waited {
            Ok(result) => {
                let token = result?;
                self.transition(SessionState::ReadyTokenKnown);
                debug!("Device ready, session token {}", token);
                Ok(token)
            }
            Err(_) => {
                warn!("No ready marker within {:?}", limit);
                Err(ClientError::HandshakeTimeout(limit))
            }
        }
    }

    async fn next_ready(&mut self) -> Result<u64> {
        loop {
            let payload = self.next_payload().await?;
            let notification = Notification::inspect(&payload);

            if let Some(delta) = &notification.state {
                self.staged.apply(delta);
            }

            match notification.ready {
                Readiness::Token(token) => return Ok(token),
                Readiness::MarkerWithoutToken => {
                    return Err(ClientError::Command(
                        "ready marker received without a session token".into(),
                    ));
                }
                Readiness::NotReady => trace!("Notification before ready: {} bytes", payload.len()),
            }
        }
    }

    /// Next data payload; a closed stream is a closed connection
    async fn next_payload(&mut self) -> Result<Bytes> {
        let notifications = self
            .notifications
            .as_mut()
            .ok_or(TransportError::NotConnected)?;

        loop {
            match notifications.recv().await {
                Some(TransportEvent::Data(payload)) => return Ok(payload),
                Some(TransportEvent::Error(e)) => warn!("Transport error during exchange: {}", e),
                Some(TransportEvent::Disconnected { reason }) => {
                    debug!("Disconnected during exchange: {:?}", reason);
                    return Err(TransportError::ConnectionClosed.into());
                }
                None => return Err(TransportError::ConnectionClosed.into()),
            }
        }
    }

    async fn send(&mut self, token: u64, body: &ActionBody) -> Result<()> {
        let packet = build_action_packet(token, body);
        debug!("Writing command packet ({} bytes)", packet.len());
        self.link
            .connection()
            .write(WRITE_CHAR_UUID, packet)
            .await?;
        self.transition(SessionState::CommandSent);
        Ok(())
    }

    /// Wait for a state notification. `false` if none arrived in time.
    async fn await_state(&mut self) -> bool {
        self.transition(SessionState::AwaitingStateResponse);
        let limit = self.config.state_response_timeout;

        let waited = timeout(limit, self.next_state()).await;
        match waited {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("State response not received: {}", e);
                false
            }
            Err(_) => {
                warn!("No state response within {:?}; keeping cached state", limit);
                false
            }
        }
    }

    async fn next_state(&mut self) -> Result<()> {
        loop {
            let payload = self.next_payload().await?;
            if let Some(delta) = decode_state(&payload) {
                self.staged.apply(&delta);
                return Ok(());
            }
        }
    }

    async fn close(&mut self) {
        self.transition(SessionState::Disconnecting);
        self.notifications = None;

        if let Link::Owned(conn) = &self.link {
            if let Err(e) = conn.disconnect().await {
                warn!("Error while disconnecting: {}", e);
            }
        }

        self.transition(SessionState::Idle);
        debug!("Session path: {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_test_utils::{HandshakeReply, MockDevice, StateReport};
    use std::time::Duration;
    use SessionState::*;

    const TOKEN: u64 = 7;

    fn config() -> ClientConfig {
        ClientConfig {
            handshake_timeout: Duration::from_millis(100),
            state_response_timeout: Duration::from_millis(100),
        }
    }

    async fn path_of(device: &MockDevice, request: Request) -> (Result<bool>, Vec<SessionState>) {
        let config = config();
        let link = Link::Owned(Box::new(device.connection()));
        let mut exchange = Exchange::new(link, &config, DeviceState::new());

        let result = exchange.drive(&request).await;
        exchange.close().await;
        (result, exchange.path)
    }

    #[tokio::test]
    async fn test_command_path() {
        let device = MockDevice::new(TOKEN);
        let (result, path) = path_of(&device, Request::Command(Action::TurnOn.body())).await;

        assert!(!result.unwrap());
        assert_eq!(
            path,
            [Idle, Connecting, AwaitingReady, ReadyTokenKnown, CommandSent, Disconnecting, Idle]
        );
    }

    #[tokio::test]
    async fn test_query_path_waits_for_state() {
        let device = MockDevice::new(TOKEN).with_state_reply(StateReport::off().encode(TOKEN));
        let (result, path) = path_of(&device, Request::Query).await;

        assert!(result.unwrap());
        assert_eq!(
            path,
            [
                Idle,
                Connecting,
                AwaitingReady,
                ReadyTokenKnown,
                CommandSent,
                AwaitingStateResponse,
                Disconnecting,
                Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_handshake_timeout_path_still_disconnects() {
        let device = MockDevice::new(TOKEN).with_handshake(HandshakeReply::Silent);
        let (result, path) = path_of(&device, Request::Handshake).await;

        assert!(matches!(result, Err(ClientError::HandshakeTimeout(_))));
        assert_eq!(path, [Idle, Connecting, AwaitingReady, Disconnecting, Idle]);
        assert_eq!(device.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_handshake_path_sends_nothing() {
        let device = MockDevice::new(TOKEN);
        let (result, path) = path_of(&device, Request::Handshake).await;

        assert!(!result.unwrap());
        assert_eq!(
            path,
            [Idle, Connecting, AwaitingReady, ReadyTokenKnown, Disconnecting, Idle]
        );
        assert!(device.command_writes().is_empty());
    }
}
