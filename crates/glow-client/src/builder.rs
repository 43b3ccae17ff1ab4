//! Client builder pattern

use glow_transport::{Connection, Connector};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::Glow;

/// Builder for the Glow client
pub struct GlowBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    connection: Option<Arc<dyn Connection>>,
}

impl GlowBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            connector: None,
            connection: None,
        }
    }

    /// Open a new connection through `connector` for each exchange
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Run exchanges on an existing connection and leave it open
    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Replace all timeouts at once
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how long to wait for the ready marker
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set how long a state query waits for the device's report
    pub fn state_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.state_response_timeout = timeout;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Glow> {
        if self.connector.is_none() && self.connection.is_none() {
            return Err(ClientError::InvalidArgument(
                "a connector or a connection is required".into(),
            ));
        }
        if self.config.handshake_timeout.is_zero() {
            return Err(ClientError::InvalidArgument(
                "handshake timeout must be positive".into(),
            ));
        }

        Ok(Glow::new(self.config, self.connector, self.connection))
    }
}

impl Default for GlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
