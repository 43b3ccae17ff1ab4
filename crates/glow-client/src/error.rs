//! Client error types

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device not ready after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("command failed: {0}")]
    Command(String),

    #[error("protocol error: {0}")]
    Protocol(glow_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] glow_transport::TransportError),
}

impl From<glow_core::Error> for ClientError {
    fn from(e: glow_core::Error) -> Self {
        match e {
            glow_core::Error::InvalidArgument(msg) => ClientError::InvalidArgument(msg),
            other => ClientError::Protocol(other),
        }
    }
}
