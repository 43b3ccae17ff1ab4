//! Transport error types

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("transport error: {0}")]
    Other(String),
}
