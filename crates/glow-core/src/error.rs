//! Error types for Glow

use thiserror::Error;

/// Result type alias for Glow protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Glow protocol error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer ended before a varint or length-delimited value was complete
    #[error("truncated input at offset {offset}")]
    Truncated { offset: usize },

    /// Varint does not fit in 64 bits
    #[error("varint overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    /// Caller supplied a value outside the accepted set
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
