//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding hub request layouts
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Caller-supplied buffer cannot hold the structure
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The platform returned fewer bytes than the fixed header requires
    #[error("Short response: expected at least {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// Request code that is not one of the hub requests we issue
    #[error("Unknown hub request code: {0:#010x}")]
    UnknownIoctl(u32),

    /// I/O error while walking a byte cursor
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
