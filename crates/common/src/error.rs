//! Common error types

use crate::platform::InterfaceClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Device snapshot for {class} interfaces unavailable: {reason}")]
    SnapshotUnavailable {
        class: InterfaceClass,
        reason: String,
    },

    #[error("Control channel {path} unavailable: {reason}")]
    ChannelUnavailable { path: String, reason: String },

    #[error("Control request failed: {0}")]
    Request(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_unavailable_display() {
        let err = Error::SnapshotUnavailable {
            class: InterfaceClass::Hub,
            reason: "access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Device snapshot for hub interfaces unavailable: access denied"
        );
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: Error = protocol::ProtocolError::UnknownIoctl(1).into();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
