//! Channel Error Types
//!
//! Error taxonomy for transport, framing and delivery operations.

use thiserror::Error;

use crate::store::StoreError;

/// Channel and transport error types.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// A frame declared a length over the limit, or a header/payload read
    /// came up short.
    #[error("Wrong data length: {length} bytes")]
    WrongDataLength { length: usize },

    /// Mid-stream I/O failure on an established connection.
    #[error("Lost connection: {0}")]
    LostConnection(String),

    /// Write-path failure not classified as connection loss.
    #[error("Send failed: {0}")]
    SendDataError(String),

    /// Unknown command byte on the wire.
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// A local timer closed the socket.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No confirmation arrived for the login frame.
    #[error("Login confirmation timed out")]
    LoginTimeout,

    /// Spool or duplicate-filter persistence failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ChannelError {
    /// True for errors that tear down the current connection.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::ConnectionFailure(_)
                | ChannelError::WrongDataLength { .. }
                | ChannelError::LostConnection(_)
                | ChannelError::CommandNotSupported(_)
                | ChannelError::ConnectionClosed
                | ChannelError::LoginTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let errors = vec![
            (
                ChannelError::ConnectionFailure("refused".into()),
                "Connection failed: refused",
            ),
            (
                ChannelError::WrongDataLength { length: 16_000_001 },
                "Wrong data length: 16000001 bytes",
            ),
            (ChannelError::ConnectionClosed, "Connection closed"),
            (
                ChannelError::CommandNotSupported(9),
                "Command not supported: 9",
            ),
            (ChannelError::LoginTimeout, "Login confirmation timed out"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(ChannelError::LostConnection("reset".into()).is_connection_fatal());
        assert!(ChannelError::WrongDataLength { length: 0 }.is_connection_fatal());
        assert!(ChannelError::CommandNotSupported(42).is_connection_fatal());
        assert!(!ChannelError::SendDataError("busy".into()).is_connection_fatal());
    }
}
