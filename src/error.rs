//! Client error types.
//!
//! [`ClientError`] is only returned from [`crate::ws::RealtimeConnection::connect`]
//! and configuration loading. Every other failure is reported to listeners
//! as an `error` or `disconnected` event.

use std::time::Duration;

/// Errors surfaced by the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `connect` was called while a socket is open or a handshake is in
    /// flight.
    #[error("connection is already open or connecting")]
    AlreadyActive,

    /// The transport failed to complete the WebSocket handshake.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not finish within the configured timeout.
    #[error("websocket handshake timed out after {} ms", .0.as_millis())]
    HandshakeTimeout(Duration),

    /// `disconnect` was called before the handshake completed.
    #[error("connection closed before the handshake completed")]
    Aborted,

    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns `true` for failures of the transport itself, as opposed to
    /// caller misuse or bad configuration.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::HandshakeTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            ClientError::Handshake("connection refused".into()).to_string(),
            "websocket handshake failed: connection refused"
        );
        assert_eq!(
            ClientError::HandshakeTimeout(Duration::from_secs(2)).to_string(),
            "websocket handshake timed out after 2000 ms"
        );
    }

    #[test]
    fn transport_classification() {
        assert!(ClientError::Handshake(String::new()).is_transport());
        assert!(ClientError::HandshakeTimeout(Duration::ZERO).is_transport());
        assert!(!ClientError::AlreadyActive.is_transport());
        assert!(!ClientError::Aborted.is_transport());
        assert!(!ClientError::Config(String::new()).is_transport());
    }
}
