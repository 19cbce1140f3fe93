//! Error types for the client connection layer.

use std::io;

use thiserror::Error;

/// Errors that can occur when decoding handshake structures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required field ran past the end of the frame.
    #[error("unexpected end of data while reading {field}")]
    UnexpectedEof {
        /// Name of the field being read.
        field: &'static str,
    },

    /// A length-prefixed field declared an impossible length.
    #[error("invalid length {len} for {field}")]
    InvalidLength {
        /// Name of the field being read.
        field: &'static str,
        /// Declared length.
        len: i32,
    },
}

/// Transport layer errors.
///
/// Every variant is fatal to the current connection: the driver tears the
/// socket down and picks the next endpoint. The transport never retries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Declared frame length outside `0..max`.
    #[error("packet len {len} is out of range (max {max})")]
    Framing {
        /// Length read from the prefix.
        len: i64,
        /// Configured exclusive upper bound.
        max: usize,
    },

    /// Required connect response field missing or malformed.
    #[error("handshake decode failed: {0}")]
    Handshake(#[from] DecodeError),

    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Connection attempt did not finish in time.
    #[error("connect timed out")]
    ConnectTimeout,

    /// Peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Operation requires an established socket.
    #[error("not connected")]
    NotConnected,

    /// The transport was closed and cannot be reused.
    #[error("transport is closed")]
    Closed,

    /// The connection driver rejected a callback.
    #[error("driver error: {0}")]
    Driver(String),
}

impl TransportError {
    /// Check if this error came from a bad length prefix.
    pub fn is_framing(&self) -> bool {
        matches!(self, TransportError::Framing { .. })
    }

    /// Check if the transport is gone for good (no reconnect possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Closed)
    }

    /// Check if this error means the remote side went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::ConnectionClosed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised at the host set boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostSetError {
    /// A membership list must contain at least one endpoint.
    #[error("membership list is empty")]
    EmptyMembership,

    /// None of the configured hosts resolved to an address.
    #[error("no address could be resolved from {0:?}")]
    Unresolvable(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_errors() {
        let err = TransportError::Framing { len: -1, max: 1024 };
        assert!(err.is_framing());
        assert!(!err.is_terminal());
        assert_eq!(err.to_string(), "packet len -1 is out of range (max 1024)");

        assert!(!TransportError::ConnectionClosed.is_framing());
    }

    #[test]
    fn test_disconnect_errors() {
        assert!(TransportError::ConnectionClosed.is_disconnect());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_disconnect());
        assert!(!TransportError::Io(io::Error::other("test")).is_disconnect());
        assert!(!TransportError::ConnectTimeout.is_disconnect());
    }

    #[test]
    fn test_handshake_error_wraps_decode() {
        let err: TransportError = DecodeError::UnexpectedEof { field: "sessionId" }.into();
        assert!(matches!(err, TransportError::Handshake(_)));
        assert!(err.to_string().contains("sessionId"));
    }

    #[test]
    fn test_terminal_errors() {
        assert!(TransportError::Closed.is_terminal());
        assert!(!TransportError::NotConnected.is_terminal());
    }
}
