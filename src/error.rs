//! Connection-level error taxonomy.
//!
//! Every error surfaced by a connection carries exactly one [`ErrorClass`]:
//!
//! - [`ErrorClass::Transport`]: the byte stream failed, was reset, or the peer stopped sending
//!   heartbeats.
//! - [`ErrorClass::Protocol`]: the peer sent bytes that violate the frame grammar or the
//!   command protocol, or a local handler refused the request.
//! - [`ErrorClass::Application`]: the peer sent a well-formed `ERROR` frame.
//!
//! Consumers branch on [`ConnectionError::class`] or [`ConnectionError::kind`]
//! rather than on the rendered message.

use std::{fmt, io};

use thiserror::Error;

use crate::codec::FrameError;

/// Result alias used throughout the crate.
pub type Result<T, E = ConnectionError> = std::result::Result<T, E>;

/// Mutually exclusive classification of a [`ConnectionError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Underlying byte-stream failure, reset, or heartbeat timeout.
    Transport,
    /// Malformed frame, command-protocol violation, or a request refused by
    /// a local handler.
    Protocol,
    /// The peer explicitly reported an error with an `ERROR` frame.
    Application,
}

impl ErrorClass {
    /// Lowercase label used for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Application => "application",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Fine-grained error identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport read or write failed.
    Io,
    /// The write side of the transport is already finished.
    StreamClosed,
    /// The connection ended while the operation was outstanding.
    StreamEnded,
    /// An outbound body was abandoned before its frame was ended.
    IncompleteBody,
    /// No bytes arrived within the negotiated heartbeat window.
    ConnectionTimedOut,
    /// The handshake did not complete within the configured timeout.
    ConnectTimedOut,
    /// A frame violated the wire grammar.
    Frame,
    /// No handler is registered for an inbound command.
    UnknownCommand,
    /// A `RECEIPT` frame did not match an outstanding request.
    InvalidReceipt,
    /// The peers share no protocol version.
    UnsupportedVersion,
    /// A required header is absent.
    MissingHeader,
    /// A header is present but its value cannot be interpreted.
    InvalidHeader,
    /// The peer sent an `ERROR` frame.
    ErrorFrame,
    /// A local handler rejected the request.
    Rejected,
}

/// Error raised by a connection or one of its operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Transport I/O failure.
    #[error("transport error: {0}")]
    Io(#[source] io::Error),

    /// Write attempted after the transport was finished.
    #[error("stream closed for writing")]
    StreamClosed,

    /// The connection ended while this operation was pending.
    #[error("stream ended")]
    StreamEnded,

    /// A [`BodyWriter`](crate::BodyWriter) was dropped mid-frame. The
    /// partial frame cannot be terminated, so the stream is unusable.
    #[error("outbound frame body dropped before it was ended")]
    IncompleteBody,

    /// The peer stopped sending data within the heartbeat window.
    #[error("connection timed out: no data received for {elapsed_ms} ms")]
    ConnectionTimedOut {
        /// Length of the silent window that triggered the timeout.
        elapsed_ms: u64,
    },

    /// The CONNECT/CONNECTED handshake timed out.
    #[error("connect handshake timed out")]
    ConnectTimedOut,

    /// Malformed frame.
    #[error("protocol error: {0}")]
    Frame(#[source] FrameError),

    /// Inbound command with no registered handler.
    #[error("unknown command: {command}")]
    UnknownCommand {
        /// Command token that was not recognised.
        command: String,
    },

    /// `RECEIPT` frame referencing no outstanding request.
    #[error("invalid receipt: {receipt_id}")]
    InvalidReceipt {
        /// Receipt id carried by the offending frame.
        receipt_id: String,
    },

    /// No common protocol version.
    #[error("unsupported protocol version: {requested}")]
    UnsupportedVersion {
        /// Version list or identifier offered by the peer.
        requested: String,
    },

    /// Required header missing.
    #[error("missing header: {name}")]
    MissingHeader {
        /// Header name.
        name: &'static str,
    },

    /// Header present with a value that cannot be interpreted.
    #[error("invalid header: {name}:{value}")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// Offending value as received.
        value: String,
    },

    /// The peer sent an `ERROR` frame.
    #[error("peer error: {message}")]
    ErrorFrame {
        /// Contents of the `message` header.
        message: String,
        /// Frame body decoded as text, if any.
        details: String,
    },

    /// A local command handler refused the request or panicked.
    ///
    /// Classified as [`ErrorClass::Protocol`]: the peer's request was not
    /// acceptable, but no `ERROR` frame was received.
    #[error("request rejected: {message}")]
    Rejected {
        /// Reason reported to the peer.
        message: String,
    },
}

impl ConnectionError {
    /// Return the error classification.
    ///
    /// # Examples
    ///
    /// ```
    /// use stompwire::{ConnectionError, ErrorClass};
    ///
    /// let err = ConnectionError::UnknownCommand {
    ///     command: "FOO".into(),
    /// };
    /// assert_eq!(err.class(), ErrorClass::Protocol);
    /// ```
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_)
            | Self::StreamClosed
            | Self::StreamEnded
            | Self::IncompleteBody
            | Self::ConnectionTimedOut { .. }
            | Self::ConnectTimedOut => ErrorClass::Transport,
            Self::Frame(FrameError::Io(_)) => ErrorClass::Transport,
            Self::Frame(_)
            | Self::UnknownCommand { .. }
            | Self::InvalidReceipt { .. }
            | Self::UnsupportedVersion { .. }
            | Self::MissingHeader { .. }
            | Self::InvalidHeader { .. }
            | Self::Rejected { .. } => ErrorClass::Protocol,
            Self::ErrorFrame { .. } => ErrorClass::Application,
        }
    }

    /// Return the fine-grained error identity.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Frame(FrameError::Io(_)) => ErrorKind::Io,
            Self::StreamClosed => ErrorKind::StreamClosed,
            Self::StreamEnded => ErrorKind::StreamEnded,
            Self::IncompleteBody => ErrorKind::IncompleteBody,
            Self::ConnectionTimedOut { .. } => ErrorKind::ConnectionTimedOut,
            Self::ConnectTimedOut => ErrorKind::ConnectTimedOut,
            Self::Frame(_) => ErrorKind::Frame,
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::InvalidReceipt { .. } => ErrorKind::InvalidReceipt,
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::MissingHeader { .. } => ErrorKind::MissingHeader,
            Self::InvalidHeader { .. } => ErrorKind::InvalidHeader,
            Self::ErrorFrame { .. } => ErrorKind::ErrorFrame,
            Self::Rejected { .. } => ErrorKind::Rejected,
        }
    }

    /// Return the codec error if this is a frame grammar violation.
    #[must_use]
    pub fn frame_error(&self) -> Option<&FrameError> {
        match self {
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }

    /// Build a rejection reported back to the peer as an `ERROR` frame.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns true for transport-class errors.
    #[must_use]
    pub fn is_transport(&self) -> bool { self.class() == ErrorClass::Transport }

    /// Returns true for protocol-class errors.
    #[must_use]
    pub fn is_protocol(&self) -> bool { self.class() == ErrorClass::Protocol }

    /// Returns true for application-class errors.
    #[must_use]
    pub fn is_application(&self) -> bool { self.class() == ErrorClass::Application }
}

impl From<FrameError> for ConnectionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::Io(e),
            other => Self::Frame(other),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self { Self::Io(err) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::io(ConnectionError::Io(io::Error::other("reset")), ErrorClass::Transport)]
    #[case::closed(ConnectionError::StreamClosed, ErrorClass::Transport)]
    #[case::timeout(ConnectionError::ConnectionTimedOut { elapsed_ms: 10 }, ErrorClass::Transport)]
    #[case::line(ConnectionError::Frame(FrameError::LineTooLong { max: 2 }), ErrorClass::Protocol)]
    #[case::receipt(
        ConnectionError::InvalidReceipt { receipt_id: "9".into() },
        ErrorClass::Protocol
    )]
    #[case::rejected(ConnectionError::rejected("no"), ErrorClass::Protocol)]
    #[case::invalid_header(
        ConnectionError::InvalidHeader { name: "ack", value: "sometimes".into() },
        ErrorClass::Protocol
    )]
    #[case::peer(
        ConnectionError::ErrorFrame { message: "bad".into(), details: String::new() },
        ErrorClass::Application
    )]
    fn errors_carry_a_single_class(#[case] err: ConnectionError, #[case] expected: ErrorClass) {
        assert_eq!(err.class(), expected);
        let flags = [err.is_transport(), err.is_protocol(), err.is_application()];
        assert_eq!(flags.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn frame_io_errors_become_transport_errors() {
        let err = ConnectionError::from(FrameError::Io(io::Error::other("boom")));
        assert_eq!(err.class(), ErrorClass::Transport);
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn invalid_header_names_the_value() {
        let err = ConnectionError::InvalidHeader {
            name: "heart-beat",
            value: "10".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidHeader);
        assert_eq!(err.to_string(), "invalid header: heart-beat:10");
    }

    #[test]
    fn frame_error_is_exposed_for_grammar_failures() {
        let err = ConnectionError::from(FrameError::ExpectedNullByte);
        assert!(matches!(
            err.frame_error(),
            Some(FrameError::ExpectedNullByte)
        ));
        assert_eq!(err.kind(), ErrorKind::Frame);
    }
}
