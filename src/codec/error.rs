//! Errors raised while decoding the frame grammar.
//!
//! Every variant except [`FrameError::Io`] is a protocol violation: the bytes
//! received cannot be interpreted as a frame. Parse failures are never retried
//! by the decoder; once one is returned the stream is unusable.

use std::io;

use thiserror::Error;

/// Frame grammar violation or transport failure observed by the codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A command or header line exceeded the configured ceiling.
    #[error("line exceeds max length of {max} bytes")]
    LineTooLong {
        /// Configured line-length ceiling.
        max: usize,
    },

    /// A frame carried more headers than the configured ceiling.
    #[error("frame has more than {max} headers")]
    TooManyHeaders {
        /// Configured header-count ceiling.
        max: usize,
    },

    /// The `content-length` header is not a non-negative integer.
    #[error("invalid content-length: {value:?}")]
    InvalidContentLength {
        /// Raw header value.
        value: String,
    },

    /// A fixed-length body was not followed by a NUL byte.
    #[error("expected NUL byte after fixed-length body")]
    ExpectedNullByte,

    /// An escape sequence is not defined for the negotiated version.
    #[error("undefined escape sequence: \\{sequence}")]
    UndefinedEscapeSequence {
        /// Character following the backslash, or empty for a trailing backslash.
        sequence: String,
    },

    /// A header line has no `:` separator.
    #[error("invalid header line: {line:?}")]
    InvalidHeaderLine {
        /// Offending line, lossily decoded.
        line: String,
    },

    /// A command or header token is not valid UTF-8.
    #[error("command or header is not valid UTF-8")]
    InvalidUtf8,

    /// The transport ended while a frame was being parsed.
    #[error("unexpected end of stream while parsing a frame")]
    UnexpectedEndOfStream,

    /// Transport read or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::UnexpectedEndOfStream => "eof",
            _ => "protocol",
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => e,
            FrameError::UnexpectedEndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
