//! Incremental frame codec.
//!
//! [`FrameDecoder`] turns an arbitrarily chunked byte stream into a sequence
//! of [`FrameEvent`]s: a frame's head is emitted as soon as its header block
//! is complete, followed by zero or more body chunks and a final
//! [`FrameEvent::End`]. Bodies are never buffered whole; each chunk is a
//! zero-copy slice of whatever the transport delivered.
//!
//! [`FrameEncoder`] is the mirror image: it serialises a head, then body
//! chunks as they are supplied, then the NUL terminator.
//!
//! Both sides consult a shared [`VersionCell`](crate::VersionCell) so the
//! escaping rules switch together once a version is negotiated.

use bytes::Bytes;

use crate::frame::FrameHead;

mod decoder;
mod encoder;
pub mod error;

pub use decoder::{FrameDecoder, ParserState};
pub use encoder::{FrameEncoder, OutboundChunk, encode_frame};
pub use error::FrameError;

/// Default ceiling for a command or header line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Default ceiling for the number of header lines in one frame.
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// Unit of output produced by [`FrameDecoder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// Command and headers of a new frame. The body follows.
    Head(FrameHead),
    /// A slice of the current frame's body.
    Body(Bytes),
    /// The current frame's body is complete.
    End,
}

/// Line and header ceilings enforced by the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Maximum bytes in a command or header line, excluding the terminator.
    pub max_line_length: usize,
    /// Maximum header lines per frame.
    pub max_headers: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_headers: DEFAULT_MAX_HEADERS,
        }
    }
}

#[cfg(test)]
mod tests;
