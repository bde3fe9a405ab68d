//! Frame encoder.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use super::FrameError;
use crate::{
    frame::{FrameHead, OutgoingFrame},
    version::{ProtocolVersion, VersionCell},
};

/// Unit of input accepted by [`FrameEncoder`].
///
/// A frame is written as one `Head`, any number of `Body` chunks and one
/// `Terminator`. `Heartbeat` must only be written between frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundChunk {
    /// Command line, header lines and the blank separator line.
    Head(FrameHead),
    /// A slice of the body.
    Body(Bytes),
    /// NUL terminator followed by a single line feed.
    Terminator,
    /// A bare line feed.
    Heartbeat,
}

/// Encoder serialising [`OutboundChunk`]s with the negotiated escaping rules.
#[derive(Clone, Debug, Default)]
pub struct FrameEncoder {
    version: VersionCell,
}

impl FrameEncoder {
    /// Create an encoder reading escape rules from `version`.
    #[must_use]
    pub fn new(version: VersionCell) -> Self { Self { version } }

    /// Shared version cell consulted by this encoder.
    #[must_use]
    pub fn version(&self) -> &VersionCell { &self.version }
}

fn encode_head(head: &FrameHead, version: ProtocolVersion, dst: &mut BytesMut) {
    let version = if head.is_handshake() {
        ProtocolVersion::V1_0
    } else {
        version
    };
    let command = version.escape(&head.command);
    let header_bytes: usize = head.headers.iter().map(|(k, v)| k.len() + v.len() + 2).sum();
    dst.reserve(command.len() + header_bytes + 2);
    dst.put_slice(command.as_bytes());
    dst.put_u8(b'\n');
    for (name, value) in head.headers.iter() {
        dst.put_slice(version.escape(name).as_bytes());
        dst.put_u8(b':');
        dst.put_slice(version.escape(value).as_bytes());
        dst.put_u8(b'\n');
    }
    dst.put_u8(b'\n');
}

impl Encoder<OutboundChunk> for FrameEncoder {
    type Error = FrameError;

    fn encode(&mut self, item: OutboundChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            OutboundChunk::Head(head) => encode_head(&head, self.version.get(), dst),
            OutboundChunk::Body(chunk) => dst.extend_from_slice(&chunk),
            OutboundChunk::Terminator => dst.put_slice(b"\0\n"),
            OutboundChunk::Heartbeat => dst.put_u8(b'\n'),
        }
        Ok(())
    }
}

/// Serialise a complete frame in one call.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use stompwire::{FrameHead, OutgoingFrame, ProtocolVersion, codec::encode_frame};
///
/// let frame = OutgoingFrame::new(FrameHead::new("SEND").with_header("destination", "/a:b"))
///     .with_body("hi");
/// let mut buf = BytesMut::new();
/// encode_frame(&frame, ProtocolVersion::V1_1, &mut buf);
/// assert_eq!(&buf[..], b"SEND\ndestination:/a\\cb\n\nhi\0\n");
/// ```
pub fn encode_frame(frame: &OutgoingFrame, version: ProtocolVersion, dst: &mut BytesMut) {
    encode_head(&frame.head, version, dst);
    dst.extend_from_slice(&frame.body);
    dst.put_slice(b"\0\n");
}
