//! Whole-frame decoding and encoding over byte slices.

use bytes::BytesMut;
use stompwire::{
    FrameHead,
    OutgoingFrame,
    ProtocolVersion,
    VersionCell,
    codec::{DecoderLimits, FrameDecoder, FrameError, FrameEvent, encode_frame},
};
use tokio_util::codec::Decoder;

/// A frame with its body chunks joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub head: FrameHead,
    pub body: Vec<u8>,
}

impl DecodedFrame {
    /// Value of the header `name`, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }
}

/// Folds decoder events back into whole frames.
#[derive(Default)]
pub(super) struct Collector {
    current: Option<DecodedFrame>,
}

impl Collector {
    /// Feed one event, returning a frame once its end arrives.
    pub(super) fn push(&mut self, event: FrameEvent) -> Option<DecodedFrame> {
        match event {
            FrameEvent::Head(head) => {
                self.current = Some(DecodedFrame {
                    head,
                    body: Vec::new(),
                });
                None
            }
            FrameEvent::Body(chunk) => {
                if let Some(frame) = self.current.as_mut() {
                    frame.body.extend_from_slice(&chunk);
                }
                None
            }
            FrameEvent::End => self.current.take(),
        }
    }
}

/// Decode every frame in `bytes` at once under `version`.
///
/// # Errors
///
/// Returns the first [`FrameError`] the decoder reports, including
/// [`FrameError::UnexpectedEndOfStream`] for a truncated final frame.
pub fn decode_all(bytes: &[u8], version: ProtocolVersion) -> Result<Vec<DecodedFrame>, FrameError> {
    decode_in_chunks(bytes, bytes.len(), version)
}

/// Decode `bytes` fed to the decoder `chunk_size` bytes at a time.
///
/// # Errors
///
/// See [`decode_all`].
pub fn decode_in_chunks(
    bytes: &[u8],
    chunk_size: usize,
    version: ProtocolVersion,
) -> Result<Vec<DecodedFrame>, FrameError> {
    let decoder = FrameDecoder::new(DecoderLimits::default(), VersionCell::new(version));
    decode_with(decoder, bytes, chunk_size)
}

/// Decode `bytes` with a caller-configured `decoder`.
///
/// # Errors
///
/// See [`decode_all`].
pub fn decode_with(
    mut decoder: FrameDecoder,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<Vec<DecodedFrame>, FrameError> {
    let mut collector = Collector::default();
    let mut frames = Vec::new();
    let mut buf = BytesMut::new();
    for chunk in bytes.chunks(chunk_size.max(1)) {
        buf.extend_from_slice(chunk);
        while let Some(event) = decoder.decode(&mut buf)? {
            frames.extend(collector.push(event));
        }
    }
    while let Some(event) = decoder.decode_eof(&mut buf)? {
        frames.extend(collector.push(event));
    }
    Ok(frames)
}

/// Encode `frames` back to back under `version`.
#[must_use]
pub fn encode_all(frames: &[OutgoingFrame], version: ProtocolVersion) -> Vec<u8> {
    let mut dst = BytesMut::new();
    for frame in frames {
        encode_frame(frame, version, &mut dst);
    }
    dst.to_vec()
}
