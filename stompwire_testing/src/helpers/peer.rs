//! A hand-driven peer speaking the wire format directly.

use std::io;

use bytes::BytesMut;
use futures::StreamExt;
use stompwire::{
    OutgoingFrame,
    ProtocolVersion,
    VersionCell,
    codec::{DecoderLimits, FrameDecoder, FrameError, encode_frame},
};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};
use tokio_util::codec::FramedRead;

use super::codec::{Collector, DecodedFrame};

/// The remote end of a duplex transport, read and written as raw frames.
pub struct RawPeer {
    reader: FramedRead<ReadHalf<DuplexStream>, FrameDecoder>,
    writer: WriteHalf<DuplexStream>,
    version: VersionCell,
}

impl RawPeer {
    /// Write `bytes` verbatim.
    ///
    /// # Errors
    ///
    /// Returns any transport write error.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await
    }

    /// Encode and write `frame` under the peer's current version.
    ///
    /// # Errors
    ///
    /// Returns any transport write error.
    pub async fn send(&mut self, frame: &OutgoingFrame) -> io::Result<()> {
        let mut dst = BytesMut::new();
        encode_frame(frame, self.version.get(), &mut dst);
        self.writer.write_all(&dst).await
    }

    /// Read the next whole frame. `None` means the transport ended cleanly.
    pub async fn read_frame(&mut self) -> Option<Result<DecodedFrame, FrameError>> {
        let mut collector = Collector::default();
        while let Some(event) = self.reader.next().await {
            match event {
                Ok(event) => {
                    if let Some(frame) = collector.push(event) {
                        return Some(Ok(frame));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    /// Switch the escape rules used for both directions.
    pub fn set_version(&self, version: ProtocolVersion) { self.version.set(version); }

    /// Finish the peer's write side.
    ///
    /// # Errors
    ///
    /// Returns any transport error raised while shutting down.
    pub async fn shutdown(&mut self) -> io::Result<()> { self.writer.shutdown().await }
}

/// A transport for the code under test and a [`RawPeer`] on its other end.
#[must_use]
pub fn peer_pair(capacity: usize) -> (DuplexStream, RawPeer) {
    let (local, remote) = duplex(capacity);
    let (read, writer) = split(remote);
    let version = VersionCell::default();
    let reader = FramedRead::new(
        read,
        FrameDecoder::new(DecoderLimits::default(), version.clone()),
    );
    (
        local,
        RawPeer {
            reader,
            writer,
            version,
        },
    )
}
