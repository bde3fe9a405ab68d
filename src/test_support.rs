//! In-crate helpers for driving one end of a connection by hand.

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex};

use crate::{
    codec::FrameDecoder,
    frame::FrameHead,
    reader::FrameReader,
    version::ProtocolVersion,
};

/// Raw frame-level view of the remote end of a duplex transport.
pub(crate) struct Peer {
    pub(crate) reader: FrameReader<ReadHalf<DuplexStream>>,
    pub(crate) writer: WriteHalf<DuplexStream>,
}

impl Peer {
    pub(crate) async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("peer write");
    }

    /// Read the next frame and its whole body.
    pub(crate) async fn next(&mut self) -> (FrameHead, Bytes) {
        let mut frame = self
            .reader
            .next_frame()
            .await
            .expect("frame expected")
            .expect("valid frame");
        let (pumped, body) = tokio::join!(self.reader.finish_body(), frame.body.read_to_end());
        pumped.expect("pump body");
        (frame.head, body.expect("body"))
    }

    /// Returns true once the other side has finished the transport.
    pub(crate) async fn is_closed(&mut self) -> bool { self.reader.next_frame().await.is_none() }

    pub(crate) fn set_version(&self, version: ProtocolVersion) { self.reader.decoder().set_version(version); }
}

/// A transport for the code under test and a [`Peer`] on the other end.
pub(crate) fn pair() -> (DuplexStream, Peer) {
    let (local, remote) = duplex(4096);
    let (read, writer) = tokio::io::split(remote);
    let reader = FrameReader::new(read, FrameDecoder::default(), 16);
    (local, Peer { reader, writer })
}
