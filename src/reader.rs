//! Inbound frame reader.
//!
//! [`FrameReader`] drives a [`FrameDecoder`] over a transport's read half and
//! hands out one [`InboundFrame`] at a time. The frame's body is forwarded
//! through a bounded channel by [`FrameReader::finish_body`]; while that
//! channel is full the reader stops polling the transport, so a slow body
//! consumer throttles the peer instead of growing a buffer.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use crate::{
    body::{self, BodySender, InboundFrame},
    codec::{FrameDecoder, FrameError, FrameEvent},
    error::ConnectionError,
};

/// Reader yielding frames decoded from `R`.
pub struct FrameReader<R> {
    framed: FramedRead<R, FrameDecoder>,
    body: Option<BodySender>,
    body_capacity: usize,
    in_body: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `io`, buffering at most `body_capacity` chunks per body.
    #[must_use]
    pub fn new(io: R, decoder: FrameDecoder, body_capacity: usize) -> Self {
        Self {
            framed: FramedRead::new(io, decoder),
            body: None,
            body_capacity,
            in_body: false,
        }
    }

    /// Decoder state, for inspection.
    #[must_use]
    pub fn decoder(&self) -> &FrameDecoder { self.framed.decoder() }

    /// Wait for the next frame head.
    ///
    /// Any unread body of the previous frame is pumped to its consumer (or
    /// discarded if the consumer is gone) first. Returns `None` when the
    /// transport ends cleanly between frames.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error for malformed input, an I/O failure, or an
    /// end of stream inside a frame.
    pub async fn next_frame(&mut self) -> Option<Result<InboundFrame, FrameError>> {
        if let Err(e) = self.finish_body().await {
            return Some(Err(e));
        }
        loop {
            match self.framed.next().await? {
                Err(e) => return Some(Err(e)),
                Ok(FrameEvent::Head(head)) => {
                    trace!(command = %head.command, "frame head decoded");
                    let (sender, body) = body::channel(self.body_capacity);
                    self.body = Some(sender);
                    self.in_body = true;
                    return Some(Ok(InboundFrame { head, body }));
                }
                Ok(event) => {
                    debug_assert!(false, "decoder emitted {event:?} outside a frame");
                }
            }
        }
    }

    /// Forward the rest of the current frame's body to its consumer.
    ///
    /// Completes once the frame's terminator has been decoded. A no-op when
    /// no body is in progress.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error if the body is malformed or the stream
    /// ends before the terminator.
    pub async fn finish_body(&mut self) -> Result<(), FrameError> {
        if !self.in_body {
            return Ok(());
        }
        let mut sender = self.body.take();
        loop {
            let event = match self.framed.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    self.in_body = false;
                    if let Some(sender) = sender {
                        sender.fail(ConnectionError::StreamEnded);
                    }
                    return Err(e);
                }
                None => {
                    self.in_body = false;
                    if let Some(sender) = sender {
                        sender.fail(ConnectionError::StreamEnded);
                    }
                    return Err(FrameError::UnexpectedEndOfStream);
                }
            };
            match event {
                FrameEvent::Body(chunk) => {
                    if let Some(tx) = sender.as_ref()
                        && !tx.send(chunk).await
                    {
                        debug!("body consumer dropped; discarding remainder");
                        sender = None;
                    }
                }
                FrameEvent::End => {
                    self.in_body = false;
                    if let Some(sender) = sender {
                        sender.finish();
                    }
                    return Ok(());
                }
                FrameEvent::Head(_) => {
                    debug_assert!(false, "frame head decoded inside a body");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn frames_are_yielded_with_their_bodies() {
        let input: &[u8] = b"SEND\ndestination:/a\n\nhello\0\nRECEIPT\nreceipt-id:1\n\n\0\n";
        let mut reader = FrameReader::new(input, FrameDecoder::default(), 4);

        let mut first = reader.next_frame().await.expect("frame").expect("valid");
        assert_eq!(first.command(), "SEND");
        let (pumped, body) = tokio::join!(reader.finish_body(), first.body.read_to_end());
        pumped.expect("pump");
        assert_eq!(body.expect("body"), "hello");

        let second = reader.next_frame().await.expect("frame").expect("valid");
        assert_eq!(second.header("receipt-id"), Some("1"));
        assert!(reader.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn unread_bodies_are_discarded() {
        let input: &[u8] = b"SEND\n\nignored\0SEND\n\nkept\0";
        let mut reader = FrameReader::new(input, FrameDecoder::default(), 1);
        let first = reader.next_frame().await.expect("frame").expect("valid");
        drop(first);
        let mut second = reader.next_frame().await.expect("frame").expect("valid");
        let (pumped, body) = tokio::join!(reader.finish_body(), second.body.read_to_end());
        pumped.expect("pump");
        assert_eq!(body.expect("body"), "kept");
    }

    #[tokio::test]
    async fn truncated_body_reports_stream_ended_to_consumer() {
        let input: &[u8] = b"SEND\n\npartial";
        let mut reader = FrameReader::new(input, FrameDecoder::default(), 4);
        let mut frame = reader.next_frame().await.expect("frame").expect("valid");
        let (pumped, body) = tokio::join!(reader.finish_body(), frame.body.read_to_end());
        assert!(matches!(pumped, Err(FrameError::UnexpectedEndOfStream)));
        assert!(matches!(body, Err(ConnectionError::StreamEnded)));
    }

    #[tokio::test]
    async fn paused_consumer_stops_transport_reads() {
        let (mut peer, local) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(local, FrameDecoder::default(), 1);
        peer.write_all(b"SEND\n\n").await.expect("write head");
        let mut frame = reader.next_frame().await.expect("frame").expect("valid");

        let producer = tokio::spawn(async move {
            for _ in 0..64 {
                peer.write_all(&[b'x'; 32]).await.expect("write body");
            }
            peer.write_all(b"\0").await.expect("write terminator");
            peer
        });

        let consumer = async {
            // While nobody reads the body, the pump and the producer stall.
            tokio::time::sleep(Duration::from_millis(50)).await;
            let stalled = !producer.is_finished();
            (stalled, frame.body.read_to_end().await)
        };
        let (pumped, (stalled, body)) = tokio::join!(reader.finish_body(), consumer);
        pumped.expect("pump");
        assert!(stalled, "producer must wait for the consumer");
        assert_eq!(body.expect("body").len(), 64 * 32);
        drop(producer.await.expect("producer"));
    }
}
