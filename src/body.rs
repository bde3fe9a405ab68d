//! Streaming frame bodies.
//!
//! Inbound bodies are exposed as [`FrameBody`], a [`Stream`] of byte chunks
//! fed by the reader. The channel between them is bounded: when the consumer
//! stops polling, the reader stops pulling bytes off the transport.
//!
//! Outbound bodies are written through [`BodyWriter`]. Ending the writer
//! yields a [`PendingFrame`] that resolves once the frame's terminator has
//! been flushed to the transport.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::{
    connection::Receipt,
    error::{ConnectionError, Result},
    frame::FrameHead,
};

type BodyItem = Result<Bytes>;

/// Create a linked sender/body pair holding at most `capacity` chunks.
pub(crate) fn channel(capacity: usize) -> (BodySender, FrameBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let complete = Arc::new(AtomicBool::new(false));
    (
        BodySender {
            tx,
            complete: Arc::clone(&complete),
        },
        FrameBody {
            rx: Some(rx),
            complete,
        },
    )
}

/// Producer side of a [`FrameBody`].
#[derive(Debug)]
pub(crate) struct BodySender {
    tx: mpsc::Sender<BodyItem>,
    complete: Arc<AtomicBool>,
}

impl BodySender {
    /// Forward a chunk, waiting while the consumer's buffer is full.
    ///
    /// Returns `false` once the consumer has gone away.
    pub(crate) async fn send(&self, chunk: Bytes) -> bool { self.tx.send(Ok(chunk)).await.is_ok() }

    /// Mark the body complete and close the channel.
    pub(crate) fn finish(self) { self.complete.store(true, Ordering::Release); }

    /// Close the channel with an error, if there is room to deliver it.
    ///
    /// A consumer that misses the error still observes an incomplete body.
    pub(crate) fn fail(self, err: ConnectionError) { let _ = self.tx.try_send(Err(err)); }
}

/// Inbound frame body.
///
/// Yields chunks in arrival order and ends after the frame's terminator. A
/// body cut short by a failure ends with an error item instead.
#[derive(Debug)]
pub struct FrameBody {
    rx: Option<mpsc::Receiver<BodyItem>>,
    complete: Arc<AtomicBool>,
}

impl FrameBody {
    /// A body that is already complete and empty.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rx: None,
            complete: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Collect the remaining body into one buffer.
    ///
    /// # Errors
    ///
    /// Returns the error that cut the body short, if any.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Collect at most `limit` bytes as lossy UTF-8, discarding the rest.
    ///
    /// # Errors
    ///
    /// Returns the error that cut the body short, if any.
    pub async fn read_to_string_lossy(&mut self, limit: usize) -> Result<String> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            let room = limit.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..room.min(chunk.len())]);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Stream for FrameBody {
    type Item = BodyItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                self.rx = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.rx = None;
                if self.complete.load(Ordering::Acquire) {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(ConnectionError::StreamEnded)))
                }
            }
        }
    }
}

/// A decoded frame whose body may still be arriving.
#[derive(Debug)]
pub struct InboundFrame {
    /// Command and headers.
    pub head: FrameHead,
    /// Body stream.
    pub body: FrameBody,
}

impl InboundFrame {
    /// Command token.
    #[must_use]
    pub fn command(&self) -> &str { &self.head.command }

    /// Value of the first header called `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }
}

/// Writer for an outbound frame's body.
///
/// The frame's head is queued when the writer is created. Chunks are
/// forwarded in order; [`BodyWriter::end`] closes the body.
///
/// Dropping the writer without calling [`BodyWriter::end`] abandons the
/// frame. Its head and any chunks may already be on the wire, so the
/// connection fails with [`ConnectionError::IncompleteBody`] rather than
/// terminating a truncated frame.
#[derive(Debug)]
pub struct BodyWriter {
    tx: Option<mpsc::Sender<Bytes>>,
    ended: Option<oneshot::Sender<()>>,
    done: oneshot::Receiver<Result<()>>,
    receipt: Option<Receipt>,
}

impl BodyWriter {
    pub(crate) fn new(
        tx: mpsc::Sender<Bytes>,
        ended: oneshot::Sender<()>,
        done: oneshot::Receiver<Result<()>>,
    ) -> Self {
        Self {
            tx: Some(tx),
            ended: Some(ended),
            done,
            receipt: None,
        }
    }

    pub(crate) fn with_receipt(mut self, receipt: Option<Receipt>) -> Self {
        self.receipt = receipt;
        self
    }

    /// Append `chunk` to the body, waiting while the writer's buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] if the frame can no longer
    /// be written; the precise cause is reported by the [`PendingFrame`].
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<()> {
        let chunk = chunk.into();
        let Some(tx) = self.tx.as_ref() else {
            return Err(ConnectionError::StreamClosed);
        };
        if chunk.is_empty() {
            return Ok(());
        }
        tx.send(chunk)
            .await
            .map_err(|_| ConnectionError::StreamClosed)
    }

    /// Append `chunk` without waiting.
    ///
    /// Returns `false` if the buffer is full or the frame can no longer be
    /// written.
    pub fn try_write(&mut self, chunk: impl Into<Bytes>) -> bool {
        let chunk = chunk.into();
        match self.tx.as_ref() {
            Some(_) if chunk.is_empty() => true,
            Some(tx) => tx.try_send(chunk).is_ok(),
            None => false,
        }
    }

    /// Receipt id attached to this frame, if one was requested.
    #[must_use]
    pub fn receipt_id(&self) -> Option<u64> { self.receipt.as_ref().map(Receipt::id) }

    /// Take the receipt future, if one was requested.
    pub fn take_receipt(&mut self) -> Option<Receipt> { self.receipt.take() }

    /// Close the body. The returned future resolves once the frame has been
    /// flushed.
    #[must_use = "await the pending frame to observe write errors"]
    pub fn end(mut self) -> PendingFrame {
        // Mark the body complete before the channel closes.
        if let Some(ended) = self.ended.take() {
            let _ = ended.send(());
        }
        self.tx = None;
        PendingFrame {
            done: self.done,
            receipt: self.receipt,
        }
    }
}

/// A frame whose body is complete but which may not yet be on the wire.
///
/// Resolves exactly once: `Ok(())` after the terminator is flushed, or the
/// error that prevented the write.
#[derive(Debug)]
pub struct PendingFrame {
    done: oneshot::Receiver<Result<()>>,
    receipt: Option<Receipt>,
}

impl PendingFrame {
    /// Take the receipt future, if one was requested and not already taken.
    pub fn take_receipt(&mut self) -> Option<Receipt> { self.receipt.take() }
}

impl Future for PendingFrame {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(ConnectionError::StreamEnded)))
    }
}
