//! Serialised outbound frame queue.
//!
//! Any number of frames may be started concurrently through a [`FrameQueue`],
//! but a single [`FrameWriter`] task owns the transport's write half and
//! writes them strictly in the order they were started. A frame's head, body
//! chunks and terminator are never interleaved with another frame's bytes.
//! Later frames wait until every earlier frame has been terminated, even if
//! their own bodies finish first.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use futures::SinkExt;
use log::warn;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};
use tracing::{debug, trace};

use crate::{
    body::{BodyWriter, PendingFrame},
    codec::{FrameEncoder, FrameError, OutboundChunk},
    error::{ConnectionError, Result},
    frame::{FrameHead, OutgoingFrame},
    metrics::{self, Direction},
};

/// Callback invoked once with the first fatal write failure.
pub type FatalWriteHook = Box<dyn FnOnce(ConnectionError) + Send>;

#[derive(Debug)]
enum WriteRequest {
    Frame {
        head: FrameHead,
        body: mpsc::Receiver<Bytes>,
        ended: oneshot::Receiver<()>,
        done: oneshot::Sender<Result<()>>,
    },
    Heartbeat,
}

/// Handle used to enqueue frames for a [`FrameWriter`].
///
/// Cloning the handle shares the same queue.
#[derive(Clone, Debug)]
pub struct FrameQueue {
    tx: mpsc::UnboundedSender<WriteRequest>,
    pending: Arc<AtomicUsize>,
    body_capacity: usize,
}

impl FrameQueue {
    /// Queue a frame head and return a writer for its body.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] if the writer task has
    /// stopped.
    pub fn start_frame(&self, head: FrameHead) -> Result<BodyWriter> {
        let (body_tx, body_rx) = mpsc::channel(self.body_capacity);
        let (ended_tx, ended_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::AcqRel);
        let request = WriteRequest::Frame {
            head,
            body: body_rx,
            ended: ended_rx,
            done: done_tx,
        };
        if self.tx.send(request).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionError::StreamClosed);
        }
        Ok(BodyWriter::new(body_tx, ended_tx, done_rx))
    }

    /// Queue a frame whose body is already in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] if the writer task has
    /// stopped.
    pub fn send_frame(&self, frame: OutgoingFrame) -> Result<PendingFrame> {
        let OutgoingFrame { head, body } = frame;
        let mut writer = self.start_frame(head)?;
        // A fresh body channel always has room for one chunk.
        if !writer.try_write(body) {
            return Err(ConnectionError::StreamClosed);
        }
        Ok(writer.end())
    }

    /// Queue a heartbeat if no frame is in flight.
    ///
    /// Returns `false` when the heartbeat was skipped.
    pub fn heartbeat(&self) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.tx.send(WriteRequest::Heartbeat).is_ok()
    }

    /// Returns true when no frame is queued or being written.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.pending.load(Ordering::Acquire) == 0 }

    /// Returns true once the writer task has stopped accepting frames.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// Task owning the transport's write half.
pub struct FrameWriter<W> {
    sink: FramedWrite<W, FrameEncoder>,
    rx: mpsc::UnboundedReceiver<WriteRequest>,
    pending: Arc<AtomicUsize>,
    failed: bool,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a writer over `io` and the queue feeding it.
    ///
    /// `body_capacity` bounds the chunks buffered per outbound body.
    #[must_use]
    pub fn new(io: W, encoder: FrameEncoder, body_capacity: usize) -> (Self, FrameQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let writer = Self {
            sink: FramedWrite::new(io, encoder),
            rx,
            pending: Arc::clone(&pending),
            failed: false,
        };
        let queue = FrameQueue {
            tx,
            pending,
            body_capacity: body_capacity.max(1),
        };
        (writer, queue)
    }

    /// Write queued frames until `shutdown` is cancelled or every queue
    /// handle is dropped, then finish the transport.
    ///
    /// The first write failure is passed to `on_fatal`; frames queued after
    /// it fail immediately with [`ConnectionError::StreamClosed`]. A body
    /// writer dropped before its frame was ended counts as a write failure
    /// ([`ConnectionError::IncompleteBody`]) and no terminator is written.
    /// Frames still queued at shutdown fail with
    /// [`ConnectionError::StreamEnded`].
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run(mut self, shutdown: CancellationToken, on_fatal: FatalWriteHook) {
        let mut on_fatal = Some(on_fatal);
        loop {
            let request = tokio::select! {
                biased;

                () = shutdown.cancelled() => break,
                request = self.rx.recv() => request,
            };
            let Some(request) = request else { break };
            match request {
                WriteRequest::Heartbeat => {
                    if self.failed || !self.pending_is_zero() {
                        continue;
                    }
                    if let Err(e) = self.write_heartbeat().await {
                        self.fail(e.into(), &mut on_fatal);
                    }
                }
                WriteRequest::Frame {
                    head,
                    body,
                    ended,
                    done,
                } => {
                    let result = if self.failed {
                        Err(ConnectionError::StreamClosed)
                    } else {
                        let command = head.command.clone();
                        tokio::select! {
                            biased;

                            () = shutdown.cancelled() => Err(ConnectionError::StreamEnded),
                            res = self.write_frame(head, body, ended) => match res {
                                Ok(()) => {
                                    metrics::inc_frames(Direction::Outbound);
                                    debug!(command = %command, "frame written");
                                    Ok(())
                                }
                                Err(err) => {
                                    warn!("frame write failed: command={command}, error={err}");
                                    self.fail(clone_write_error(&err), &mut on_fatal);
                                    Err(err)
                                }
                            },
                        }
                    };
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    let _ = done.send(result);
                }
            }
        }
        self.finish().await;
    }

    fn pending_is_zero(&self) -> bool { self.pending.load(Ordering::Acquire) == 0 }

    fn fail(&mut self, err: ConnectionError, on_fatal: &mut Option<FatalWriteHook>) {
        self.failed = true;
        if let Some(hook) = on_fatal.take() {
            hook(err);
        }
    }

    async fn write_frame(
        &mut self,
        head: FrameHead,
        mut body: mpsc::Receiver<Bytes>,
        mut ended: oneshot::Receiver<()>,
    ) -> Result<()> {
        self.sink.feed(OutboundChunk::Head(head)).await?;
        loop {
            let chunk = match body.try_recv() {
                Ok(chunk) => Some(chunk),
                Err(mpsc::error::TryRecvError::Disconnected) => None,
                Err(mpsc::error::TryRecvError::Empty) => {
                    // Push out what we have while the producer catches up.
                    self.sink.flush().await?;
                    body.recv().await
                }
            };
            let Some(chunk) = chunk else { break };
            self.sink.feed(OutboundChunk::Body(chunk)).await?;
        }
        if ended.try_recv().is_err() {
            return Err(ConnectionError::IncompleteBody);
        }
        self.sink.feed(OutboundChunk::Terminator).await?;
        self.sink.flush().await?;
        Ok(())
    }

    async fn write_heartbeat(&mut self) -> std::result::Result<(), FrameError> {
        trace!("heartbeat sent");
        self.sink.send(OutboundChunk::Heartbeat).await
    }

    async fn finish(mut self) {
        self.rx.close();
        while let Ok(request) = self.rx.try_recv() {
            if let WriteRequest::Frame { done, .. } = request {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                let _ = done.send(Err(ConnectionError::StreamEnded));
            }
        }
        if let Err(e) = self.sink.get_mut().shutdown().await {
            debug!(error = %e, "transport shutdown failed");
        }
    }
}

/// Rebuild a write error so both the frame's owner and the connection can
/// receive it.
fn clone_write_error(err: &ConnectionError) -> ConnectionError {
    match err {
        ConnectionError::Io(e) => ConnectionError::Io(std::io::Error::new(e.kind(), e.to_string())),
        ConnectionError::StreamEnded => ConnectionError::StreamEnded,
        ConnectionError::IncompleteBody => ConnectionError::IncompleteBody,
        _ => ConnectionError::StreamClosed,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    fn start() -> (FrameQueue, tokio::io::DuplexStream, CancellationToken) {
        let (local, remote) = tokio::io::duplex(1024);
        let (writer, queue) = FrameWriter::new(local, FrameEncoder::default(), 4);
        let token = CancellationToken::new();
        tokio::spawn(writer.run(token.clone(), Box::new(|_| {})));
        (queue, remote, token)
    }

    #[tokio::test]
    async fn heartbeat_is_skipped_while_a_frame_is_pending() {
        let (queue, _remote, _token) = start();
        let writer = queue.start_frame(FrameHead::new("SEND")).expect("queue open");
        assert!(!queue.is_idle());
        assert!(!queue.heartbeat());
        writer.end().await.expect("frame written");
        assert!(queue.is_idle());
        assert!(queue.heartbeat());
    }

    #[tokio::test]
    async fn queued_frames_fail_after_shutdown() {
        let (queue, mut remote, token) = start();
        token.cancel();
        let pending = queue.send_frame(FrameHead::new("SEND").into());
        if let Ok(pending) = pending {
            let err = pending.await.expect_err("writer stopped");
            assert!(matches!(
                err,
                ConnectionError::StreamEnded | ConnectionError::StreamClosed
            ));
        }
        let mut buf = Vec::new();
        remote.read_to_end(&mut buf).await.expect("read");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn first_write_failure_is_fatal_and_later_frames_fail_fast() {
        let (local, remote) = tokio::io::duplex(64);
        drop(remote);
        let (writer, queue) = FrameWriter::new(local, FrameEncoder::default(), 4);
        let fired = Arc::new(AtomicUsize::new(0));
        let (fatal_tx, fatal_rx) = oneshot::channel();
        let hook: FatalWriteHook = {
            let fired = Arc::clone(&fired);
            Box::new(move |err| {
                fired.fetch_add(1, Ordering::SeqCst);
                let _ = fatal_tx.send(err);
            })
        };
        tokio::spawn(writer.run(CancellationToken::new(), hook));

        let err = queue
            .send_frame(FrameHead::new("SEND").into())
            .expect("queue open")
            .await
            .expect_err("peer gone");
        assert!(
            matches!(&err, ConnectionError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe),
            "unexpected error: {err:?}"
        );
        let fatal = fatal_rx.await.expect("fatal hook fired");
        assert!(matches!(fatal, ConnectionError::Io(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));

        let second = queue
            .send_frame(FrameHead::new("SEND").into())
            .expect("queue still open")
            .await
            .expect_err("writer failed");
        assert!(matches!(second, ConnectionError::StreamClosed));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_body_writer_fails_instead_of_terminating() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let (writer, queue) = FrameWriter::new(local, FrameEncoder::default(), 4);
        let (fatal_tx, fatal_rx) = oneshot::channel();
        tokio::spawn(writer.run(
            CancellationToken::new(),
            Box::new(move |err| {
                let _ = fatal_tx.send(err);
            }),
        ));

        let mut body = queue.start_frame(FrameHead::new("SEND")).expect("queue open");
        body.write("half").await.expect("chunk accepted");
        drop(body);

        let fatal = fatal_rx.await.expect("fatal hook fired");
        assert!(matches!(fatal, ConnectionError::IncompleteBody));
        assert!(fatal.is_transport());
        let next = queue
            .send_frame(FrameHead::new("SEND").into())
            .expect("queue still open")
            .await
            .expect_err("writer failed");
        assert!(matches!(next, ConnectionError::StreamClosed));
        drop(queue);

        let mut wire = Vec::new();
        remote.read_to_end(&mut wire).await.expect("read");
        assert!(!wire.contains(&0), "truncated frame was terminated: {wire:?}");
    }
}
