//! Lifecycle notifications emitted by a connection.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;

use crate::{error::ConnectionError, frame::Headers, heartbeat::NegotiatedHeartbeat, version::ProtocolVersion};

/// Outcome of a completed handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectedInfo {
    /// Negotiated protocol version.
    pub version: ProtocolVersion,
    /// Negotiated heartbeat intervals.
    pub heartbeat: NegotiatedHeartbeat,
    /// Headers of the peer's handshake frame.
    pub headers: Headers,
}

/// A lifecycle transition.
///
/// `Connected` is emitted at most once per handshake. Exactly one of
/// `Error` or `End` is emitted, when the connection is destroyed.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The handshake completed.
    Connected(ConnectedInfo),
    /// The connection was destroyed because of `0`.
    Error(ConnectionError),
    /// The connection closed without error.
    End,
}

/// Receiver for a connection's [`ConnectionEvent`]s.
#[derive(Debug)]
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ConnectionEvent>) -> Self { Self { rx } }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> { self.rx.recv().await }

    /// Take an event if one is ready.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> { self.rx.try_recv().ok() }

    /// Wait for the terminal event, skipping others.
    ///
    /// Returns the error the connection was destroyed with, or `None` after
    /// a clean end.
    pub async fn closed(&mut self) -> Option<ConnectionError> {
        while let Some(event) = self.rx.recv().await {
            match event {
                ConnectionEvent::Connected(_) => {}
                ConnectionEvent::Error(err) => return Some(err),
                ConnectionEvent::End => return None,
            }
        }
        None
    }
}

impl Stream for ConnectionEvents {
    type Item = ConnectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
