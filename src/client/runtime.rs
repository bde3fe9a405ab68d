//! Client connection handle.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
    sync::mpsc,
};

use super::{
    config::ClientConfig,
    handlers,
    message::Message,
    state::ClientState,
    subscription::Subscription,
    transaction::Transaction,
};
use crate::{
    ack::{AckMode, ack_headers},
    body::{BodyWriter, PendingFrame},
    connection::{self, ConnectedInfo, ConnectionCore, ConnectionEvent, ConnectionEvents, SendOptions},
    error::{ConnectionError, Result},
    frame::{FrameHead, Headers, OutgoingFrame, command, header},
    version::ProtocolVersion,
};

struct ClientInner {
    core: Arc<ConnectionCore>,
    state: Arc<ClientState>,
}

impl Drop for ClientInner {
    fn drop(&mut self) { self.core.destroy(None); }
}

/// Handle to a connected client.
///
/// Clones share one connection. The connection is destroyed when the last
/// handle, [`Subscription`] and [`Transaction`] is dropped.
#[derive(Clone)]
pub struct ClientConnection {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("core", &self.inner.core)
            .field("subscriptions", &self.inner.state.subscriptions.len())
            .finish()
    }
}

impl ClientConnection {
    /// Perform the handshake over `transport`.
    ///
    /// Sends CONNECT (or STOMP) and waits for CONNECTED. The returned event
    /// receiver has already yielded [`ConnectionEvent::Connected`]; the
    /// handshake outcome is available from [`ClientConnection::connected_info`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::ConnectTimedOut`] when no CONNECTED frame
    /// arrives within the configured timeout, the server's error if it
    /// answers with ERROR, or the protocol error that ended the connection.
    pub async fn connect<T>(transport: T, config: ClientConfig) -> Result<(Self, ConnectionEvents)>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(ClientState::new(&config));
        let (core, mut events) = connection::spawn(
            transport,
            config.connection.clone(),
            Arc::clone(&state),
            handlers::connecting_table(),
        );
        let client = Self {
            inner: Arc::new(ClientInner { core, state }),
        };

        let pending = client
            .core()
            .send_outgoing(config.connect_frame().into(), SendOptions::default())?;
        let handshake = async {
            pending.await?;
            wait_connected(&mut events).await
        };
        let outcome = match config.connect_timeout_duration() {
            Some(limit) => match tokio::time::timeout(limit, handshake).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    client.core().destroy(Some(ConnectionError::ConnectTimedOut));
                    Err(ConnectionError::ConnectTimedOut)
                }
            },
            None => handshake.await,
        };
        outcome?;
        Ok((client, events))
    }

    /// Open a TCP connection to `addr` and perform the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Io`] if the socket cannot be opened, or any
    /// error from [`ClientConnection::connect`].
    pub async fn connect_tcp(
        addr: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<(Self, ConnectionEvents)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::connect(stream, config).await
    }

    /// Negotiated version.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion { self.core().version() }

    /// Outcome of the handshake.
    #[must_use]
    pub fn connected_info(&self) -> Option<&ConnectedInfo> { self.inner.state.connected.get() }

    /// The underlying connection.
    #[must_use]
    pub fn core(&self) -> &Arc<ConnectionCore> { &self.inner.core }

    /// Returns true once the connection has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool { self.core().is_destroyed() }

    /// Start a SEND frame whose body is streamed through the returned writer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingHeader`] without a `destination`
    /// header, or [`ConnectionError::StreamClosed`] after the connection has
    /// been destroyed.
    pub fn send(&self, headers: Headers, options: SendOptions) -> Result<BodyWriter> {
        require(&headers, header::DESTINATION)?;
        self.core()
            .send_frame(FrameHead::new(command::SEND).with_headers(headers), options)
    }

    /// Send a SEND frame with an in-memory body and a `content-length`.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::send`].
    pub fn send_bytes(
        &self,
        mut headers: Headers,
        body: impl Into<Bytes>,
        options: SendOptions,
    ) -> Result<PendingFrame> {
        require(&headers, header::DESTINATION)?;
        let body = body.into();
        headers.insert(header::CONTENT_LENGTH, body.len());
        let frame = OutgoingFrame::new(FrameHead::new(command::SEND).with_headers(headers)).with_body(body);
        self.core().send_outgoing(frame, options)
    }

    /// Subscribe to a destination.
    ///
    /// An `id` header is generated when absent and `ack` defaults to
    /// `auto`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingHeader`] without a `destination`,
    /// [`ConnectionError::InvalidHeader`] for an unrecognised `ack` mode,
    /// [`ConnectionError::Rejected`] when the
    /// id is already in use, or [`ConnectionError::StreamClosed`] after the
    /// connection has been destroyed.
    pub fn subscribe(&self, mut headers: Headers) -> Result<Subscription> {
        require(&headers, header::DESTINATION)?;
        let state = &self.inner.state;
        let id = match headers.get(header::ID) {
            Some(id) => id.to_owned(),
            None => state.next_subscription_id(),
        };
        let ack = headers
            .get(header::ACK)
            .map(str::parse::<AckMode>)
            .transpose()?
            .unwrap_or_default();
        headers.insert(header::ID, &id);
        headers.insert(header::ACK, ack);

        let (tx, rx) = mpsc::channel(state.message_capacity);
        match state.subscriptions.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(ConnectionError::rejected(format!(
                    "subscription id already in use: {id}"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        let head = FrameHead::new(command::SUBSCRIBE).with_headers(headers);
        if let Err(e) = self.core().send_outgoing(head.into(), SendOptions::default()) {
            state.subscriptions.remove(&id);
            return Err(e);
        }
        Ok(Subscription::new(id, ack, rx, self.clone()))
    }

    /// Acknowledge `message`, adding the identifying headers to `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MissingHeader`] when the message lacks the
    /// header the negotiated version identifies it by.
    pub fn ack(&self, message: &Message, headers: Headers, options: SendOptions) -> Result<PendingFrame> {
        self.acknowledge(command::ACK, message, headers, options)
    }

    /// Reject `message`.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::ack`].
    pub fn nack(&self, message: &Message, headers: Headers, options: SendOptions) -> Result<PendingFrame> {
        self.acknowledge(command::NACK, message, headers, options)
    }

    pub(super) fn acknowledge(
        &self,
        verb: &'static str,
        message: &Message,
        mut headers: Headers,
        options: SendOptions,
    ) -> Result<PendingFrame> {
        for (name, value) in ack_headers(self.version(), message.head())?.iter() {
            headers.insert(name, value);
        }
        self.core()
            .send_outgoing(FrameHead::new(verb).with_headers(headers).into(), options)
    }

    /// Open a transaction.
    ///
    /// Uses the `transaction` header from `headers` when present, otherwise
    /// allocates an id.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] after the connection has
    /// been destroyed.
    pub fn begin(&self, mut headers: Headers) -> Result<Transaction> {
        let id = match headers.get(header::TRANSACTION) {
            Some(id) => id.to_owned(),
            None => self.inner.state.next_transaction_id(),
        };
        headers.insert(header::TRANSACTION, &id);
        let head = FrameHead::new(command::BEGIN).with_headers(headers);
        self.core().send_outgoing(head.into(), SendOptions::default())?;
        Ok(Transaction::new(id, self.clone()))
    }

    pub(super) fn forget_subscription(&self, id: &str) { self.inner.state.subscriptions.remove(id); }

    #[cfg(test)]
    pub(super) fn subscription_count(&self) -> usize { self.inner.state.subscriptions.len() }

    /// Send a receipted DISCONNECT and close once the server acknowledges it.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamEnded`] if the connection ends before
    /// the receipt arrives.
    pub async fn disconnect(&self) -> Result<()> {
        let mut pending = self
            .core()
            .send_outgoing(FrameHead::new(command::DISCONNECT).into(), SendOptions::RECEIPT)?;
        let receipt = pending.take_receipt();
        pending.await?;
        if let Some(receipt) = receipt {
            receipt.await?;
        }
        self.core().destroy(None);
        Ok(())
    }

    /// Tear down the connection immediately.
    pub fn destroy(&self, error: Option<ConnectionError>) { self.core().destroy(error); }
}

async fn wait_connected(events: &mut ConnectionEvents) -> Result<()> {
    match events.recv().await {
        Some(ConnectionEvent::Connected(_)) => Ok(()),
        Some(ConnectionEvent::Error(err)) => Err(err),
        Some(ConnectionEvent::End) | None => Err(ConnectionError::StreamEnded),
    }
}

fn require(headers: &Headers, name: &'static str) -> Result<()> {
    if headers.contains(name) {
        Ok(())
    } else {
        Err(ConnectionError::MissingHeader { name })
    }
}
