//! Client transactions.

use bytes::Bytes;

use super::{message::Message, runtime::ClientConnection};
use crate::{
    body::{BodyWriter, PendingFrame},
    connection::SendOptions,
    error::Result,
    frame::{FrameHead, Headers, command, header},
};

/// An open transaction.
///
/// Frames sent through it carry its `transaction` header. Dropping it
/// without [`Transaction::commit`] or [`Transaction::abort`] leaves the
/// server to abort it when the connection closes.
#[derive(Debug)]
pub struct Transaction {
    id: String,
    client: ClientConnection,
}

impl Transaction {
    pub(super) fn new(id: String, client: ClientConnection) -> Self { Self { id, client } }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Start a SEND within this transaction.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::send`].
    pub fn send(&self, headers: Headers, options: SendOptions) -> Result<BodyWriter> {
        self.client.send(self.tag(headers), options)
    }

    /// Send an in-memory body within this transaction.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::send`].
    pub fn send_bytes(
        &self,
        headers: Headers,
        body: impl Into<Bytes>,
        options: SendOptions,
    ) -> Result<PendingFrame> {
        self.client.send_bytes(self.tag(headers), body, options)
    }

    /// Acknowledge `message` within this transaction.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::ack`].
    pub fn ack(&self, message: &Message, options: SendOptions) -> Result<PendingFrame> {
        self.client
            .acknowledge(command::ACK, message, self.tag(Headers::new()), options)
    }

    /// Reject `message` within this transaction.
    ///
    /// # Errors
    ///
    /// As for [`ClientConnection::ack`].
    pub fn nack(&self, message: &Message, options: SendOptions) -> Result<PendingFrame> {
        self.client
            .acknowledge(command::NACK, message, self.tag(Headers::new()), options)
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::StreamClosed`] after the connection
    /// has been destroyed.
    pub fn commit(self, options: SendOptions) -> Result<PendingFrame> { self.finish(command::COMMIT, options) }

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::StreamClosed`] after the connection
    /// has been destroyed.
    pub fn abort(self, options: SendOptions) -> Result<PendingFrame> { self.finish(command::ABORT, options) }

    fn finish(self, verb: &'static str, options: SendOptions) -> Result<PendingFrame> {
        let head = FrameHead::new(verb).with_header(header::TRANSACTION, &self.id);
        self.client.core().send_outgoing(head.into(), options)
    }

    fn tag(&self, mut headers: Headers) -> Headers {
        headers.insert(header::TRANSACTION, &self.id);
        headers
    }
}
