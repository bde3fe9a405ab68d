//! Subscriptions and their message streams.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;

use super::{message::Message, runtime::ClientConnection};
use crate::{
    ack::AckMode,
    connection::SendOptions,
    error::Result,
    frame::{FrameHead, command, header},
};

/// Stream of messages delivered to one subscription.
///
/// Yields `Err(StreamEnded)` once if the connection is destroyed while the
/// subscription is active. Dropping a subscription stops local delivery but
/// sends no UNSUBSCRIBE; use [`Subscription::unsubscribe`] for that.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    ack: AckMode,
    rx: mpsc::Receiver<Result<Message>>,
    client: ClientConnection,
}

impl Subscription {
    pub(super) fn new(
        id: String,
        ack: AckMode,
        rx: mpsc::Receiver<Result<Message>>,
        client: ClientConnection,
    ) -> Self {
        Self { id, ack, rx, client }
    }

    /// Subscription id sent in the `id` header.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Acknowledgement mode requested from the server.
    #[must_use]
    pub fn ack_mode(&self) -> AckMode { self.ack }

    /// Wait for the next message.
    pub async fn next_message(&mut self) -> Option<Result<Message>> { self.rx.recv().await }

    /// Send a receipted UNSUBSCRIBE and wait for the server to confirm it.
    ///
    /// Messages that arrive after this call are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::StreamEnded`] if the connection ends
    /// before the receipt arrives.
    pub async fn unsubscribe(mut self) -> Result<()> {
        self.rx.close();
        // Buffered messages hold their bodies open; release them so the
        // reader can reach the RECEIPT.
        while self.rx.try_recv().is_ok() {}

        let head = FrameHead::new(command::UNSUBSCRIBE).with_header(header::ID, &self.id);
        let mut pending = self
            .client
            .core()
            .send_outgoing(head.into(), SendOptions::RECEIPT)?;
        let receipt = pending.take_receipt();
        pending.await?;
        if let Some(receipt) = receipt {
            receipt.await?;
        }
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.client.forget_subscription(&self.id); }
}

impl Stream for Subscription {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
