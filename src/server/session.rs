//! Per-connection handle given to [`ServerHandler`](super::ServerHandler)
//! hooks.

use std::{fmt, sync::Arc};

use bytes::Bytes;

use super::state::ServerState;
use crate::{
    ack::AckMode,
    body::{BodyWriter, PendingFrame},
    connection::{ConnectionCore, SendOptions},
    error::{ConnectionError, Result},
    frame::{FrameHead, Headers, OutgoingFrame, command, header},
    version::ProtocolVersion,
};

/// A subscription registered by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSubscription {
    /// Subscription id.
    pub id: String,
    /// Destination subscribed to.
    pub destination: String,
    /// Requested acknowledgement mode.
    pub ack: AckMode,
    /// Headers of the SUBSCRIBE frame.
    pub headers: Headers,
}

/// Handle to one server connection.
///
/// Cheap to clone; handlers may keep it to deliver messages later.
#[derive(Clone)]
pub struct ServerSession {
    core: Arc<ConnectionCore>,
    state: Arc<ServerState>,
}

impl fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSession")
            .field("id", &self.state.session_id)
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl ServerSession {
    pub(super) fn new(core: Arc<ConnectionCore>, state: Arc<ServerState>) -> Self { Self { core, state } }

    /// Session id sent in the CONNECTED frame.
    #[must_use]
    pub fn id(&self) -> &str { &self.state.session_id }

    /// Negotiated version.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion { self.core.version() }

    /// The underlying connection.
    #[must_use]
    pub fn core(&self) -> &Arc<ConnectionCore> { &self.core }

    /// Look up an active subscription.
    #[must_use]
    pub fn subscription(&self, id: &str) -> Option<ServerSubscription> {
        self.state.subscriptions.get(id).map(|entry| entry.value().clone())
    }

    /// Every active subscription.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ServerSubscription> {
        self.state
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Start a MESSAGE frame for `subscription`.
    ///
    /// Fills in `subscription`, a fresh `message-id` and, unless given, the
    /// subscription's `destination`. Under 1.2 a subscription that requires
    /// acknowledgement also gets an `ack` header.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Rejected`] for an unknown subscription, or
    /// [`ConnectionError::StreamClosed`] once the connection has been
    /// destroyed.
    pub fn message(&self, subscription: &str, headers: Headers) -> Result<BodyWriter> {
        let head = self.message_head(subscription, headers)?;
        self.core.send_frame(head, SendOptions::default())
    }

    /// Send a MESSAGE frame with an in-memory body and a `content-length`.
    ///
    /// # Errors
    ///
    /// As for [`ServerSession::message`].
    pub fn send_message(
        &self,
        subscription: &str,
        headers: Headers,
        body: impl Into<Bytes>,
    ) -> Result<PendingFrame> {
        let body = body.into();
        let mut head = self.message_head(subscription, headers)?;
        head.headers.insert(header::CONTENT_LENGTH, body.len());
        self.core
            .send_outgoing(OutgoingFrame::new(head).with_body(body), SendOptions::default())
    }

    /// Close the connection, reporting `error` if given.
    pub fn destroy(&self, error: Option<ConnectionError>) { self.core.destroy(error); }

    fn message_head(&self, subscription: &str, mut headers: Headers) -> Result<FrameHead> {
        let Some(sub) = self.subscription(subscription) else {
            return Err(ConnectionError::rejected(format!(
                "unknown subscription: {subscription}"
            )));
        };
        let message_id = self.state.next_message_id();
        headers.insert(header::SUBSCRIPTION, &sub.id);
        headers.insert(header::MESSAGE_ID, &message_id);
        headers.insert_if_absent(header::DESTINATION.to_owned(), sub.destination);
        if sub.ack.requires_ack() && self.version() == ProtocolVersion::V1_2 {
            headers.insert(header::ACK, &message_id);
        }
        Ok(FrameHead::new(command::MESSAGE).with_headers(headers))
    }
}
