//! Frame heads and header maps.
//!
//! A frame on the wire is a command line, zero or more `name:value` header
//! lines, a blank line, a body and a NUL terminator. [`FrameHead`] holds the
//! command and headers; bodies are streamed separately (see
//! [`crate::body`]).

use std::fmt;

use bytes::Bytes;

/// Command tokens understood by the client and server roles.
pub mod command {
    /// Client handshake.
    pub const CONNECT: &str = "CONNECT";
    /// Client handshake alias introduced in 1.2.
    pub const STOMP: &str = "STOMP";
    /// Server handshake reply.
    pub const CONNECTED: &str = "CONNECTED";
    /// Publish a message.
    pub const SEND: &str = "SEND";
    /// Deliver a message to a subscriber.
    pub const MESSAGE: &str = "MESSAGE";
    /// Register a subscription.
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    /// Remove a subscription.
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    /// Acknowledge a message.
    pub const ACK: &str = "ACK";
    /// Reject a message.
    pub const NACK: &str = "NACK";
    /// Open a transaction.
    pub const BEGIN: &str = "BEGIN";
    /// Commit a transaction.
    pub const COMMIT: &str = "COMMIT";
    /// Roll back a transaction.
    pub const ABORT: &str = "ABORT";
    /// Graceful shutdown request.
    pub const DISCONNECT: &str = "DISCONNECT";
    /// Acknowledge a receipted request.
    pub const RECEIPT: &str = "RECEIPT";
    /// Report a failure to the peer.
    pub const ERROR: &str = "ERROR";
}

/// Well-known header names.
pub mod header {
    /// Fixed body length in bytes.
    pub const CONTENT_LENGTH: &str = "content-length";
    /// Body MIME type.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Request a receipt for this frame.
    pub const RECEIPT: &str = "receipt";
    /// Receipt correlation on RECEIPT and ERROR frames.
    pub const RECEIPT_ID: &str = "receipt-id";
    /// Versions offered by a CONNECT frame.
    pub const ACCEPT_VERSION: &str = "accept-version";
    /// Version chosen in a CONNECTED frame.
    pub const VERSION: &str = "version";
    /// Heartbeat intervals.
    pub const HEART_BEAT: &str = "heart-beat";
    /// Virtual host.
    pub const HOST: &str = "host";
    /// Login name.
    pub const LOGIN: &str = "login";
    /// Login secret.
    pub const PASSCODE: &str = "passcode";
    /// Server identification.
    pub const SERVER: &str = "server";
    /// Session identifier.
    pub const SESSION: &str = "session";
    /// Target destination.
    pub const DESTINATION: &str = "destination";
    /// Subscription or acknowledgement id.
    pub const ID: &str = "id";
    /// Subscription id on MESSAGE, ACK and NACK frames.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Message identifier.
    pub const MESSAGE_ID: &str = "message-id";
    /// Acknowledgement mode on SUBSCRIBE, ack id on MESSAGE.
    pub const ACK: &str = "ack";
    /// Transaction identifier.
    pub const TRANSACTION: &str = "transaction";
    /// Short error description on ERROR frames.
    pub const MESSAGE: &str = "message";
}

/// Header map preserving insertion order.
///
/// Lookups return the first occurrence of a name; frames decoded from the
/// wire never contain duplicates because the decoder drops repeated names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Value of the first header called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a header called `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    /// Set `name` to `value`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        let name = name.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Set `name` when `value` is present; `None` leaves the map untouched.
    pub fn insert_opt<V: fmt::Display>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    /// Add `name` only if it is not already present.
    ///
    /// Returns `false` when an earlier occurrence wins.
    pub fn insert_if_absent(&mut self, name: String, value: String) -> bool {
        if self.contains(&name) {
            return false;
        }
        self.0.push((name, value));
        true
    }

    /// Remove every header called `name`, returning the first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.0.iter().position(|(k, _)| k == name)?;
        let (_, value) = self.0.remove(first);
        self.0.retain(|(k, _)| k != name);
        Some(value)
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns true when no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse the `content-length` header, if present.
    ///
    /// Returns `Some(Err(raw))` when the value is not a non-negative integer.
    pub(crate) fn content_length(&self) -> Option<Result<usize, &str>> {
        self.get(header::CONTENT_LENGTH)
            .map(|raw| raw.trim().parse::<usize>().map_err(|_| raw))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: fmt::Display,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Command and headers of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHead {
    /// Command token, for example `SEND`.
    pub command: String,
    /// Frame headers.
    pub headers: Headers,
}

impl FrameHead {
    /// Create a head with no headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use stompwire::FrameHead;
    ///
    /// let head = FrameHead::new("SEND")
    ///     .with_header("destination", "/queue/a")
    ///     .with_header("content-length", 5);
    /// assert_eq!(head.header("content-length"), Some("5"));
    /// ```
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Headers::new(),
        }
    }

    /// Builder-style header setter.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the header map.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Value of the first header called `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.headers.get(name) }

    /// Returns true for the handshake commands, whose headers are never
    /// escaped.
    #[must_use]
    pub fn is_handshake(&self) -> bool { is_handshake_command(&self.command) }
}

pub(crate) fn is_handshake_command(command: &str) -> bool {
    matches!(
        command,
        command::CONNECT | command::STOMP | command::CONNECTED
    )
}

/// A complete outbound frame with an in-memory body.
///
/// Used for the small frames the connection synthesises itself (CONNECTED,
/// RECEIPT, ERROR) and by command handlers returning a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingFrame {
    /// Command and headers.
    pub head: FrameHead,
    /// Body bytes.
    pub body: Bytes,
}

impl OutgoingFrame {
    /// Create a frame with an empty body.
    #[must_use]
    pub fn new(head: FrameHead) -> Self {
        Self {
            head,
            body: Bytes::new(),
        }
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl From<FrameHead> for OutgoingFrame {
    fn from(head: FrameHead) -> Self { Self::new(head) }
}
