//! Messages delivered to a subscription.

use bytes::Bytes;

use crate::{
    body::FrameBody,
    error::Result,
    frame::{FrameHead, header},
};

/// A MESSAGE frame whose body may still be arriving.
///
/// The connection reads no further frames until this body has been consumed
/// or the message dropped.
#[derive(Debug)]
pub struct Message {
    head: FrameHead,
    body: FrameBody,
}

impl Message {
    pub(crate) fn new(head: FrameHead, body: FrameBody) -> Self { Self { head, body } }

    /// Command and headers.
    #[must_use]
    pub fn head(&self) -> &FrameHead { &self.head }

    /// Value of the header called `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.head.header(name) }

    /// The `destination` header.
    #[must_use]
    pub fn destination(&self) -> Option<&str> { self.header(header::DESTINATION) }

    /// The `message-id` header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> { self.header(header::MESSAGE_ID) }

    /// The `subscription` header.
    #[must_use]
    pub fn subscription(&self) -> Option<&str> { self.header(header::SUBSCRIPTION) }

    /// Streaming access to the body.
    pub fn body(&mut self) -> &mut FrameBody { &mut self.body }

    /// Collect the remaining body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectionError::StreamEnded`] if the connection
    /// ended before the body was complete.
    pub async fn read_to_end(&mut self) -> Result<Bytes> { self.body.read_to_end().await }

    /// Split into head and body.
    #[must_use]
    pub fn into_parts(self) -> (FrameHead, FrameBody) { (self.head, self.body) }
}
