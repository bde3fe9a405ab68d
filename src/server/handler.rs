//! Application hooks for server connections.

use async_trait::async_trait;

use super::session::{ServerSession, ServerSubscription};
use crate::{body::InboundFrame, error::Result, frame::FrameHead};

/// Application logic behind a server connection.
///
/// Every hook runs on the connection's dispatch task; the next inbound frame
/// is not read until the hook returns. Returning an error sends an ERROR
/// frame to the client and closes the connection. The defaults accept
/// everything and discard message bodies.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use stompwire::{
///     InboundFrame,
///     Result,
///     server::{ServerHandler, ServerSession},
/// };
///
/// struct Sink;
///
/// #[async_trait]
/// impl ServerHandler for Sink {
///     async fn on_send(&self, _session: &ServerSession, mut frame: InboundFrame) -> Result<()> {
///         let body = frame.body.read_to_end().await?;
///         log::info!("received {} bytes", body.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Authorise a CONNECT or STOMP request.
    async fn on_connect(&self, _session: &ServerSession, _request: &FrameHead) -> Result<()> { Ok(()) }

    /// Handle a SEND frame. The body may be read from `frame.body`.
    async fn on_send(&self, _session: &ServerSession, _frame: InboundFrame) -> Result<()> { Ok(()) }

    /// A subscription was registered.
    async fn on_subscribe(
        &self,
        _session: &ServerSession,
        _subscription: &ServerSubscription,
    ) -> Result<()> {
        Ok(())
    }

    /// A subscription was removed.
    async fn on_unsubscribe(
        &self,
        _session: &ServerSession,
        _subscription: &ServerSubscription,
    ) -> Result<()> {
        Ok(())
    }

    /// Handle an ACK frame.
    async fn on_ack(&self, _session: &ServerSession, _frame: &FrameHead) -> Result<()> { Ok(()) }

    /// Handle a NACK frame.
    async fn on_nack(&self, _session: &ServerSession, _frame: &FrameHead) -> Result<()> { Ok(()) }

    /// A transaction was opened.
    async fn on_begin(&self, _session: &ServerSession, _transaction: &str) -> Result<()> { Ok(()) }

    /// A transaction was committed.
    async fn on_commit(&self, _session: &ServerSession, _transaction: &str) -> Result<()> { Ok(()) }

    /// A transaction was rolled back.
    async fn on_abort(&self, _session: &ServerSession, _transaction: &str) -> Result<()> { Ok(()) }

    /// The client asked to disconnect.
    async fn on_disconnect(&self, _session: &ServerSession) {}
}
