//! Server side of a single transport.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    config::ServerConfig,
    handler::ServerHandler,
    handlers,
    session::ServerSession,
    state::ServerState,
};
use crate::{
    connection::{self, ConnectionCore, ConnectionEvents},
    error::ConnectionError,
};

/// A server connection awaiting or past its CONNECT handshake.
///
/// Unlike [`crate::client::ClientConnection`], dropping this handle does not
/// close the connection; it runs until the client disconnects, the transport
/// fails or [`ServerConnection::destroy`] is called.
#[derive(Clone, Debug)]
pub struct ServerConnection {
    session: ServerSession,
}

impl ServerConnection {
    /// Start serving `transport`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn accept<T, H>(transport: T, config: ServerConfig, handler: Arc<H>) -> (Self, ConnectionEvents)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
        H: ServerHandler,
    {
        let connection_config = config.connection.clone();
        let state = Arc::new(ServerState::new(config, handler));
        let (core, events) = connection::spawn(
            transport,
            connection_config,
            Arc::clone(&state),
            handlers::connecting_table(),
        );
        let session = ServerSession::new(core, state);
        (Self { session }, events)
    }

    /// Handle passed to [`ServerHandler`] hooks.
    #[must_use]
    pub fn session(&self) -> &ServerSession { &self.session }

    /// The underlying connection.
    #[must_use]
    pub fn core(&self) -> &Arc<ConnectionCore> { self.session.core() }

    /// Wait until the connection is destroyed.
    pub async fn closed(&self) { self.core().closed().await; }

    /// Close the connection, reporting `error` if given.
    pub fn destroy(&self, error: Option<ConnectionError>) { self.core().destroy(error); }
}
