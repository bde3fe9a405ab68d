//! Server role.
//!
//! [`ServerConnection::accept`] serves one transport: it answers the
//! CONNECT/STOMP handshake, validates the client commands and hands them to
//! a [`ServerHandler`]. Handlers push MESSAGE frames back through the
//! [`ServerSession`] they are given. [`serve`] runs the accept loop for a
//! TCP listener.
//!
//! A failing handler, or a client that violates the protocol, gets an ERROR
//! frame carrying the failed request's `receipt-id` before the connection is
//! closed.

mod config;
mod connection;
mod handler;
mod handlers;
mod runtime;
mod session;
mod state;

pub use config::ServerConfig;
pub use connection::ServerConnection;
pub use handler::ServerHandler;
pub use runtime::{BackoffConfig, serve};
pub use session::{ServerSession, ServerSubscription};

#[cfg(test)]
mod tests;
