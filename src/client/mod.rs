//! Client role.
//!
//! [`ClientConnection`] performs the CONNECT handshake over any duplex
//! transport and then exposes the client-side commands: SEND, SUBSCRIBE,
//! ACK/NACK, transactions and a receipted DISCONNECT. Inbound MESSAGE frames
//! are routed to the [`Subscription`] named by their `subscription` header.
//!
//! ```no_run
//! use stompwire::{
//!     Headers,
//!     SendOptions,
//!     client::{ClientConfig, ClientConnection},
//! };
//!
//! # async fn run() -> stompwire::Result<()> {
//! let (client, _events) =
//!     ClientConnection::connect_tcp("127.0.0.1:61613", ClientConfig::default()).await?;
//! let mut subscription = client.subscribe([("destination", "/queue/a")].into_iter().collect())?;
//! client
//!     .send_bytes(
//!         [("destination", "/queue/a")].into_iter().collect::<Headers>(),
//!         "hello",
//!         SendOptions::default(),
//!     )?
//!     .await?;
//! if let Some(message) = subscription.next_message().await {
//!     let body = message?.read_to_end().await?;
//!     assert_eq!(body, "hello");
//! }
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod handlers;
mod message;
mod runtime;
mod state;
mod subscription;
mod transaction;

pub use config::ClientConfig;
pub use message::Message;
pub use runtime::ClientConnection;
pub use subscription::Subscription;
pub use transaction::Transaction;

#[cfg(test)]
mod tests;
