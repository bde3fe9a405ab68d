#![doc(html_root_url = "https://docs.rs/stompwire/latest")]
//! Public API for the `stompwire` library.
//!
//! `stompwire` speaks a STOMP-style text framing protocol over any async
//! byte stream. Frames are decoded incrementally, so a large body is
//! delivered as a stream of chunks instead of being buffered whole, and
//! outbound bodies are written as they are produced with back-pressure
//! from the transport.
//!
//! The layers, bottom up:
//!
//! - [`codec`]: the incremental [`FrameDecoder`](codec::FrameDecoder) and
//!   [`FrameEncoder`](codec::FrameEncoder).
//! - [`reader`] and [`writer`]: per-transport frame reading with streamed
//!   bodies, and ordered frame writing through a [`FrameQueue`].
//! - [`heartbeat`]: negotiated heart-beating and inactivity detection.
//! - [`connection`]: the shared connection state machine that dispatches
//!   inbound commands, tracks receipts and reports lifecycle events.
//! - [`client`] and [`server`]: the two protocol roles.
//!
//! # Examples
//!
//! ```no_run
//! use stompwire::{ClientConfig, HeartbeatConfig, client::ClientConnection};
//! use std::time::Duration;
//!
//! # async fn run() -> stompwire::Result<()> {
//! let config = ClientConfig::default().heart_beat(HeartbeatConfig::new(
//!     Duration::from_secs(10),
//!     Duration::from_secs(10),
//! ));
//! let (client, _events) = ClientConnection::connect_tcp("127.0.0.1:61613", config).await?;
//! println!("negotiated {}", client.version());
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod ack;
pub mod body;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod metrics;
pub mod panic;
pub mod reader;
pub mod server;
pub mod version;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use ack::AckMode;
pub use body::{BodyWriter, FrameBody, InboundFrame, PendingFrame};
pub use client::{ClientConfig, ClientConnection};
pub use config::ConnectionConfig;
pub use connection::{ConnectedInfo, ConnectionEvent, ConnectionEvents, Receipt, SendOptions};
pub use error::{ConnectionError, ErrorClass, ErrorKind, Result};
pub use frame::{FrameHead, Headers, OutgoingFrame};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, NegotiatedHeartbeat};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use reader::FrameReader;
pub use server::{ServerConfig, ServerConnection, ServerHandler, serve};
pub use version::{ProtocolVersion, VersionCell, negotiate_version};
pub use writer::{FrameQueue, FrameWriter};
