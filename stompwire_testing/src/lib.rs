//! Utilities for exercising `stompwire` codecs and connections in tests.
//!
//! The helpers decode raw byte streams into whole frames, run code under
//! test against an in-memory duplex stream, and expose a [`RawPeer`] that
//! speaks the wire format by hand.
//!
//! ```rust
//! use stompwire::ProtocolVersion;
//! use stompwire_testing::decode_all;
//!
//! let frames = decode_all(b"SEND\ndestination:/q\n\nhi\0", ProtocolVersion::V1_2).unwrap();
//! assert_eq!(frames[0].head.command, "SEND");
//! assert_eq!(frames[0].body, b"hi");
//! ```

pub mod helpers;
pub mod logging;
pub mod metrics;

pub use helpers::{
    DecodedFrame,
    RawPeer,
    decode_all,
    decode_in_chunks,
    decode_with,
    drive_with_bytes,
    encode_all,
    peer_pair,
};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricsSnapshot, debugging_recorder_setup};
