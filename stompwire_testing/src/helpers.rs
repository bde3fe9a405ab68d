//! Helpers for decoding, encoding and driving raw frame streams.

mod codec;
mod drive;
mod peer;

pub use codec::{DecodedFrame, decode_all, decode_in_chunks, decode_with, encode_all};
pub use drive::drive_with_bytes;
pub use peer::{RawPeer, peer_pair};

/// Duplex buffer size used when a helper is not given one.
pub const DEFAULT_CAPACITY: usize = 4096;
