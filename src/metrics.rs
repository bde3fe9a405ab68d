//! Metric helpers for `stompwire`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) macros. With
//! the `metrics` feature disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::error::ErrorClass;

/// Gauge of connections that have not yet been destroyed.
pub const CONNECTIONS_ACTIVE: &str = "stompwire_connections_active";
/// Counter of frames read or written, labelled by `direction`.
pub const FRAMES_PROCESSED: &str = "stompwire_frames_processed_total";
/// Counter of connections destroyed with an error, labelled by `class`.
pub const ERRORS_TOTAL: &str = "stompwire_errors_total";

/// Direction of a processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames decoded from the transport.
    Inbound,
    /// Frames written to the transport.
    Outbound,
}

impl Direction {
    /// Label value for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a processed frame.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connection destroyed with an error of `class`.
pub fn inc_errors(class: ErrorClass) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "class" => class.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = class;
}
