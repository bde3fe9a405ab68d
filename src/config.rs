//! Per-connection tuning shared by the client and server roles.

use std::time::Duration;

use serde::Deserialize;

use crate::codec::{DEFAULT_MAX_HEADERS, DEFAULT_MAX_LINE_LENGTH, DecoderLimits};

const DEFAULT_BODY_CAPACITY: usize = 16;
const DEFAULT_HEARTBEAT_INPUT_MARGIN_MS: u64 = 100;
const DEFAULT_ERROR_FLUSH_TIMEOUT_MS: u64 = 1000;

/// Limits and timer margins applied to a single connection.
///
/// All fields have defaults, so a partial document deserialises cleanly.
///
/// # Examples
///
/// ```
/// use stompwire::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .max_headers(16)
///     .inbound_body_capacity(4);
/// assert_eq!(config.decoder_limits().max_headers, 16);
/// assert_eq!(config.decoder_limits().max_line_length, 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Ceiling for command and header lines, in bytes.
    pub max_line_length: usize,
    /// Ceiling for header lines per frame.
    pub max_headers: usize,
    /// Body chunks buffered between the reader and a slow consumer.
    pub inbound_body_capacity: usize,
    /// Body chunks buffered between a producer and the writer.
    pub outbound_body_capacity: usize,
    /// Slack added to the negotiated incoming heartbeat window.
    pub heartbeat_input_margin_ms: u64,
    /// Amount by which outgoing heartbeats are sent early.
    pub heartbeat_output_margin_ms: u64,
    /// Bound on flushing a final ERROR frame before the transport closes.
    pub error_flush_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_headers: DEFAULT_MAX_HEADERS,
            inbound_body_capacity: DEFAULT_BODY_CAPACITY,
            outbound_body_capacity: DEFAULT_BODY_CAPACITY,
            heartbeat_input_margin_ms: DEFAULT_HEARTBEAT_INPUT_MARGIN_MS,
            heartbeat_output_margin_ms: 0,
            error_flush_timeout_ms: DEFAULT_ERROR_FLUSH_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Set the line-length ceiling.
    #[must_use]
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Set the header-count ceiling.
    #[must_use]
    pub fn max_headers(mut self, count: usize) -> Self {
        self.max_headers = count;
        self
    }

    /// Set the inbound body buffer, in chunks. Values below one are raised
    /// to one.
    #[must_use]
    pub fn inbound_body_capacity(mut self, chunks: usize) -> Self {
        self.inbound_body_capacity = chunks.max(1);
        self
    }

    /// Set the outbound body buffer, in chunks. Values below one are raised
    /// to one.
    #[must_use]
    pub fn outbound_body_capacity(mut self, chunks: usize) -> Self {
        self.outbound_body_capacity = chunks.max(1);
        self
    }

    /// Set the slack added to the incoming heartbeat window.
    #[must_use]
    pub fn heartbeat_input_margin(mut self, margin: Duration) -> Self {
        self.heartbeat_input_margin_ms = duration_ms(margin);
        self
    }

    /// Send outgoing heartbeats this much earlier than negotiated.
    #[must_use]
    pub fn heartbeat_output_margin(mut self, margin: Duration) -> Self {
        self.heartbeat_output_margin_ms = duration_ms(margin);
        self
    }

    /// Bound the wait for a final ERROR frame to reach the transport.
    #[must_use]
    pub fn error_flush_timeout(mut self, timeout: Duration) -> Self {
        self.error_flush_timeout_ms = duration_ms(timeout);
        self
    }

    /// Decoder ceilings derived from this configuration.
    #[must_use]
    pub fn decoder_limits(&self) -> DecoderLimits {
        DecoderLimits {
            max_line_length: self.max_line_length,
            max_headers: self.max_headers,
        }
    }

    pub(crate) fn heartbeat_input_margin_duration(&self) -> Duration {
        Duration::from_millis(self.heartbeat_input_margin_ms)
    }

    pub(crate) fn heartbeat_output_margin_duration(&self) -> Duration {
        Duration::from_millis(self.heartbeat_output_margin_ms)
    }

    pub(crate) fn error_flush_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.error_flush_timeout_ms)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
