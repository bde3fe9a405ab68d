//! Client handshake configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    config::{ConnectionConfig, duration_ms},
    frame::{FrameHead, Headers, command, header},
    heartbeat::HeartbeatConfig,
    version::ProtocolVersion,
};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MESSAGE_CAPACITY: usize = 32;

/// Settings for [`ClientConnection::connect`](super::ClientConnection::connect).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use stompwire::{ClientConfig, HeartbeatConfig, ProtocolVersion};
///
/// let config = ClientConfig::default()
///     .host("broker.example")
///     .credentials("guest", "secret")
///     .accept_versions([ProtocolVersion::V1_1, ProtocolVersion::V1_2])
///     .heart_beat(HeartbeatConfig::new(
///         Duration::from_secs(10),
///         Duration::from_secs(10),
///     ));
/// assert_eq!(config.host, "broker.example");
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Virtual host sent in the `host` header.
    pub host: String,
    /// Login name.
    pub login: Option<String>,
    /// Login secret.
    pub passcode: Option<String>,
    /// Versions offered in `accept-version`.
    pub accept_versions: Vec<ProtocolVersion>,
    /// Heartbeat offer.
    pub heart_beat: HeartbeatConfig,
    /// Send `STOMP` instead of `CONNECT`.
    pub use_stomp_command: bool,
    /// Handshake deadline in milliseconds; `None` waits indefinitely.
    pub connect_timeout_ms: Option<u64>,
    /// Messages buffered per subscription.
    pub message_capacity: usize,
    /// Extra headers for the CONNECT frame.
    #[serde(skip)]
    pub connect_headers: Headers,
    /// Connection tuning.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "/".to_owned(),
            login: None,
            passcode: None,
            accept_versions: ProtocolVersion::ALL.to_vec(),
            heart_beat: HeartbeatConfig::DISABLED,
            use_stomp_command: false,
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            connect_headers: Headers::new(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Set the virtual host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set login credentials.
    #[must_use]
    pub fn credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    /// Set the versions offered to the server.
    #[must_use]
    pub fn accept_versions(mut self, versions: impl IntoIterator<Item = ProtocolVersion>) -> Self {
        self.accept_versions = versions.into_iter().collect();
        self
    }

    /// Set the heartbeat offer.
    #[must_use]
    pub fn heart_beat(mut self, offer: HeartbeatConfig) -> Self {
        self.heart_beat = offer;
        self
    }

    /// Add a header to the CONNECT frame.
    #[must_use]
    pub fn connect_header(mut self, name: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.connect_headers.insert(name, value);
        self
    }

    /// Bound the handshake; `None` waits indefinitely.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout_ms = timeout.map(duration_ms);
        self
    }

    /// Set the per-subscription message buffer.
    #[must_use]
    pub fn message_capacity(mut self, messages: usize) -> Self {
        self.message_capacity = messages.max(1);
        self
    }

    /// Replace the connection tuning.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub(crate) fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// The handshake frame described by this configuration.
    pub(crate) fn connect_frame(&self) -> FrameHead {
        let verb = if self.use_stomp_command {
            command::STOMP
        } else {
            command::CONNECT
        };
        let versions: Vec<&str> = self.accept_versions.iter().map(|v| v.as_str()).collect();
        let mut head = FrameHead::new(verb).with_headers(self.connect_headers.clone());
        head.headers.insert(header::ACCEPT_VERSION, versions.join(","));
        head.headers.insert(header::HOST, &self.host);
        head.headers.insert_opt(header::LOGIN, self.login.as_deref());
        head.headers.insert_opt(header::PASSCODE, self.passcode.as_deref());
        head.headers.insert(header::HEART_BEAT, self.heart_beat);
        head
    }
}
