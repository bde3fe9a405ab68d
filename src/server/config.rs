//! Server configuration.

use serde::Deserialize;

use super::runtime::BackoffConfig;
use crate::{config::ConnectionConfig, heartbeat::HeartbeatConfig, version::ProtocolVersion};

/// Settings shared by every connection a server accepts.
///
/// # Examples
///
/// ```
/// use stompwire::{ProtocolVersion, server::ServerConfig};
///
/// let config = ServerConfig::default()
///     .supported_versions([ProtocolVersion::V1_2])
///     .server_name(Some("broker/1.0".into()));
/// assert_eq!(config.supported_versions, [ProtocolVersion::V1_2]);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Versions the server will negotiate.
    pub supported_versions: Vec<ProtocolVersion>,
    /// Heartbeat offer sent in CONNECTED.
    pub heart_beat: HeartbeatConfig,
    /// Value of the `server` header in CONNECTED; omitted when `None`.
    pub server_name: Option<String>,
    /// Connection tuning.
    pub connection: ConnectionConfig,
    /// Accept-loop retry timing.
    #[serde(skip)]
    pub backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            supported_versions: ProtocolVersion::ALL.to_vec(),
            heart_beat: HeartbeatConfig::DISABLED,
            server_name: Some(concat!("stompwire/", env!("CARGO_PKG_VERSION")).to_owned()),
            connection: ConnectionConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the versions the server accepts.
    #[must_use]
    pub fn supported_versions(mut self, versions: impl IntoIterator<Item = ProtocolVersion>) -> Self {
        self.supported_versions = versions.into_iter().collect();
        self
    }

    /// Set the heartbeat offer.
    #[must_use]
    pub fn heart_beat(mut self, offer: HeartbeatConfig) -> Self {
        self.heart_beat = offer;
        self
    }

    /// Set or clear the `server` header.
    #[must_use]
    pub fn server_name(mut self, name: Option<String>) -> Self {
        self.server_name = name;
        self
    }

    /// Replace the connection tuning.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Replace the accept-loop back-off.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Comma-separated list for `version` headers on ERROR frames.
    pub(crate) fn version_list(&self) -> String {
        let ids: Vec<&str> = self.supported_versions.iter().map(|v| v.as_str()).collect();
        ids.join(",")
    }
}
