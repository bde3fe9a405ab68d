//! Acknowledgement modes and the headers ACK/NACK frames carry.
//!
//! The identifying headers changed between protocol versions:
//!
//! | Version | ACK/NACK identifies the message by        |
//! |---------|-------------------------------------------|
//! | `1.0`   | `message-id`                              |
//! | `1.1`   | `message-id` and `subscription`           |
//! | `1.2`   | `id` (copied from the MESSAGE's `ack`)    |

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{
    error::{ConnectionError, Result},
    frame::{FrameHead, Headers, header},
    version::ProtocolVersion,
};

/// How a subscriber acknowledges messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckMode {
    /// Messages count as acknowledged once sent.
    #[default]
    Auto,
    /// An ACK covers the message and every earlier one.
    Client,
    /// An ACK covers only the named message.
    ClientIndividual,
}

impl AckMode {
    /// Value used in the `ack` header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Client => "client",
            Self::ClientIndividual => "client-individual",
        }
    }

    /// Returns true when the subscriber must send ACK or NACK frames.
    #[must_use]
    pub fn requires_ack(self) -> bool { self != Self::Auto }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for AckMode {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "client" => Ok(Self::Client),
            "client-individual" => Ok(Self::ClientIndividual),
            _ => Err(ConnectionError::InvalidHeader {
                name: header::ACK,
                value: s.to_owned(),
            }),
        }
    }
}

/// Headers an ACK or NACK must carry under `version`.
#[must_use]
pub fn required_ack_headers(version: ProtocolVersion) -> &'static [&'static str] {
    match version {
        ProtocolVersion::V1_0 => &[header::MESSAGE_ID],
        ProtocolVersion::V1_1 => &[header::MESSAGE_ID, header::SUBSCRIPTION],
        ProtocolVersion::V1_2 => &[header::ID],
    }
}

/// Build the identifying headers for acknowledging `message` under
/// `version`.
///
/// # Errors
///
/// Returns [`ConnectionError::MissingHeader`] when the MESSAGE frame lacks
/// the header the version identifies it by.
pub fn ack_headers(version: ProtocolVersion, message: &FrameHead) -> Result<Headers> {
    let copy = |name: &'static str| {
        message
            .header(name)
            .ok_or(ConnectionError::MissingHeader { name })
    };
    let mut headers = Headers::new();
    match version {
        ProtocolVersion::V1_2 => headers.insert(header::ID, copy(header::ACK)?),
        ProtocolVersion::V1_1 => {
            headers.insert(header::MESSAGE_ID, copy(header::MESSAGE_ID)?);
            headers.insert(header::SUBSCRIPTION, copy(header::SUBSCRIPTION)?);
        }
        ProtocolVersion::V1_0 => headers.insert(header::MESSAGE_ID, copy(header::MESSAGE_ID)?),
    }
    Ok(headers)
}
