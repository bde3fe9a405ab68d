//! Protocol versions and their header escaping rules.
//!
//! | Version | Escaped octets            |
//! |---------|---------------------------|
//! | `1.0`   | none                      |
//! | `1.1`   | `\\`, `\n`, `:`           |
//! | `1.2`   | `\\`, `\r`, `\n`, `:`     |
//!
//! The tables are symmetric: the encoder escapes exactly what the decoder
//! unescapes. [`VersionCell`] holds the negotiated version shared by a
//! connection's decoder and encoder so both switch together.

use std::{
    borrow::Cow,
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use serde::Deserialize;

use crate::codec::FrameError;

/// Wire-format revision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum ProtocolVersion {
    /// No header escaping.
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
    /// Escapes backslash, line feed and colon.
    #[serde(rename = "1.1")]
    V1_1,
    /// Additionally escapes carriage return.
    #[serde(rename = "1.2")]
    V1_2,
}

impl ProtocolVersion {
    /// Every version this crate understands, lowest first.
    pub const ALL: [Self; 3] = [Self::V1_0, Self::V1_1, Self::V1_2];

    /// Identifier used in `accept-version` and `version` headers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
        }
    }

    /// Parse a version identifier, returning `None` for unknown ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use stompwire::ProtocolVersion;
    ///
    /// assert_eq!(ProtocolVersion::from_id("1.1"), Some(ProtocolVersion::V1_1));
    /// assert_eq!(ProtocolVersion::from_id("2.0"), None);
    /// ```
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim() {
            "1.0" => Some(Self::V1_0),
            "1.1" => Some(Self::V1_1),
            "1.2" => Some(Self::V1_2),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::V1_0 => 0,
            Self::V1_1 => 1,
            Self::V1_2 => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::V1_1,
            2 => Self::V1_2,
            _ => Self::V1_0,
        }
    }

    /// Escape a command or header token for the wire.
    #[must_use]
    pub fn escape(self, token: &str) -> Cow<'_, str> {
        let needs_escape = |c: char| match self {
            Self::V1_0 => false,
            Self::V1_1 => matches!(c, '\\' | '\n' | ':'),
            Self::V1_2 => matches!(c, '\\' | '\r' | '\n' | ':'),
        };
        if !token.contains(needs_escape) {
            return Cow::Borrowed(token);
        }
        let mut out = String::with_capacity(token.len() + 4);
        for c in token.chars() {
            match c {
                '\\' if needs_escape(c) => out.push_str("\\\\"),
                '\n' if needs_escape(c) => out.push_str("\\n"),
                '\r' if needs_escape(c) => out.push_str("\\r"),
                ':' if needs_escape(c) => out.push_str("\\c"),
                other => out.push(other),
            }
        }
        Cow::Owned(out)
    }

    /// Decode a raw command or header token received from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::UndefinedEscapeSequence`] for an escape the
    /// version does not define, or [`FrameError::InvalidUtf8`] if the decoded
    /// token is not UTF-8.
    pub fn unescape(self, raw: &[u8]) -> Result<String, FrameError> {
        if self == Self::V1_0 || !raw.contains(&b'\\') {
            return String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8);
        }
        let mut out = Vec::with_capacity(raw.len());
        let mut bytes = raw.iter().copied();
        while let Some(b) = bytes.next() {
            if b != b'\\' {
                out.push(b);
                continue;
            }
            let decoded = match (self, bytes.next()) {
                (_, Some(b'n')) => b'\n',
                (_, Some(b'c')) => b':',
                (_, Some(b'\\')) => b'\\',
                (Self::V1_2, Some(b'r')) => b'\r',
                (_, other) => {
                    return Err(FrameError::UndefinedEscapeSequence {
                        sequence: other.map(|c| char::from(c).to_string()).unwrap_or_default(),
                    });
                }
            };
            out.push(decoded);
        }
        String::from_utf8(out).map_err(|_| FrameError::InvalidUtf8)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when parsing an unknown version identifier.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol version: {0}")]
pub struct UnknownVersion(pub String);

impl FromStr for ProtocolVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| UnknownVersion(s.to_owned()))
    }
}

/// Pick the highest version present in both the peer's `accept-version`
/// list and `supported`.
///
/// An absent header means the peer only speaks `1.0`.
///
/// # Examples
///
/// ```
/// use stompwire::{ProtocolVersion, negotiate_version};
///
/// let chosen = negotiate_version(Some("1.0,1.1"), &ProtocolVersion::ALL);
/// assert_eq!(chosen, Some(ProtocolVersion::V1_1));
/// assert_eq!(
///     negotiate_version(None, &ProtocolVersion::ALL),
///     Some(ProtocolVersion::V1_0)
/// );
/// ```
#[must_use]
pub fn negotiate_version(
    accept_version: Option<&str>,
    supported: &[ProtocolVersion],
) -> Option<ProtocolVersion> {
    let Some(list) = accept_version else {
        return supported
            .contains(&ProtocolVersion::V1_0)
            .then_some(ProtocolVersion::V1_0);
    };
    list.split(',')
        .filter_map(ProtocolVersion::from_id)
        .filter(|v| supported.contains(v))
        .max()
}

/// Negotiated version shared between a decoder and an encoder.
///
/// Cloning yields a handle to the same cell, so a single
/// [`VersionCell::set`] switches every holder at once.
#[derive(Clone, Debug, Default)]
pub struct VersionCell(Arc<AtomicU8>);

impl VersionCell {
    /// Create a cell holding `version`.
    #[must_use]
    pub fn new(version: ProtocolVersion) -> Self { Self(Arc::new(AtomicU8::new(version.to_u8()))) }

    /// Current version.
    #[must_use]
    pub fn get(&self) -> ProtocolVersion { ProtocolVersion::from_u8(self.0.load(Ordering::Acquire)) }

    /// Switch to `version`.
    pub fn set(&self, version: ProtocolVersion) { self.0.store(version.to_u8(), Ordering::Release); }

    /// Switch to the version named by `id`.
    ///
    /// Returns `false` and leaves the current version in place when `id` is
    /// not recognised.
    pub fn set_id(&self, id: &str) -> bool {
        match ProtocolVersion::from_id(id) {
            Some(version) => {
                self.set(version);
                true
            }
            None => false,
        }
    }
}
