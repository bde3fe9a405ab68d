//! Frame decoder state machine.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{DecoderLimits, FrameError, FrameEvent};
use crate::{
    frame::{FrameHead, is_handshake_command},
    version::{ProtocolVersion, VersionCell},
};

/// Position of the decoder within the frame grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for a command line. Empty lines are heartbeats.
    CommandLine,
    /// Reading `name:value` lines until a blank line.
    HeaderLine,
    /// Forwarding a body whose length was declared by `content-length`.
    FixedLengthBody {
        /// Body bytes still expected.
        remaining: usize,
    },
    /// Forwarding a body terminated by the first NUL byte.
    DelimitedBody,
    /// Expecting the NUL byte that closes a fixed-length body.
    NullByte,
    /// Skipping line terminators between frames.
    Trailer,
}

enum HeaderStep {
    NeedMore,
    Parsed,
    Complete(FrameHead),
}

/// Handshake frames are never escaped, whatever the negotiated version.
fn token_version(cell: &VersionCell, current: Option<&FrameHead>) -> ProtocolVersion {
    match current {
        Some(head) if is_handshake_command(&head.command) => ProtocolVersion::V1_0,
        _ => cell.get(),
    }
}

/// Incremental decoder producing [`FrameEvent`]s.
///
/// The decoder holds at most one partially parsed frame. Its state persists
/// across calls, so input may arrive one byte at a time or in large chunks.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use stompwire::codec::{FrameDecoder, FrameEvent};
/// use tokio_util::codec::Decoder;
///
/// let mut decoder = FrameDecoder::default();
/// let mut buf = BytesMut::from(&b"MESSAGE\n\nABC\x00"[..]);
/// let Some(FrameEvent::Head(head)) = decoder.decode(&mut buf)? else {
///     panic!("expected a frame head");
/// };
/// assert_eq!(head.command, "MESSAGE");
/// assert_eq!(decoder.decode(&mut buf)?, Some(FrameEvent::Body("ABC".into())));
/// assert_eq!(decoder.decode(&mut buf)?, Some(FrameEvent::End));
/// # Ok::<(), stompwire::codec::FrameError>(())
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    state: ParserState,
    limits: DecoderLimits,
    version: VersionCell,
    current: Option<FrameHead>,
    header_lines: usize,
    parsing_frame: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self { Self::new(DecoderLimits::default(), VersionCell::default()) }
}

impl FrameDecoder {
    /// Create a decoder enforcing `limits` and reading escape rules from
    /// `version`.
    #[must_use]
    pub fn new(limits: DecoderLimits, version: VersionCell) -> Self {
        Self {
            state: ParserState::CommandLine,
            limits,
            version,
            current: None,
            header_lines: 0,
            parsing_frame: false,
        }
    }

    /// Current parser state.
    #[must_use]
    pub fn state(&self) -> ParserState { self.state }

    /// Returns true while a frame is between its command line and its
    /// terminator.
    #[must_use]
    pub fn is_parsing_frame(&self) -> bool { self.parsing_frame }

    /// Switch the escape table for all subsequently parsed tokens.
    pub fn set_version(&self, version: ProtocolVersion) { self.version.set(version); }

    /// Shared version cell consulted by this decoder.
    #[must_use]
    pub fn version(&self) -> &VersionCell { &self.version }

    /// Split one terminated line off `src`, stripping `\n` and an optional
    /// preceding `\r`.
    fn take_line(&self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        let max = self.limits.max_line_length;
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            // One extra byte allows for a `\r` awaiting its `\n`.
            if src.len() > max.saturating_add(1) {
                return Err(FrameError::LineTooLong { max });
            }
            return Ok(None);
        };
        let mut line = src.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        if line.len() > max {
            return Err(FrameError::LineTooLong { max });
        }
        Ok(Some(line))
    }

    fn parse_command_line(&mut self, src: &mut BytesMut) -> Result<bool, FrameError> {
        let Some(line) = self.take_line(src)? else {
            return Ok(false);
        };
        if line.is_empty() {
            trace!("heartbeat received");
            return Ok(true);
        }
        let command = self.version.get().unescape(&line)?;
        self.parsing_frame = true;
        self.header_lines = 0;
        self.current = Some(FrameHead::new(command));
        self.state = ParserState::HeaderLine;
        Ok(true)
    }

    fn parse_header_line(&mut self, src: &mut BytesMut) -> Result<HeaderStep, FrameError> {
        let Some(line) = self.take_line(src)? else {
            return Ok(HeaderStep::NeedMore);
        };
        let version = token_version(&self.version, self.current.as_ref());
        let Some(head) = self.current.as_mut() else {
            debug_assert!(false, "header line without a frame in progress");
            return Err(FrameError::UnexpectedEndOfStream);
        };
        if line.is_empty() {
            self.state = match head.headers.content_length() {
                None => ParserState::DelimitedBody,
                Some(Ok(0)) => ParserState::NullByte,
                Some(Ok(remaining)) => ParserState::FixedLengthBody { remaining },
                Some(Err(raw)) => {
                    return Err(FrameError::InvalidContentLength {
                        value: raw.to_owned(),
                    });
                }
            };
            return Ok(self
                .current
                .take()
                .map_or(HeaderStep::NeedMore, HeaderStep::Complete));
        }

        self.header_lines += 1;
        if self.header_lines > self.limits.max_headers {
            return Err(FrameError::TooManyHeaders {
                max: self.limits.max_headers,
            });
        }
        let Some(sep) = line.iter().position(|b| *b == b':') else {
            return Err(FrameError::InvalidHeaderLine {
                line: String::from_utf8_lossy(&line).into_owned(),
            });
        };
        let name = version.unescape(&line[..sep])?;
        let value = version.unescape(&line[sep + 1..])?;
        if !head.headers.insert_if_absent(name, value) {
            trace!(command = %head.command, "duplicate header ignored");
        }
        Ok(HeaderStep::Parsed)
    }

    fn finish_frame(&mut self) -> FrameEvent {
        self.parsing_frame = false;
        self.state = ParserState::Trailer;
        FrameEvent::End
    }
}

impl Decoder for FrameDecoder {
    type Item = FrameEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ParserState::CommandLine => {
                    if !self.parse_command_line(src)? {
                        return Ok(None);
                    }
                }
                ParserState::HeaderLine => match self.parse_header_line(src)? {
                    HeaderStep::NeedMore => return Ok(None),
                    HeaderStep::Parsed => {}
                    HeaderStep::Complete(head) => return Ok(Some(FrameEvent::Head(head))),
                },
                ParserState::FixedLengthBody { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(src.len());
                    let chunk = src.split_to(take).freeze();
                    let remaining = remaining - take;
                    self.state = if remaining == 0 {
                        ParserState::NullByte
                    } else {
                        ParserState::FixedLengthBody { remaining }
                    };
                    return Ok(Some(FrameEvent::Body(chunk)));
                }
                ParserState::NullByte => {
                    let Some(&byte) = src.first() else {
                        return Ok(None);
                    };
                    if byte != 0 {
                        return Err(FrameError::ExpectedNullByte);
                    }
                    src.advance(1);
                    return Ok(Some(self.finish_frame()));
                }
                ParserState::DelimitedBody => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(match src.iter().position(|b| *b == 0) {
                        Some(0) => {
                            src.advance(1);
                            self.finish_frame()
                        }
                        Some(pos) => FrameEvent::Body(src.split_to(pos).freeze()),
                        None => FrameEvent::Body(src.split().freeze()),
                    }));
                }
                ParserState::Trailer => {
                    let skip = src
                        .iter()
                        .take_while(|b| matches!(b, b'\r' | b'\n'))
                        .count();
                    src.advance(skip);
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.state = ParserState::CommandLine;
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        let leftover = src.iter().any(|b| !matches!(b, b'\r' | b'\n'));
        if self.parsing_frame || leftover {
            return Err(FrameError::UnexpectedEndOfStream);
        }
        src.clear();
        Ok(None)
    }
}
