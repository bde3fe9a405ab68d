//! Unit tests for the frame decoder and encoder.
//!
//! Covers the grammar edge cases, ceilings, chunk-boundary independence and
//! end-of-stream handling.

use bytes::BytesMut;
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::{
    frame::{FrameHead, OutgoingFrame},
    version::{ProtocolVersion, VersionCell},
};

/// A decoded frame with its body chunks joined.
#[derive(Debug, PartialEq, Eq)]
struct Decoded {
    head: FrameHead,
    body: Vec<u8>,
}

fn collect(events: Vec<FrameEvent>) -> Vec<Decoded> {
    let mut frames = Vec::new();
    let mut current: Option<Decoded> = None;
    for event in events {
        match event {
            FrameEvent::Head(head) => {
                assert!(current.is_none(), "head emitted before previous end");
                current = Some(Decoded {
                    head,
                    body: Vec::new(),
                });
            }
            FrameEvent::Body(chunk) => current
                .as_mut()
                .expect("body without head")
                .body
                .extend_from_slice(&chunk),
            FrameEvent::End => frames.push(current.take().expect("end without head")),
        }
    }
    assert!(current.is_none(), "unterminated frame");
    frames
}

fn feed(decoder: &mut FrameDecoder, input: &[u8], chunk: usize) -> Result<Vec<Decoded>, FrameError> {
    let mut events = Vec::new();
    let mut buf = BytesMut::new();
    for piece in input.chunks(chunk.max(1)) {
        buf.extend_from_slice(piece);
        while let Some(event) = decoder.decode(&mut buf)? {
            events.push(event);
        }
    }
    while let Some(event) = decoder.decode_eof(&mut buf)? {
        events.push(event);
    }
    Ok(collect(events))
}

fn decode_bytes(input: &[u8]) -> Result<Vec<Decoded>, FrameError> {
    feed(&mut FrameDecoder::default(), input, input.len())
}

fn limited(max_line_length: usize, max_headers: usize) -> FrameDecoder {
    FrameDecoder::new(
        DecoderLimits {
            max_line_length,
            max_headers,
        },
        VersionCell::default(),
    )
}

#[test]
fn fixed_length_body_may_contain_nul_bytes() {
    let input = b"MESSAGE\ncontent-length:4\n\n\x00\x00\x00\x00\x00MESSAGE\n\nABC\x00";
    let frames = decode_bytes(input).expect("valid input");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].body, [0, 0, 0, 0]);
    assert_eq!(frames[1].body, b"ABC");
    assert_eq!(frames[1].head.command, "MESSAGE");
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(7)]
#[case(64)]
fn chunk_boundaries_do_not_change_output(#[case] chunk: usize) {
    let input: &[u8] = b"SEND\r\ndestination:/q\r\ncontent-length:3\r\n\r\nx\0y\0\r\n\n\nSEND\ndestination:/r\n\nhello\0\n";
    let whole = decode_bytes(input).expect("valid input");
    let chunked = feed(&mut FrameDecoder::default(), input, chunk).expect("valid input");
    assert_eq!(whole, chunked);
    assert_eq!(whole[0].body, b"x\0y");
    assert_eq!(whole[1].body, b"hello");
}

#[test]
fn head_is_emitted_before_body_arrives() {
    let mut decoder = FrameDecoder::default();
    let mut buf = BytesMut::from(&b"MESSAGE\ndestination:/a\n\npart"[..]);
    let head = decoder.decode(&mut buf).expect("decode");
    assert!(matches!(head, Some(FrameEvent::Head(ref h)) if h.command == "MESSAGE"));
    assert_eq!(
        decoder.decode(&mut buf).expect("decode"),
        Some(FrameEvent::Body("part".into()))
    );
    assert_eq!(decoder.decode(&mut buf).expect("decode"), None);
    assert_eq!(decoder.state(), ParserState::DelimitedBody);
    assert!(decoder.is_parsing_frame());
}

#[test]
fn duplicate_headers_keep_first_value() {
    let frames = decode_bytes(b"MESSAGE\nfoo:1\nfoo:2\n\n\0").expect("valid input");
    assert_eq!(frames[0].head.header("foo"), Some("1"));
    assert_eq!(frames[0].head.headers.len(), 1);
}

#[test]
fn header_value_may_contain_colons_in_1_0() {
    let frames = decode_bytes(b"SEND\ndestination:a:b:c\n\n\0").expect("valid input");
    assert_eq!(frames[0].head.header("destination"), Some("a:b:c"));
}

#[test]
fn heartbeats_between_frames_are_skipped() {
    let frames = decode_bytes(b"\n\r\n\nRECEIPT\nreceipt-id:1\n\n\0\n\n").expect("valid input");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].head.header("receipt-id"), Some("1"));
}

/// Any run of CR/LF bytes after a frame is accepted, including a lone CR.
/// This is a deliberate leniency rather than something the grammar demands.
#[test]
fn trailer_accepts_any_run_of_terminator_bytes() {
    let frames = decode_bytes(b"A\n\n\0\r\r\n\n\r\nB\n\n\0").expect("lenient trailer");
    let commands: Vec<_> = frames.iter().map(|f| f.head.command.as_str()).collect();
    assert_eq!(commands, ["A", "B"]);
}

#[test]
fn line_ceiling_fails_before_any_frame_is_emitted() {
    let mut decoder = limited(2, DEFAULT_MAX_HEADERS);
    let mut buf = BytesMut::from(&b"MESSAGE\n\n"[..]);
    let err = decoder.decode(&mut buf).expect_err("line too long");
    assert!(matches!(err, FrameError::LineTooLong { max: 2 }));
}

#[test]
fn line_ceiling_applies_to_unterminated_lines() {
    let mut decoder = limited(4, DEFAULT_MAX_HEADERS);
    let mut buf = BytesMut::from(&b"MESSAGE"[..]);
    let err = decoder.decode(&mut buf).expect_err("line too long");
    assert!(matches!(err, FrameError::LineTooLong { max: 4 }));
}

#[test]
fn line_ceiling_does_not_apply_to_bodies() {
    let mut decoder = limited(8, DEFAULT_MAX_HEADERS);
    let frames = feed(&mut decoder, b"SEND\n\n0123456789abcdef\0", 32).expect("valid input");
    assert_eq!(frames[0].body.len(), 16);
}

#[test]
fn header_ceiling_is_enforced() {
    let mut decoder = limited(DEFAULT_MAX_LINE_LENGTH, 2);
    let err = feed(&mut decoder, b"SEND\na:1\nb:2\nc:3\n\n\0", 64).expect_err("too many headers");
    assert!(matches!(err, FrameError::TooManyHeaders { max: 2 }));
}

#[rstest]
#[case::negative(b"SEND\ncontent-length:-1\n\n\0".as_slice())]
#[case::text(b"SEND\ncontent-length:abc\n\n\0".as_slice())]
fn invalid_content_length_is_rejected(#[case] input: &[u8]) {
    let err = decode_bytes(input).expect_err("invalid content-length");
    assert!(matches!(err, FrameError::InvalidContentLength { .. }));
}

#[test]
fn fixed_length_body_requires_trailing_nul() {
    let err = decode_bytes(b"SEND\ncontent-length:2\n\nabc\0").expect_err("missing NUL");
    assert!(matches!(err, FrameError::ExpectedNullByte));
}

#[test]
fn header_without_separator_is_rejected() {
    let err = decode_bytes(b"SEND\nnocolon\n\n\0").expect_err("bad header");
    assert!(matches!(err, FrameError::InvalidHeaderLine { .. }));
}

#[rstest]
#[case::mid_headers(b"SEND\ndestination:/a\n".as_slice())]
#[case::mid_body(b"SEND\n\nabc".as_slice())]
#[case::mid_command(b"SEN".as_slice())]
#[case::before_nul(b"SEND\ncontent-length:1\n\nx".as_slice())]
fn end_of_stream_mid_frame_is_fatal(#[case] input: &[u8]) {
    let err = decode_bytes(input).expect_err("truncated frame");
    assert!(matches!(err, FrameError::UnexpectedEndOfStream));
}

#[test]
fn end_of_stream_between_frames_is_clean() {
    let frames = decode_bytes(b"SEND\n\n\0\n\n").expect("clean end");
    assert_eq!(frames.len(), 1);
}

#[test]
fn version_switch_applies_to_later_frames() {
    let mut decoder = FrameDecoder::default();
    let mut buf = BytesMut::from(&b"MESSAGE\nk:a\\cb\n\n\0"[..]);
    let events = std::iter::from_fn(|| decoder.decode(&mut buf).expect("decode")).collect();
    assert_eq!(collect(events)[0].head.header("k"), Some("a\\cb"));

    decoder.set_version(ProtocolVersion::V1_1);
    buf.extend_from_slice(b"MESSAGE\nk:a\\cb\n\n\0");
    let events = std::iter::from_fn(|| decoder.decode(&mut buf).expect("decode")).collect();
    assert_eq!(collect(events)[0].head.header("k"), Some("a:b"));
}

#[test]
fn undefined_escape_is_rejected_after_negotiation() {
    let mut decoder = FrameDecoder::new(
        DecoderLimits::default(),
        VersionCell::new(ProtocolVersion::V1_1),
    );
    let err = feed(&mut decoder, b"MESSAGE\nk:a\\rb\n\n\0", 64).expect_err("undefined escape");
    assert!(matches!(err, FrameError::UndefinedEscapeSequence { .. }));
}

#[test]
fn handshake_headers_are_not_unescaped() {
    let mut decoder = FrameDecoder::new(
        DecoderLimits::default(),
        VersionCell::new(ProtocolVersion::V1_2),
    );
    let frames = feed(&mut decoder, b"CONNECTED\nserver:a\\b\n\n\0", 64).expect("valid");
    assert_eq!(frames[0].head.header("server"), Some("a\\b"));
}

#[test]
fn encoder_writes_frames_in_chunks() {
    let mut encoder = FrameEncoder::new(VersionCell::new(ProtocolVersion::V1_2));
    let mut buf = BytesMut::new();
    let head = FrameHead::new("SEND").with_header("destination", "a:b\r");
    for chunk in [
        OutboundChunk::Head(head),
        OutboundChunk::Body("12".into()),
        OutboundChunk::Body("34".into()),
        OutboundChunk::Terminator,
        OutboundChunk::Heartbeat,
    ] {
        encoder.encode(chunk, &mut buf).expect("encode");
    }
    assert_eq!(&buf[..], b"SEND\ndestination:a\\cb\\r\n\n1234\0\n\n");
}

#[test]
fn encoder_leaves_handshake_frames_unescaped() {
    let frame = OutgoingFrame::new(FrameHead::new("CONNECTED").with_header("server", "x:y"));
    let mut buf = BytesMut::new();
    encode_frame(&frame, ProtocolVersion::V1_2, &mut buf);
    assert_eq!(&buf[..], b"CONNECTED\nserver:x:y\n\n\0\n");
}

#[rstest]
#[case(ProtocolVersion::V1_0)]
#[case(ProtocolVersion::V1_1)]
#[case(ProtocolVersion::V1_2)]
fn encoded_frames_decode_with_the_same_version(#[case] version: ProtocolVersion) {
    let value = if version == ProtocolVersion::V1_0 {
        "plain value"
    } else {
        "line\nbreak:colon\\slash"
    };
    let frame = OutgoingFrame::new(FrameHead::new("SEND").with_header("x", value)).with_body("body");
    let mut buf = BytesMut::new();
    encode_frame(&frame, version, &mut buf);

    let mut decoder = FrameDecoder::new(DecoderLimits::default(), VersionCell::new(version));
    let frames = feed(&mut decoder, &buf, buf.len()).expect("decode");
    assert_eq!(frames[0].head, frame.head);
    assert_eq!(frames[0].body, b"body");
}
