//! Integration coverage for the `stompwire_testing` helpers.

use std::sync::Arc;

use stompwire::{
    ProtocolVersion,
    server::{ServerConfig, ServerConnection, ServerHandler},
};
use stompwire_testing::{decode_all, decode_in_chunks, drive_with_bytes};

struct AcceptAll;

impl ServerHandler for AcceptAll {}

#[tokio::test]
async fn drives_a_server_handshake_to_completion() {
    let input = vec![
        b"CONNECT\naccept-version:1.2\n\n\0".to_vec(),
        b"DISCONNECT\nreceipt:77\n\n\0".to_vec(),
    ];
    let out = drive_with_bytes(
        |io| async move {
            let (_connection, mut events) =
                ServerConnection::accept(io, ServerConfig::default(), Arc::new(AcceptAll));
            let _ = events.closed().await;
        },
        input,
        1024,
    )
    .await
    .expect("drive server");

    let frames = decode_all(&out, ProtocolVersion::V1_2).expect("decode output");
    let commands: Vec<_> = frames.iter().map(|f| f.head.command.as_str()).collect();
    assert_eq!(commands, ["CONNECTED", "RECEIPT"]);
    assert_eq!(frames[1].header("receipt-id"), Some("77"));
}

#[tokio::test]
async fn surfaces_panics_as_errors() {
    let err = drive_with_bytes(|_io| async { panic!("boom"); }, Vec::new(), 64)
        .await
        .expect_err("panic reported");
    assert!(err.to_string().starts_with("server task failed: boom"));
}

#[test]
fn chunked_decoding_matches_whole_decoding() {
    let wire = b"MESSAGE\nsubscription:0\n\nfirst\0\nMESSAGE\ncontent-length:3\n\na\0b\0";
    let whole = decode_all(wire, ProtocolVersion::V1_2).expect("whole");
    for size in 1..wire.len() {
        assert_eq!(decode_in_chunks(wire, size, ProtocolVersion::V1_2).expect("chunked"), whole);
    }
    assert_eq!(whole[1].body, b"a\0b");
}
