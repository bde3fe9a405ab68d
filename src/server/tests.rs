//! Tests for the server role driven by a scripted client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::*;
use crate::{
    ConnectionError,
    ErrorKind,
    InboundFrame,
    ProtocolVersion,
    Result,
    connection::{ConnectionEvent, ConnectionEvents},
    frame::{FrameHead, Headers},
    test_support::{Peer, pair},
};

/// Echoes SEND bodies to matching subscriptions and records what it saw.
struct Recorder {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ServerHandler for Recorder {
    async fn on_connect(&self, _session: &ServerSession, request: &FrameHead) -> Result<()> {
        if request.header("login") == Some("intruder") {
            return Err(ConnectionError::rejected("access denied"));
        }
        Ok(())
    }

    async fn on_send(&self, session: &ServerSession, mut frame: InboundFrame) -> Result<()> {
        let destination = frame.header("destination").unwrap_or_default().to_owned();
        if destination == "/queue/panic" {
            panic!("handler exploded");
        }
        let body = frame.body.read_to_end().await?;
        for sub in session.subscriptions() {
            if sub.destination == destination {
                session.send_message(&sub.id, Headers::new(), body.clone())?;
            }
        }
        let _ = self.seen.send(format!(
            "SEND {destination} {}",
            String::from_utf8_lossy(&body)
        ));
        Ok(())
    }

    async fn on_commit(&self, _session: &ServerSession, transaction: &str) -> Result<()> {
        let _ = self.seen.send(format!("COMMIT {transaction}"));
        Ok(())
    }

    async fn on_disconnect(&self, _session: &ServerSession) { let _ = self.seen.send("DISCONNECT".into()); }
}

struct Harness {
    connection: ServerConnection,
    events: ConnectionEvents,
    peer: Peer,
    seen: mpsc::UnboundedReceiver<String>,
}

fn start(config: ServerConfig) -> Harness {
    let (local, peer) = pair();
    let (tx, seen) = mpsc::unbounded_channel();
    let (connection, events) = ServerConnection::accept(local, config, Arc::new(Recorder { seen: tx }));
    Harness {
        connection,
        events,
        peer,
        seen,
    }
}

async fn connected() -> Harness {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"CONNECT\naccept-version:1.2\nhost:/\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "CONNECTED");
    h.peer.set_version(ProtocolVersion::V1_2);
    h
}

#[tokio::test]
async fn handshake_picks_the_highest_common_version() {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"CONNECT\naccept-version:1.0,1.1\nhost:/\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "CONNECTED");
    assert_eq!(head.header("version"), Some("1.1"));
    assert_eq!(head.header("heart-beat"), Some("0,0"));
    assert_eq!(head.header("session"), Some(h.connection.session().id()));
    assert!(head.header("server").is_some_and(|s| s.starts_with("stompwire/")));

    match h.events.recv().await {
        Some(ConnectionEvent::Connected(info)) => assert_eq!(info.version, ProtocolVersion::V1_1),
        other => panic!("expected Connected, got {other:?}"),
    }
    assert_eq!(h.connection.session().version(), ProtocolVersion::V1_1);
}

#[tokio::test]
async fn stomp_command_and_missing_accept_version() {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"STOMP\nhost:/\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "CONNECTED");
    assert_eq!(head.header("version"), Some("1.0"));
}

#[tokio::test]
async fn unsupported_version_is_reported_with_the_supported_list() {
    let config = ServerConfig::default().supported_versions([ProtocolVersion::V1_2]);
    let mut h = start(config);
    h.peer.send(b"CONNECT\naccept-version:1.0,1.1\n\n\0").await;
    let (head, body) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    assert_eq!(head.header("version"), Some("1.2"));
    assert_eq!(head.header("content-type"), Some("text/plain"));
    assert!(!body.is_empty());

    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
    assert!(h.peer.is_closed().await);
}

#[tokio::test]
async fn commands_before_connect_are_refused() {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"SEND\ndestination:/queue/a\n\nearly\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
}

#[tokio::test]
async fn rejected_login_gets_an_error_frame() {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"CONNECT\naccept-version:1.2\nlogin:intruder\n\n\0").await;
    let (head, body) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    assert_eq!(head.header("message"), Some("request rejected: access denied"));
    assert_eq!(body, "request rejected: access denied");
    let err = h.events.closed().await.expect("error event");
    assert!(err.is_protocol());
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn malformed_heart_beat_is_invalid_not_missing() {
    let mut h = start(ServerConfig::default());
    h.peer.send(b"CONNECT\naccept-version:1.2\nheart-beat:10\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
    assert!(err.is_protocol());
}

#[tokio::test]
async fn send_is_delivered_to_matching_subscriptions() {
    let mut h = connected().await;
    h.peer
        .send(b"SUBSCRIBE\nid:s1\ndestination:/queue/a\nack:client-individual\nreceipt:r1\n\n\0")
        .await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "RECEIPT");
    assert_eq!(head.header("receipt-id"), Some("r1"));
    let sub = h.connection.session().subscription("s1").expect("registered");
    assert_eq!(sub.ack, crate::AckMode::ClientIndividual);

    h.peer.send(b"SEND\ndestination:/queue/a\n\nhello\0").await;
    let (head, body) = h.peer.next().await;
    assert_eq!(head.command, "MESSAGE");
    assert_eq!(head.header("subscription"), Some("s1"));
    assert_eq!(head.header("destination"), Some("/queue/a"));
    let message_id = head.header("message-id").expect("message-id");
    assert_eq!(head.header("ack"), Some(message_id));
    assert_eq!(body, "hello");
    assert_eq!(h.seen.recv().await.as_deref(), Some("SEND /queue/a hello"));
}

#[tokio::test]
async fn missing_destination_fails_with_the_request_receipt() {
    let mut h = connected().await;
    h.peer.send(b"SEND\nreceipt:9\n\nx\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    assert_eq!(head.header("receipt-id"), Some("9"));
    let err = h.events.closed().await.expect("error event");
    assert!(matches!(
        err,
        ConnectionError::MissingHeader {
            name: "destination"
        }
    ));
}

#[tokio::test]
async fn ack_must_carry_the_version_identifier() {
    let mut h = connected().await;
    h.peer.send(b"ACK\nmessage-id:1\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    let err = h.events.closed().await.expect("error event");
    assert!(matches!(err, ConnectionError::MissingHeader { name: "id" }));
}

#[tokio::test]
async fn transactions_are_tracked_per_connection() {
    let mut h = connected().await;
    h.peer.send(b"BEGIN\ntransaction:t1\n\n\0").await;
    h.peer
        .send(b"SEND\ndestination:/queue/b\ntransaction:t1\n\nqueued\0")
        .await;
    h.peer.send(b"COMMIT\ntransaction:t1\nreceipt:c\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.header("receipt-id"), Some("c"));
    assert_eq!(h.seen.recv().await.as_deref(), Some("SEND /queue/b queued"));
    assert_eq!(h.seen.recv().await.as_deref(), Some("COMMIT t1"));

    h.peer.send(b"COMMIT\ntransaction:t1\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn disconnect_is_receipted_before_closing() {
    let mut h = connected().await;
    h.peer.send(b"DISCONNECT\nreceipt:bye\n\n\0").await;
    let (head, _) = h.peer.next().await;
    assert_eq!(head.command, "RECEIPT");
    assert_eq!(head.header("receipt-id"), Some("bye"));
    assert!(h.peer.is_closed().await);
    assert!(h.events.closed().await.is_none());
    assert_eq!(h.seen.recv().await.as_deref(), Some("DISCONNECT"));
}

#[tokio::test]
async fn malformed_frame_is_reported_then_closed() {
    let mut h = connected().await;
    h.peer.send(b"SEND\nno separator here\n\n\0").await;
    let (head, body) = h.peer.next().await;
    assert_eq!(head.command, "ERROR");
    assert!(String::from_utf8_lossy(&body).starts_with("malformed frame"));
    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::Frame);
}

#[tokio::test]
async fn panicking_handler_destroys_only_its_connection() {
    let mut h = connected().await;
    h.peer.send(b"SEND\ndestination:/queue/panic\n\n\0").await;
    let err = h.events.closed().await.expect("error event");
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert!(err.to_string().contains("handler exploded"));
    assert!(h.connection.core().is_destroyed());
}
