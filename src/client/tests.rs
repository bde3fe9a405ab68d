//! Tests for the client role against a scripted server.

use std::time::Duration;

use futures::StreamExt;

use super::*;
use crate::{
    ConnectionError,
    ProtocolVersion,
    SendOptions,
    connection::ConnectionEvents,
    frame::Headers,
    test_support::{Peer, pair},
};

fn destination(name: &str) -> Headers { [("destination", name)].into_iter().collect() }

async fn connected(version: ProtocolVersion) -> (ClientConnection, ConnectionEvents, Peer) {
    let (local, mut peer) = pair();
    let (outcome, ()) = tokio::join!(ClientConnection::connect(local, ClientConfig::default()), async {
        let (head, _) = peer.next().await;
        assert_eq!(head.command, "CONNECT");
        assert_eq!(head.header("accept-version"), Some("1.0,1.1,1.2"));
        peer.send(format!("CONNECTED\nversion:{version}\n\n\0").as_bytes()).await;
    });
    let (client, events) = outcome.expect("handshake");
    peer.set_version(version);
    (client, events, peer)
}

#[tokio::test]
async fn handshake_adopts_the_server_version() {
    let (client, _events, _peer) = connected(ProtocolVersion::V1_1).await;
    assert_eq!(client.version(), ProtocolVersion::V1_1);
    let info = client.connected_info().expect("handshake recorded");
    assert_eq!(info.version, ProtocolVersion::V1_1);
    assert!(info.heartbeat.is_disabled());
}

#[tokio::test]
async fn error_frame_fails_the_handshake() {
    let (local, mut peer) = pair();
    let (outcome, ()) = tokio::join!(ClientConnection::connect(local, ClientConfig::default()), async {
        peer.next().await;
        peer.send(b"ERROR\nmessage:bad login\n\nsorry\0").await;
    });
    match outcome {
        Err(ConnectionError::ErrorFrame { message, details }) => {
            assert_eq!(message, "bad login");
            assert_eq!(details, "sorry");
        }
        other => panic!("unexpected handshake outcome: {other:?}"),
    }
}

#[tokio::test]
async fn unoffered_version_fails_the_handshake() {
    let (local, mut peer) = pair();
    let config = ClientConfig::default().accept_versions([ProtocolVersion::V1_2]);
    let (outcome, ()) = tokio::join!(ClientConnection::connect(local, config), async {
        let (head, _) = peer.next().await;
        assert_eq!(head.header("accept-version"), Some("1.2"));
        peer.send(b"CONNECTED\nversion:1.1\n\n\0").await;
    });
    assert!(matches!(
        outcome,
        Err(ConnectionError::UnsupportedVersion { requested }) if requested == "1.1"
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out_the_handshake() {
    let (local, _peer) = pair();
    let config = ClientConfig::default().connect_timeout(Some(Duration::from_millis(100)));
    let outcome = ClientConnection::connect(local, config).await;
    assert!(matches!(outcome, Err(ConnectionError::ConnectTimedOut)));
}

#[tokio::test]
async fn messages_route_to_their_subscription() {
    let (client, _events, mut peer) = connected(ProtocolVersion::V1_2).await;
    let mut subscription = client.subscribe(destination("/queue/a")).expect("subscribe");
    assert_eq!(subscription.id(), "sub-0");

    let (head, _) = peer.next().await;
    assert_eq!(head.command, "SUBSCRIBE");
    assert_eq!(head.header("id"), Some("sub-0"));
    assert_eq!(head.header("ack"), Some("auto"));

    peer.send(b"MESSAGE\nsubscription:other\nmessage-id:0\n\nlost\0").await;
    peer.send(b"MESSAGE\nsubscription:sub-0\nmessage-id:1\ndestination:/queue/a\n\nhi\0")
        .await;
    let mut message = subscription
        .next()
        .await
        .expect("message")
        .expect("delivered");
    assert_eq!(message.message_id(), Some("1"));
    assert_eq!(message.destination(), Some("/queue/a"));
    assert_eq!(message.read_to_end().await.expect("body"), "hi");
}

#[tokio::test]
async fn ack_carries_the_version_specific_id() {
    let (client, _events, mut peer) = connected(ProtocolVersion::V1_2).await;
    let mut headers = destination("/queue/a");
    headers.insert("ack", "client-individual");
    let mut subscription = client.subscribe(headers).expect("subscribe");
    peer.next().await;

    peer.send(b"MESSAGE\nsubscription:sub-0\nmessage-id:1\nack:a-7\n\n\0").await;
    let message = subscription
        .next_message()
        .await
        .expect("message")
        .expect("delivered");
    client
        .ack(&message, Headers::new(), SendOptions::default())
        .expect("queued")
        .await
        .expect("flushed");

    let (head, _) = peer.next().await;
    assert_eq!(head.command, "ACK");
    assert_eq!(head.header("id"), Some("a-7"));
    assert!(!head.headers.contains("message-id"));
}

#[tokio::test]
async fn duplicate_subscription_id_is_rejected() {
    let (client, _events, _peer) = connected(ProtocolVersion::V1_2).await;
    let mut headers = destination("/queue/a");
    headers.insert("id", "x");
    let _first = client.subscribe(headers.clone()).expect("first subscribe");
    let err = client.subscribe(headers).expect_err("duplicate id");
    assert!(matches!(err, ConnectionError::Rejected { .. }));
}

#[tokio::test]
async fn subscribe_requires_a_destination() {
    let (client, _events, _peer) = connected(ProtocolVersion::V1_2).await;
    let err = client.subscribe(Headers::new()).expect_err("no destination");
    assert!(matches!(
        err,
        ConnectionError::MissingHeader {
            name: "destination"
        }
    ));
}

#[tokio::test]
async fn unsubscribe_waits_for_the_receipt() {
    let (client, _events, mut peer) = connected(ProtocolVersion::V1_2).await;
    let subscription = client.subscribe(destination("/queue/a")).expect("subscribe");
    peer.next().await;

    let (done, ()) = tokio::join!(subscription.unsubscribe(), async {
        let (head, _) = peer.next().await;
        assert_eq!(head.command, "UNSUBSCRIBE");
        assert_eq!(head.header("id"), Some("sub-0"));
        let receipt = head.header("receipt").expect("receipt requested").to_owned();
        peer.send(format!("RECEIPT\nreceipt-id:{receipt}\n\n\0").as_bytes()).await;
    });
    done.expect("unsubscribed");
    assert_eq!(client.subscription_count(), 0);
}

#[tokio::test]
async fn transaction_frames_carry_its_id() {
    let (client, _events, mut peer) = connected(ProtocolVersion::V1_2).await;
    let transaction = client.begin(Headers::new()).expect("begin");
    assert_eq!(transaction.id(), "tx-0");
    transaction
        .send_bytes(destination("/queue/a"), "body", SendOptions::default())
        .expect("queued")
        .await
        .expect("flushed");
    transaction
        .commit(SendOptions::default())
        .expect("queued")
        .await
        .expect("flushed");

    let (begin, _) = peer.next().await;
    assert_eq!(begin.command, "BEGIN");
    assert_eq!(begin.header("transaction"), Some("tx-0"));
    let (send, body) = peer.next().await;
    assert_eq!(send.header("transaction"), Some("tx-0"));
    assert_eq!(send.header("content-length"), Some("4"));
    assert_eq!(body, "body");
    let (commit, _) = peer.next().await;
    assert_eq!(commit.command, "COMMIT");
    assert_eq!(commit.header("transaction"), Some("tx-0"));
}

#[tokio::test]
async fn disconnect_closes_after_the_receipt() {
    let (client, mut events, mut peer) = connected(ProtocolVersion::V1_2).await;
    let (done, ()) = tokio::join!(client.disconnect(), async {
        let (head, _) = peer.next().await;
        assert_eq!(head.command, "DISCONNECT");
        let receipt = head.header("receipt").expect("receipt requested").to_owned();
        peer.send(format!("RECEIPT\nreceipt-id:{receipt}\n\n\0").as_bytes()).await;
    });
    done.expect("disconnected");
    assert!(client.is_destroyed());
    assert!(events.closed().await.is_none());
}

#[tokio::test]
async fn lost_transport_ends_subscriptions_with_an_error() {
    let (client, mut events, peer) = connected(ProtocolVersion::V1_2).await;
    let mut subscription = client.subscribe(destination("/queue/a")).expect("subscribe");
    drop(peer);

    assert!(matches!(
        subscription.next_message().await,
        Some(Err(ConnectionError::StreamEnded))
    ));
    assert!(subscription.next_message().await.is_none());
    events.closed().await;
    assert!(client.is_destroyed());
}
