#![cfg(feature = "metrics")]
//! Tests for `stompwire` metrics.
//!
//! Counters and gauges are read back through
//! `metrics_util::debugging::DebuggingRecorder`.

use std::sync::Arc;

use rstest::rstest;
use stompwire::{
    ErrorClass,
    metrics::{self, Direction},
    server::{ServerConfig, ServerConnection, ServerHandler},
};
use stompwire_testing::{MetricsSnapshot, debugging_recorder_setup, peer_pair};

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_frames(direction));

    let snapshot = MetricsSnapshot::take(&snapshotter);
    assert_eq!(
        snapshot.counter(metrics::FRAMES_PROCESSED, &[("direction", label)]),
        1
    );
}

#[rstest]
#[case(ErrorClass::Transport)]
#[case(ErrorClass::Protocol)]
#[case(ErrorClass::Application)]
fn error_metric_is_labelled_by_class(#[case] class: ErrorClass) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_errors(class);
        metrics::inc_errors(class);
    });

    let snapshot = MetricsSnapshot::take(&snapshotter);
    assert_eq!(
        snapshot.counter(metrics::ERRORS_TOTAL, &[("class", class.as_str())]),
        2
    );
}

#[test]
fn connection_gauge_tracks_open_connections() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_connections();
        metrics::inc_connections();
        metrics::dec_connections();
    });

    let snapshot = MetricsSnapshot::take(&snapshotter);
    assert_eq!(snapshot.gauge(metrics::CONNECTIONS_ACTIVE), Some(1.0));
}

struct AcceptAll;

impl ServerHandler for AcceptAll {}

#[tokio::test]
async fn protocol_failure_is_counted_once() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    // The test runtime is single-threaded, so spawned connection tasks see
    // the thread-local recorder too.
    let _guard = ::metrics::set_default_local_recorder(&recorder);

    let (local, mut peer) = peer_pair(1024);
    let (_connection, mut events) =
        ServerConnection::accept(local, ServerConfig::default(), Arc::new(AcceptAll));
    peer.write_raw(b"CONNECT\naccept-version:1.2\n\n\0")
        .await
        .expect("connect");
    let connected = peer.read_frame().await.expect("frame").expect("valid");
    assert_eq!(connected.head.command, "CONNECTED");
    peer.write_raw(b"BOGUS\n\n\0").await.expect("bogus");

    let err = events.closed().await.expect("protocol error");
    assert_eq!(err.class(), ErrorClass::Protocol);

    let snapshot = MetricsSnapshot::take(&snapshotter);
    assert_eq!(
        snapshot.counter(metrics::ERRORS_TOTAL, &[("class", "protocol")]),
        1
    );
    assert_eq!(
        snapshot.counter(metrics::FRAMES_PROCESSED, &[("direction", "inbound")]),
        2
    );
}
