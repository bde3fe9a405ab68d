//! Reading `stompwire` metrics back from a debugging recorder.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// Create a debugging recorder and the snapshotter that reads it.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// One snapshot of every metric a recorder has seen.
pub struct MetricsSnapshot(Vec<(CompositeKey, DebugValue)>);

impl MetricsSnapshot {
    /// Take a snapshot from `snapshotter`.
    #[must_use]
    pub fn take(snapshotter: &Snapshotter) -> Self {
        Self(
            snapshotter
                .snapshot()
                .into_vec()
                .into_iter()
                .map(|(key, _, _, value)| (key, value))
                .collect(),
        )
    }

    /// Sum of every counter named `name` whose labels include all of
    /// `labels`.
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.0
            .iter()
            .filter(|(key, _)| key.key().name() == name)
            .filter(|(key, _)| {
                labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == *k && label.value() == *v)
                })
            })
            .map(|(_, value)| match value {
                DebugValue::Counter(c) => *c,
                _ => 0,
            })
            .sum()
    }

    /// Value of the gauge named `name`, if it was touched.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(key, _)| key.key().name() == name)
            .and_then(|(_, value)| match value {
                DebugValue::Gauge(g) => Some(g.into_inner()),
                _ => None,
            })
    }
}
