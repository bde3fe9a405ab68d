//! Live connection accounting.

use std::sync::atomic::{AtomicU64, Ordering};

static LIVE_CONNECTIONS: AtomicU64 = AtomicU64::new(0);

/// Counts a connection from creation until it is destroyed or dropped.
#[derive(Debug)]
pub(super) struct ActiveConnection(());

impl ActiveConnection {
    pub(super) fn new() -> Self {
        LIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_connections();
        Self(())
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        LIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_connections();
    }
}

/// Number of connections in this process that have not been destroyed.
#[must_use]
pub fn active_connection_count() -> u64 { LIVE_CONNECTIONS.load(Ordering::Relaxed) }
