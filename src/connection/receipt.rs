//! Receipt correlation.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{ConnectionError, Result};

/// Outstanding receipt requests keyed by connection-scoped id.
#[derive(Debug)]
pub(crate) struct ReceiptTable {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Result<()>>>,
}

impl Default for ReceiptTable {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }
}

impl ReceiptTable {
    /// Allocate the next id and register its completion slot.
    pub(crate) fn register(&self) -> Receipt {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        Receipt { id, rx }
    }

    /// Resolve the entry named by a `receipt-id` header.
    ///
    /// Returns `false` if no such request is outstanding.
    pub(crate) fn complete(&self, receipt_id: &str) -> bool {
        let Ok(id) = receipt_id.trim().parse::<u64>() else {
            return false;
        };
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Drop an entry whose frame never reached the queue.
    pub(crate) fn cancel(&self, id: u64) { self.pending.remove(&id); }

    /// Fail every outstanding entry with [`ConnectionError::StreamEnded`].
    pub(crate) fn fail_all(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(ConnectionError::StreamEnded));
            }
        }
    }

    pub(crate) fn len(&self) -> usize { self.pending.len() }
}

/// Completion of a receipted frame.
///
/// Resolves exactly once: `Ok(())` when the peer's `RECEIPT` arrives, or
/// [`ConnectionError::StreamEnded`] if the connection is destroyed first.
#[derive(Debug)]
#[must_use = "a receipt does nothing unless awaited"]
pub struct Receipt {
    id: u64,
    rx: oneshot::Receiver<Result<()>>,
}

impl Receipt {
    /// Id sent in the frame's `receipt` header.
    #[must_use]
    pub fn id(&self) -> u64 { self.id }
}

impl Future for Receipt {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(ConnectionError::StreamEnded)))
    }
}
