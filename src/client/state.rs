//! Per-connection client state shared with the command handlers.

use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{config::ClientConfig, message::Message};
use crate::{
    connection::{ConnectedInfo, Role, RoleKind},
    error::{ConnectionError, Result},
    heartbeat::HeartbeatConfig,
    version::ProtocolVersion,
};

pub(super) type MessageSender = mpsc::Sender<Result<Message>>;

pub(crate) struct ClientState {
    pub(super) heart_beat: HeartbeatConfig,
    pub(super) accept_versions: Vec<ProtocolVersion>,
    pub(super) message_capacity: usize,
    pub(super) subscriptions: DashMap<String, MessageSender>,
    pub(super) connected: OnceLock<ConnectedInfo>,
    next_subscription: AtomicU64,
    next_transaction: AtomicU64,
}

impl ClientState {
    pub(super) fn new(config: &ClientConfig) -> Self {
        Self {
            heart_beat: config.heart_beat,
            accept_versions: config.accept_versions.clone(),
            message_capacity: config.message_capacity.max(1),
            subscriptions: DashMap::new(),
            connected: OnceLock::new(),
            next_subscription: AtomicU64::new(0),
            next_transaction: AtomicU64::new(0),
        }
    }

    pub(super) fn next_subscription_id(&self) -> String {
        format!("sub-{}", self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) fn next_transaction_id(&self) -> String {
        format!("tx-{}", self.next_transaction.fetch_add(1, Ordering::Relaxed))
    }
}

impl Role for ClientState {
    fn kind(&self) -> RoleKind { RoleKind::Client }

    // Subscribers see a final StreamEnded before their stream closes.
    fn teardown(&self) {
        for entry in &self.subscriptions {
            let _ = entry.value().try_send(Err(ConnectionError::StreamEnded));
        }
        self.subscriptions.clear();
    }
}
