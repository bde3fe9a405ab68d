//! Per-connection server state shared with the command handlers.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, DashSet};

use super::{config::ServerConfig, handler::ServerHandler, session::ServerSubscription};
use crate::{
    connection::{Role, RoleKind},
    error::ConnectionError,
    frame::{FrameHead, OutgoingFrame, command, header},
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ServerState {
    pub(super) config: ServerConfig,
    pub(super) handler: Arc<dyn ServerHandler>,
    pub(super) session_id: String,
    pub(super) subscriptions: DashMap<String, ServerSubscription>,
    pub(super) transactions: DashSet<String>,
    next_message: AtomicU64,
}

impl ServerState {
    pub(super) fn new(config: ServerConfig, handler: Arc<dyn ServerHandler>) -> Self {
        Self {
            config,
            handler,
            session_id: format!("session-{}", NEXT_SESSION.fetch_add(1, Ordering::Relaxed)),
            subscriptions: DashMap::new(),
            transactions: DashSet::new(),
            next_message: AtomicU64::new(0),
        }
    }

    pub(super) fn next_message_id(&self) -> String {
        format!(
            "{}-{}",
            self.session_id,
            self.next_message.fetch_add(1, Ordering::Relaxed)
        )
    }
}

impl Role for ServerState {
    fn kind(&self) -> RoleKind { RoleKind::Server }

    fn teardown(&self) {
        self.subscriptions.clear();
        self.transactions.clear();
    }

    /// Protocol and application failures are reported to the client; a
    /// broken transport is not written to.
    fn error_frame(&self, err: &ConnectionError, receipt: Option<&str>) -> Option<OutgoingFrame> {
        if err.is_transport() {
            return None;
        }
        let body = match err {
            ConnectionError::Frame(frame) => format!("malformed frame: {frame}"),
            other => other.to_string(),
        };
        let mut head = FrameHead::new(command::ERROR)
            .with_header(header::MESSAGE, err)
            .with_header(header::CONTENT_TYPE, "text/plain")
            .with_header(header::CONTENT_LENGTH, body.len());
        head.headers.insert_opt(header::RECEIPT_ID, receipt);
        if matches!(err, ConnectionError::UnsupportedVersion { .. }) {
            head.headers.insert(header::VERSION, self.config.version_list());
        }
        Some(OutgoingFrame::new(head).with_body(body))
    }
}
