//! Role-independent connection state machine.
//!
//! A connection binds a [`FrameReader`] and a [`FrameWriter`] to one
//! transport. Inbound frames are dispatched one at a time through a
//! [`CommandTable`]; the client and server roles differ only in the tables
//! they install and in how they report a failed command to the peer (see
//! [`Role`]).
//!
//! The connection is either active or destroyed. [`ConnectionCore::destroy`]
//! is idempotent: the first call closes the transport, stops the heartbeat
//! timers, fails outstanding receipts and emits exactly one terminal
//! [`ConnectionEvent`].

mod counter;
mod dispatch;
mod event;
mod receipt;

use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

pub use counter::active_connection_count;
use counter::ActiveConnection;
pub use dispatch::{CommandFuture, CommandHandler, CommandTable, DispatchContext};
use dispatch::Dispatcher;
pub use event::{ConnectedInfo, ConnectionEvent, ConnectionEvents};
use futures::FutureExt;
use log::{error, info, warn};
pub use receipt::Receipt;
use receipt::ReceiptTable;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    body::{BodyWriter, PendingFrame},
    codec::{FrameDecoder, FrameEncoder},
    config::ConnectionConfig,
    error::{ConnectionError, Result},
    frame::{FrameHead, OutgoingFrame, header},
    heartbeat::{ActivityFlag, ActivityReader, HeartbeatMonitor, NegotiatedHeartbeat},
    metrics,
    reader::FrameReader,
    version::{ProtocolVersion, VersionCell},
    writer::{FrameQueue, FrameWriter},
};

/// Which end of the protocol a connection plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// Sends CONNECT and consumes MESSAGE frames.
    Client,
    /// Answers CONNECT and produces MESSAGE frames.
    Server,
}

impl RoleKind {
    /// Lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Role-specific state and behaviour plugged into a connection.
pub trait Role: Send + Sync + 'static {
    /// Which role this is.
    fn kind(&self) -> RoleKind;

    /// Release role state when the connection is destroyed.
    fn teardown(&self) {}

    /// Frame reporting `err` to the peer before the connection closes.
    ///
    /// `receipt` is the failed request's `receipt` header. Returning `None`
    /// closes without notifying the peer.
    fn error_frame(&self, err: &ConnectionError, receipt: Option<&str>) -> Option<OutgoingFrame> {
        let _ = (err, receipt);
        None
    }
}

/// Options for an outbound frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Attach a `receipt` header and track the peer's acknowledgement.
    pub receipt: bool,
}

impl SendOptions {
    /// Options requesting a receipt.
    pub const RECEIPT: Self = Self { receipt: true };
}

/// Shared state of one connection.
pub struct ConnectionCore {
    role: RoleKind,
    state: Arc<dyn Role>,
    config: ConnectionConfig,
    queue: FrameQueue,
    version: VersionCell,
    receipts: ReceiptTable,
    shutdown: CancellationToken,
    destroyed: AtomicBool,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    activity: ActivityFlag,
    heartbeat: Mutex<Option<HeartbeatMonitor>>,
    active: Mutex<Option<ActiveConnection>>,
}

impl fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("role", &self.role)
            .field("version", &self.version.get())
            .field("destroyed", &self.is_destroyed())
            .field("pending_receipts", &self.receipts.len())
            .finish_non_exhaustive()
    }
}

/// Start a connection over `transport`.
///
/// Spawns the reader and writer tasks and returns the shared core together
/// with the connection's event receiver. Must be called within a Tokio
/// runtime.
pub fn spawn<T, S>(
    transport: T,
    config: ConnectionConfig,
    state: Arc<S>,
    table: CommandTable<S>,
) -> (Arc<ConnectionCore>, ConnectionEvents)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    S: Role,
{
    let (read, write) = tokio::io::split(transport);
    let version = VersionCell::default();
    let activity = ActivityFlag::default();
    let (writer, queue) = FrameWriter::new(
        write,
        FrameEncoder::new(version.clone()),
        config.outbound_body_capacity,
    );
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let role = state.kind();
    let decoder = FrameDecoder::new(config.decoder_limits(), version.clone());
    let inbound_capacity = config.inbound_body_capacity;
    let core = Arc::new(ConnectionCore {
        role,
        state: Arc::clone(&state) as Arc<dyn Role>,
        config,
        queue,
        version,
        receipts: ReceiptTable::default(),
        shutdown: CancellationToken::new(),
        destroyed: AtomicBool::new(false),
        events: events_tx,
        activity: activity.clone(),
        heartbeat: Mutex::new(None),
        active: Mutex::new(Some(ActiveConnection::new())),
    });
    info!("connection opened: role={role}");

    let weak = Arc::downgrade(&core);
    tokio::spawn(writer.run(
        core.shutdown_token(),
        Box::new(move |err| {
            if let Some(core) = weak.upgrade() {
                core.destroy(Some(err));
            }
        }),
    ));

    let reader = FrameReader::new(ActivityReader::new(read, activity), decoder, inbound_capacity);
    let dispatcher = Dispatcher::new(reader, DispatchContext::new(Arc::clone(&core), state), table);
    let guard = Arc::clone(&core);
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(dispatcher.run()).catch_unwind().await {
            let message = crate::panic::format_panic(panic);
            error!("command handler panicked: role={role}, panic={message}");
            guard.destroy(Some(ConnectionError::rejected(format!(
                "command handler panicked: {message}"
            ))));
        }
    });

    (core, ConnectionEvents::new(events_rx))
}

impl ConnectionCore {
    /// Which role this connection plays.
    #[must_use]
    pub fn role(&self) -> RoleKind { self.role }

    /// Current protocol version.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion { self.version.get() }

    /// Switch the decoder and encoder to the version named by `id`.
    ///
    /// Returns `false` and keeps the current tables for unknown ids.
    pub fn set_version(&self, id: &str) -> bool {
        let switched = self.version.set_id(id);
        if switched {
            debug!(version = id, "protocol version switched");
        }
        switched
    }

    /// Connection tuning in effect.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// Queue a frame and return a writer for its body.
    ///
    /// With [`SendOptions::receipt`] set, the next receipt id is attached as
    /// a `receipt` header and the returned writer carries the matching
    /// [`Receipt`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] once the connection has been
    /// destroyed.
    pub fn send_frame(&self, mut head: FrameHead, options: SendOptions) -> Result<BodyWriter> {
        if self.is_destroyed() {
            return Err(ConnectionError::StreamClosed);
        }
        let receipt = options.receipt.then(|| self.receipts.register());
        if let Some(receipt) = receipt.as_ref() {
            head.headers.insert(header::RECEIPT, receipt.id());
        }
        trace!(command = %head.command, "frame queued");
        let writer = match self.queue.start_frame(head) {
            Ok(writer) => writer,
            Err(e) => {
                if let Some(receipt) = receipt.as_ref() {
                    self.receipts.cancel(receipt.id());
                }
                return Err(e);
            }
        };
        if self.is_destroyed() {
            // Lost a race with teardown; do not leave the entry pending.
            self.receipts.fail_all();
        }
        Ok(writer.with_receipt(receipt))
    }

    /// Queue a frame whose body is already in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::StreamClosed`] once the connection has been
    /// destroyed.
    pub fn send_outgoing(&self, frame: OutgoingFrame, options: SendOptions) -> Result<PendingFrame> {
        let OutgoingFrame { head, body } = frame;
        let mut writer = self.send_frame(head, options)?;
        if !writer.try_write(body) {
            return Err(ConnectionError::StreamClosed);
        }
        Ok(writer.end())
    }

    /// Destroy the connection. Only the first call has any effect.
    ///
    /// Closes the transport, stops heartbeats, fails outstanding receipts
    /// with [`ConnectionError::StreamEnded`], runs the role's teardown and
    /// emits [`ConnectionEvent::Error`] or [`ConnectionEvent::End`].
    pub fn destroy(&self, error: Option<ConnectionError>) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            trace!("destroy ignored: connection already destroyed");
            return;
        }
        self.shutdown.cancel();
        self.receipts.fail_all();
        self.state.teardown();
        if let Ok(mut active) = self.active.lock() {
            active.take();
        }
        let event = match error {
            Some(err) => {
                warn!(
                    "connection destroyed: role={}, class={}, error={err}",
                    self.role,
                    err.class()
                );
                metrics::inc_errors(err.class());
                ConnectionEvent::Error(err)
            }
            None => {
                info!("connection closed: role={}", self.role);
                ConnectionEvent::End
            }
        };
        let _ = self.events.send(event);
    }

    /// Returns true once [`ConnectionCore::destroy`] has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool { self.destroyed.load(Ordering::Acquire) }

    /// Wait until the connection is destroyed.
    pub async fn closed(&self) { self.shutdown.cancelled().await; }

    /// Number of receipts still awaiting the peer.
    #[must_use]
    pub fn pending_receipts(&self) -> usize { self.receipts.len() }

    /// Resolve the receipt named by a `receipt-id` header.
    ///
    /// Returns `false` if no such receipt is outstanding.
    pub fn complete_receipt(&self, receipt_id: &str) -> bool { self.receipts.complete(receipt_id) }

    /// Publish a lifecycle event.
    pub fn emit(&self, event: ConnectionEvent) { let _ = self.events.send(event); }

    /// Start heartbeat timers, replacing any already running.
    pub fn start_heartbeat(self: &Arc<Self>, negotiated: NegotiatedHeartbeat) {
        if negotiated.is_disabled() || self.is_destroyed() {
            return;
        }
        let weak = Arc::downgrade(self);
        let monitor = HeartbeatMonitor::start(
            negotiated,
            self.queue.clone(),
            self.activity.clone(),
            (
                self.config.heartbeat_output_margin_duration(),
                self.config.heartbeat_input_margin_duration(),
            ),
            self.shutdown.child_token(),
            Box::new(move |err| {
                if let Some(core) = weak.upgrade() {
                    core.destroy(Some(err));
                }
            }),
        );
        debug!(?negotiated, "heartbeat started");
        if let Ok(mut slot) = self.heartbeat.lock()
            && let Some(previous) = slot.replace(monitor)
        {
            previous.stop();
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }
}
