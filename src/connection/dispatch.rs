//! Command dispatch for inbound frames.

use std::{collections::HashMap, fmt, sync::Arc};

use futures::future::BoxFuture;
use log::debug;
use tokio::io::AsyncRead;

use super::{ConnectionCore, Role, SendOptions};
use crate::{
    body::InboundFrame,
    error::{ConnectionError, Result},
    frame::{FrameHead, OutgoingFrame, command, header},
    metrics::{self, Direction},
    reader::FrameReader,
};

/// Future returned by a command handler: an optional response frame.
pub type CommandFuture<'a> = BoxFuture<'a, Result<Option<OutgoingFrame>>>;

/// Handler for one inbound command.
///
/// The handler may consume the frame's body; the next frame is not read
/// until the body has been fully received and the handler has returned.
pub type CommandHandler<S> = for<'a> fn(&'a mut DispatchContext<S>, InboundFrame) -> CommandFuture<'a>;

/// Handlers keyed by command token.
pub struct CommandTable<S> {
    handlers: HashMap<&'static str, CommandHandler<S>>,
    fallback: CommandHandler<S>,
}

impl<S: Role> Default for CommandTable<S> {
    fn default() -> Self { Self::new() }
}

impl<S: Role> CommandTable<S> {
    /// An empty table whose fallback rejects every command as unknown.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: unknown_command::<S>,
        }
    }

    /// Register `handler` for `command`.
    #[must_use]
    pub fn on(mut self, command: &'static str, handler: CommandHandler<S>) -> Self {
        self.handlers.insert(command, handler);
        self
    }

    /// Replace the handler used for unregistered commands.
    #[must_use]
    pub fn fallback(mut self, handler: CommandHandler<S>) -> Self {
        self.fallback = handler;
        self
    }

    /// Returns true if `command` has a registered handler.
    #[must_use]
    pub fn handles(&self, command: &str) -> bool { self.handlers.contains_key(command) }

    fn lookup(&self, command: &str) -> CommandHandler<S> {
        self.handlers.get(command).copied().unwrap_or(self.fallback)
    }
}

impl<S> fmt::Debug for CommandTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<_> = self.handlers.keys().collect();
        commands.sort_unstable();
        f.debug_struct("CommandTable")
            .field("commands", &commands)
            .finish_non_exhaustive()
    }
}

fn unknown_command<S: Role>(_ctx: &mut DispatchContext<S>, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        Err(ConnectionError::UnknownCommand {
            command: frame.head.command,
        })
    })
}

/// State visible to command handlers.
pub struct DispatchContext<S> {
    core: Arc<ConnectionCore>,
    state: Arc<S>,
    next_table: Option<CommandTable<S>>,
    close_after_response: bool,
}

impl<S: Role> DispatchContext<S> {
    pub(crate) fn new(core: Arc<ConnectionCore>, state: Arc<S>) -> Self {
        Self {
            core,
            state,
            next_table: None,
            close_after_response: false,
        }
    }

    /// The connection being served.
    #[must_use]
    pub fn core(&self) -> &Arc<ConnectionCore> { &self.core }

    /// Role-specific state.
    #[must_use]
    pub fn state(&self) -> &Arc<S> { &self.state }

    /// Swap the handler table once the current command completes.
    pub fn replace_table(&mut self, table: CommandTable<S>) { self.next_table = Some(table); }

    /// Close the connection cleanly after the response (or synthesised
    /// receipt) has been flushed.
    pub fn close_after_response(&mut self) { self.close_after_response = true; }
}

/// A failed command: the error and the request's `receipt` header, if any.
struct Failure {
    error: ConnectionError,
    receipt: Option<String>,
}

impl From<ConnectionError> for Failure {
    fn from(error: ConnectionError) -> Self {
        Self {
            error,
            receipt: None,
        }
    }
}

/// Read loop driving one connection's inbound side.
pub(crate) struct Dispatcher<R, S> {
    reader: FrameReader<R>,
    ctx: DispatchContext<S>,
    table: CommandTable<S>,
}

impl<R, S> Dispatcher<R, S>
where
    R: AsyncRead + Unpin,
    S: Role,
{
    pub(crate) fn new(reader: FrameReader<R>, ctx: DispatchContext<S>, table: CommandTable<S>) -> Self {
        Self { reader, ctx, table }
    }

    /// Process frames until the transport ends, a command fails, or the
    /// connection is destroyed.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub(crate) async fn run(mut self) {
        let shutdown = self.ctx.core.shutdown_token();
        loop {
            let next = tokio::select! {
                biased;

                () = shutdown.cancelled() => return,
                next = self.reader.next_frame() => next,
            };
            let frame = match next {
                None => {
                    debug!("transport ended: role={}", self.ctx.core.role());
                    self.ctx.core.destroy(None);
                    return;
                }
                Some(Err(e)) => {
                    self.fail(Failure::from(ConnectionError::from(e))).await;
                    return;
                }
                Some(Ok(frame)) => frame,
            };
            metrics::inc_frames(Direction::Inbound);
            tracing::debug!(command = %frame.command(), "dispatching frame");

            let outcome = tokio::select! {
                biased;

                () = shutdown.cancelled() => return,
                outcome = self.process(frame) => outcome,
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    self.ctx.core.destroy(None);
                    return;
                }
                Err(failure) => {
                    self.fail(failure).await;
                    return;
                }
            }
        }
    }

    /// Run one command. Returns `Ok(false)` when the connection should close.
    async fn process(&mut self, frame: InboundFrame) -> std::result::Result<bool, Failure> {
        let receipt = frame.header(header::RECEIPT).map(str::to_owned);
        let handler = self.table.lookup(frame.command());
        let (handled, pumped) = tokio::join!(handler(&mut self.ctx, frame), self.reader.finish_body());
        pumped.map_err(|e| Failure::from(ConnectionError::from(e)))?;
        let response = handled.map_err(|error| Failure {
            error,
            receipt: receipt.clone(),
        })?;
        if let Some(table) = self.ctx.next_table.take() {
            self.table = table;
        }

        let response = match (response, receipt) {
            (Some(mut frame), Some(id)) => {
                frame.head.headers.insert(header::RECEIPT_ID, id);
                Some(frame)
            }
            (None, Some(id)) => Some(OutgoingFrame::new(
                FrameHead::new(command::RECEIPT).with_header(header::RECEIPT_ID, id),
            )),
            (response, None) => response,
        };
        if let Some(frame) = response {
            let pending = self.ctx.core.send_outgoing(frame, SendOptions::default())?;
            if self.ctx.close_after_response {
                pending.await?;
            }
        }
        Ok(!self.ctx.close_after_response)
    }

    async fn fail(&mut self, failure: Failure) {
        let Failure { error, receipt } = failure;
        let core = &self.ctx.core;
        if let Some(frame) = self.ctx.state.error_frame(&error, receipt.as_deref()) {
            match core.send_outgoing(frame, SendOptions::default()) {
                Ok(pending) => {
                    let limit = core.config().error_flush_timeout_duration();
                    if tokio::time::timeout(limit, pending).await.is_err() {
                        debug!("error frame not flushed within {limit:?}");
                    }
                }
                Err(e) => debug!("error frame not sent: error={e}"),
            }
        }
        core.destroy(Some(error));
    }
}
