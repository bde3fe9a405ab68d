//! Command tables installed on a server connection.

use std::sync::Arc;

use log::info;
use tracing::debug;

use super::{
    session::{ServerSession, ServerSubscription},
    state::ServerState,
};
use crate::{
    ack::{AckMode, required_ack_headers},
    body::InboundFrame,
    connection::{CommandFuture, CommandTable, ConnectedInfo, ConnectionEvent, DispatchContext},
    error::{ConnectionError, Result},
    frame::{FrameHead, command, header},
    heartbeat::HeartbeatConfig,
    version::{ProtocolVersion, negotiate_version},
};

type Ctx = DispatchContext<ServerState>;

pub(super) fn connecting_table() -> CommandTable<ServerState> {
    CommandTable::new()
        .on(command::CONNECT, on_connect)
        .on(command::STOMP, on_connect)
}

pub(super) fn connected_table() -> CommandTable<ServerState> {
    CommandTable::new()
        .on(command::SEND, on_send)
        .on(command::SUBSCRIBE, on_subscribe)
        .on(command::UNSUBSCRIBE, on_unsubscribe)
        .on(command::ACK, on_ack)
        .on(command::NACK, on_nack)
        .on(command::BEGIN, on_begin)
        .on(command::COMMIT, on_commit)
        .on(command::ABORT, on_abort)
        .on(command::DISCONNECT, on_disconnect)
}

fn session(ctx: &Ctx) -> ServerSession { ServerSession::new(Arc::clone(ctx.core()), Arc::clone(ctx.state())) }

fn required<'a>(head: &'a FrameHead, name: &'static str) -> Result<&'a str> {
    head.header(name).ok_or(ConnectionError::MissingHeader { name })
}

fn check_transaction(state: &ServerState, head: &FrameHead) -> Result<()> {
    match head.header(header::TRANSACTION) {
        Some(id) if !state.transactions.contains(id) => {
            Err(ConnectionError::rejected(format!("unknown transaction: {id}")))
        }
        _ => Ok(()),
    }
}

fn on_connect(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let state = Arc::clone(ctx.state());
        let requested = frame.header(header::ACCEPT_VERSION);
        let version = negotiate_version(requested, &state.config.supported_versions).ok_or_else(|| {
            ConnectionError::UnsupportedVersion {
                requested: requested.unwrap_or(ProtocolVersion::V1_0.as_str()).to_owned(),
            }
        })?;
        let remote = match frame.header(header::HEART_BEAT) {
            Some(raw) => HeartbeatConfig::parse(raw)?,
            None => HeartbeatConfig::DISABLED,
        };
        let heartbeat = state.config.heart_beat.negotiate(&remote);

        state.handler.on_connect(&session(ctx), &frame.head).await?;

        ctx.core().set_version(version.as_str());
        ctx.core().start_heartbeat(heartbeat);
        ctx.replace_table(connected_table());
        info!(
            "client connected: session={}, version={version}",
            state.session_id
        );
        ctx.core().emit(ConnectionEvent::Connected(ConnectedInfo {
            version,
            heartbeat,
            headers: frame.head.headers,
        }));

        let mut reply = FrameHead::new(command::CONNECTED)
            .with_header(header::VERSION, version)
            .with_header(header::HEART_BEAT, state.config.heart_beat)
            .with_header(header::SESSION, &state.session_id);
        reply
            .headers
            .insert_opt(header::SERVER, state.config.server_name.as_deref());
        Ok(Some(reply.into()))
    })
}

fn on_send(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        required(&frame.head, header::DESTINATION)?;
        let state = Arc::clone(ctx.state());
        check_transaction(&state, &frame.head)?;
        state.handler.on_send(&session(ctx), frame).await?;
        Ok(None)
    })
}

fn on_subscribe(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let head = frame.head;
        let destination = required(&head, header::DESTINATION)?.to_owned();
        // 1.0 clients may omit the id; the destination then names the
        // subscription.
        let id = match head.header(header::ID) {
            Some(id) => id.to_owned(),
            None if ctx.core().version() == ProtocolVersion::V1_0 => destination.clone(),
            None => return Err(ConnectionError::MissingHeader { name: header::ID }),
        };
        let ack = head
            .header(header::ACK)
            .map(str::parse::<AckMode>)
            .transpose()?
            .unwrap_or_default();
        let subscription = ServerSubscription {
            id: id.clone(),
            destination,
            ack,
            headers: head.headers,
        };

        let state = Arc::clone(ctx.state());
        if state.subscriptions.contains_key(&id) {
            return Err(ConnectionError::rejected(format!(
                "subscription id already in use: {id}"
            )));
        }
        state.subscriptions.insert(id.clone(), subscription.clone());
        if let Err(e) = state.handler.on_subscribe(&session(ctx), &subscription).await {
            state.subscriptions.remove(&id);
            return Err(e);
        }
        debug!(subscription = %id, destination = %subscription.destination, "subscribed");
        Ok(None)
    })
}

fn on_unsubscribe(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = match frame.header(header::ID) {
            Some(id) => id,
            None if ctx.core().version() == ProtocolVersion::V1_0 => {
                required(&frame.head, header::DESTINATION)?
            }
            None => return Err(ConnectionError::MissingHeader { name: header::ID }),
        };
        let state = Arc::clone(ctx.state());
        let Some((_, subscription)) = state.subscriptions.remove(id) else {
            return Err(ConnectionError::rejected(format!("unknown subscription: {id}")));
        };
        state
            .handler
            .on_unsubscribe(&session(ctx), &subscription)
            .await?;
        debug!(subscription = %subscription.id, "unsubscribed");
        Ok(None)
    })
}

fn check_ack(ctx: &Ctx, head: &FrameHead) -> Result<()> {
    for &name in required_ack_headers(ctx.core().version()) {
        required(head, name)?;
    }
    check_transaction(ctx.state(), head)
}

fn on_ack(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        check_ack(ctx, &frame.head)?;
        let state = Arc::clone(ctx.state());
        state.handler.on_ack(&session(ctx), &frame.head).await?;
        Ok(None)
    })
}

fn on_nack(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        check_ack(ctx, &frame.head)?;
        let state = Arc::clone(ctx.state());
        state.handler.on_nack(&session(ctx), &frame.head).await?;
        Ok(None)
    })
}

fn on_begin(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = required(&frame.head, header::TRANSACTION)?;
        let state = Arc::clone(ctx.state());
        if !state.transactions.insert(id.to_owned()) {
            return Err(ConnectionError::rejected(format!(
                "transaction already open: {id}"
            )));
        }
        if let Err(e) = state.handler.on_begin(&session(ctx), id).await {
            state.transactions.remove(id);
            return Err(e);
        }
        Ok(None)
    })
}

fn on_commit(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let state = Arc::clone(ctx.state());
        let id = close_transaction(&state, &frame.head)?;
        state.handler.on_commit(&session(ctx), id).await?;
        Ok(None)
    })
}

fn on_abort(ctx: &mut Ctx, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let state = Arc::clone(ctx.state());
        let id = close_transaction(&state, &frame.head)?;
        state.handler.on_abort(&session(ctx), id).await?;
        Ok(None)
    })
}

fn close_transaction<'a>(state: &ServerState, head: &'a FrameHead) -> Result<&'a str> {
    let id = required(head, header::TRANSACTION)?;
    if state.transactions.remove(id).is_none() {
        return Err(ConnectionError::rejected(format!("unknown transaction: {id}")));
    }
    Ok(id)
}

fn on_disconnect(ctx: &mut Ctx, _frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let state = Arc::clone(ctx.state());
        state.handler.on_disconnect(&session(ctx)).await;
        ctx.close_after_response();
        Ok(None)
    })
}
