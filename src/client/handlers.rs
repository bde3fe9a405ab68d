//! Command tables installed on a client connection.
//!
//! Before the handshake completes only CONNECTED and ERROR are accepted;
//! afterwards MESSAGE, RECEIPT and ERROR.

use std::sync::Arc;

use log::info;
use tracing::debug;

use super::{message::Message, state::ClientState};
use crate::{
    body::InboundFrame,
    connection::{CommandFuture, CommandTable, ConnectedInfo, ConnectionEvent, DispatchContext},
    error::ConnectionError,
    frame::{command, header},
    heartbeat::HeartbeatConfig,
    version::ProtocolVersion,
};

/// Upper bound on the ERROR body text kept in [`ConnectionError::ErrorFrame`].
const MAX_ERROR_DETAILS: usize = 64 * 1024;

pub(super) fn connecting_table() -> CommandTable<ClientState> {
    CommandTable::new()
        .on(command::CONNECTED, on_connected)
        .on(command::ERROR, on_error)
}

pub(super) fn connected_table() -> CommandTable<ClientState> {
    CommandTable::new()
        .on(command::MESSAGE, on_message)
        .on(command::RECEIPT, on_receipt)
        .on(command::ERROR, on_error)
}

fn on_connected(ctx: &mut DispatchContext<ClientState>, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let state = Arc::clone(ctx.state());
        let id = frame
            .header(header::VERSION)
            .unwrap_or(ProtocolVersion::V1_0.as_str());
        let version = ProtocolVersion::from_id(id)
            .filter(|v| state.accept_versions.contains(v))
            .ok_or_else(|| ConnectionError::UnsupportedVersion {
                requested: id.to_owned(),
            })?;
        ctx.core().set_version(version.as_str());

        let remote = match frame.header(header::HEART_BEAT) {
            Some(raw) => HeartbeatConfig::parse(raw)?,
            None => HeartbeatConfig::DISABLED,
        };
        let heartbeat = state.heart_beat.negotiate(&remote);
        ctx.core().start_heartbeat(heartbeat);

        let info = ConnectedInfo {
            version,
            heartbeat,
            headers: frame.head.headers,
        };
        let _ = state.connected.set(info.clone());
        ctx.replace_table(connected_table());
        info!("client connected: version={version}");
        ctx.core().emit(ConnectionEvent::Connected(info));
        Ok(None)
    })
}

fn on_message(ctx: &mut DispatchContext<ClientState>, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let Some(id) = frame.header(header::SUBSCRIPTION).map(str::to_owned) else {
            return Err(ConnectionError::MissingHeader {
                name: header::SUBSCRIPTION,
            });
        };
        let tx = ctx.state().subscriptions.get(&id).map(|tx| tx.value().clone());
        let Some(tx) = tx else {
            debug!(subscription = %id, "message for unknown subscription dropped");
            return Ok(None);
        };
        let InboundFrame { head, body } = frame;
        if tx.send(Ok(Message::new(head, body))).await.is_err() {
            debug!(subscription = %id, "subscriber gone; message dropped");
        }
        Ok(None)
    })
}

fn on_receipt(ctx: &mut DispatchContext<ClientState>, frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let id = frame
            .header(header::RECEIPT_ID)
            .ok_or(ConnectionError::MissingHeader {
                name: header::RECEIPT_ID,
            })?;
        if ctx.core().complete_receipt(id) {
            Ok(None)
        } else {
            Err(ConnectionError::InvalidReceipt {
                receipt_id: id.to_owned(),
            })
        }
    })
}

fn on_error(_ctx: &mut DispatchContext<ClientState>, mut frame: InboundFrame) -> CommandFuture<'_> {
    Box::pin(async move {
        let message = frame.header(header::MESSAGE).unwrap_or_default().to_owned();
        let details = frame
            .body
            .read_to_string_lossy(MAX_ERROR_DETAILS)
            .await
            .unwrap_or_default();
        Err(ConnectionError::ErrorFrame { message, details })
    })
}
