//! Heartbeat negotiation and keep-alive timers.
//!
//! Each side advertises `"<cx>,<cy>"`: it can send a heartbeat every `cx`
//! milliseconds and wants to receive one every `cy` milliseconds. Zero
//! disables that direction. [`HeartbeatConfig::negotiate`] combines the two
//! offers and [`HeartbeatMonitor`] runs the resulting timers.

use std::{
    fmt,
    io,
    pin::Pin,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

use log::warn;
use serde::Deserialize;
use tokio::{
    io::{AsyncRead, ReadBuf},
    time::{Instant, MissedTickBehavior, interval, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{config::duration_ms, error::ConnectionError, writer::FrameQueue};

/// One side's heartbeat offer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Smallest interval at which this side can send heartbeats, in
    /// milliseconds. Zero means it cannot send them.
    pub outgoing_ms: u64,
    /// Desired interval between heartbeats from the peer, in milliseconds.
    /// Zero means none are wanted.
    pub incoming_ms: u64,
}

/// Error returned for a malformed `heart-beat` header.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid heart-beat header: {0:?}")]
pub struct InvalidHeartbeat(pub String);

impl From<InvalidHeartbeat> for ConnectionError {
    fn from(err: InvalidHeartbeat) -> Self {
        ConnectionError::InvalidHeader {
            name: crate::frame::header::HEART_BEAT,
            value: err.0,
        }
    }
}

impl HeartbeatConfig {
    /// Heartbeats disabled in both directions.
    pub const DISABLED: Self = Self {
        outgoing_ms: 0,
        incoming_ms: 0,
    };

    /// Create an offer from two durations.
    #[must_use]
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self {
            outgoing_ms: duration_ms(outgoing),
            incoming_ms: duration_ms(incoming),
        }
    }

    /// Parse a `heart-beat` header value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeartbeat`] unless the value is two comma-separated
    /// non-negative integers.
    ///
    /// # Examples
    ///
    /// ```
    /// use stompwire::HeartbeatConfig;
    ///
    /// let offer = HeartbeatConfig::parse("500, 1000")?;
    /// assert_eq!(offer.outgoing_ms, 500);
    /// assert_eq!(offer.header_value(), "500,1000");
    /// # Ok::<(), stompwire::heartbeat::InvalidHeartbeat>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self, InvalidHeartbeat> {
        let invalid = || InvalidHeartbeat(value.to_owned());
        let (outgoing, incoming) = value.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            outgoing_ms: outgoing.trim().parse().map_err(|_| invalid())?,
            incoming_ms: incoming.trim().parse().map_err(|_| invalid())?,
        })
    }

    /// Render as a `heart-beat` header value.
    #[must_use]
    pub fn header_value(&self) -> String { format!("{},{}", self.outgoing_ms, self.incoming_ms) }

    /// Combine this side's offer with the peer's.
    ///
    /// A direction is enabled only when both sides want it; the interval is
    /// then the larger of the two values.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use stompwire::HeartbeatConfig;
    ///
    /// let local = HeartbeatConfig::parse("1000,0")?;
    /// let remote = HeartbeatConfig::parse("0,3000")?;
    /// let negotiated = local.negotiate(&remote);
    /// assert_eq!(negotiated.outgoing, Some(Duration::from_millis(3000)));
    /// assert_eq!(negotiated.incoming, None);
    /// # Ok::<(), stompwire::heartbeat::InvalidHeartbeat>(())
    /// ```
    #[must_use]
    pub fn negotiate(&self, remote: &Self) -> NegotiatedHeartbeat {
        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        NegotiatedHeartbeat {
            outgoing: pick(self.outgoing_ms, remote.incoming_ms),
            incoming: pick(self.incoming_ms, remote.outgoing_ms),
        }
    }
}

impl fmt::Display for HeartbeatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}

impl FromStr for HeartbeatConfig {
    type Err = InvalidHeartbeat;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

/// Intervals agreed for one connection. `None` disables a direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NegotiatedHeartbeat {
    /// How often this side sends heartbeats.
    pub outgoing: Option<Duration>,
    /// How often the peer is expected to send data.
    pub incoming: Option<Duration>,
}

impl NegotiatedHeartbeat {
    /// Returns true when neither direction is enabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool { self.outgoing.is_none() && self.incoming.is_none() }
}

/// Shared flag set whenever bytes are read from the transport.
#[derive(Clone, Debug, Default)]
pub struct ActivityFlag(Arc<AtomicBool>);

impl ActivityFlag {
    /// Record that bytes arrived.
    pub fn mark(&self) { self.0.store(true, Ordering::Release); }

    /// Clear the flag, returning whether bytes arrived since the last call.
    pub fn take(&self) -> bool { self.0.swap(false, Ordering::AcqRel) }
}

/// Read adapter that marks an [`ActivityFlag`] on every successful,
/// non-empty read.
pub struct ActivityReader<R> {
    inner: R,
    activity: ActivityFlag,
}

impl<R> ActivityReader<R> {
    /// Wrap `inner`, reporting reads to `activity`.
    pub fn new(inner: R, activity: ActivityFlag) -> Self { Self { inner, activity } }

    /// Consume the adapter, returning the wrapped reader.
    pub fn into_inner(self) -> R { self.inner }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.mark();
        }
        polled
    }
}

/// Callback invoked when the peer falls silent.
pub type TimeoutHook = Box<dyn FnOnce(ConnectionError) + Send>;

/// Running heartbeat timers for one connection.
///
/// Both timers stop when the monitor's token, a child of the connection's
/// token, is cancelled.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    token: CancellationToken,
}

impl HeartbeatMonitor {
    /// Start the timers described by `negotiated`.
    ///
    /// The outgoing timer asks `queue` for a heartbeat every interval minus
    /// `output_margin`; the queue skips it while a frame is in flight. The
    /// incoming timer checks `activity` every interval plus `input_margin`
    /// and calls `on_timeout` once if nothing was read.
    #[must_use]
    pub fn start(
        negotiated: NegotiatedHeartbeat,
        queue: FrameQueue,
        activity: ActivityFlag,
        margins: (Duration, Duration),
        token: CancellationToken,
        on_timeout: TimeoutHook,
    ) -> Self {
        let (output_margin, input_margin) = margins;
        if let Some(every) = negotiated.outgoing {
            let every = every.saturating_sub(output_margin).max(Duration::from_millis(1));
            tokio::spawn(send_heartbeats(queue, every, token.clone()));
        }
        if let Some(window) = negotiated.incoming {
            // Anything read before the timers started counts for the first window.
            activity.take();
            tokio::spawn(watch_incoming(
                activity,
                window + input_margin,
                token.clone(),
                on_timeout,
            ));
        }
        Self { token }
    }

    /// Stop both timers. Idempotent.
    pub fn stop(&self) { self.token.cancel(); }

    /// Returns true once the timers have been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.token.is_cancelled() }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn send_heartbeats(queue: FrameQueue, every: Duration, token: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => break,
            _ = ticker.tick() => {
                if !queue.heartbeat() {
                    trace!("heartbeat skipped: frame in flight");
                }
            }
        }
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn watch_incoming(
    activity: ActivityFlag,
    window: Duration,
    token: CancellationToken,
    on_timeout: TimeoutHook,
) {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => return,
            _ = ticker.tick() => {
                if !activity.take() {
                    let elapsed_ms = duration_ms(window);
                    warn!("heartbeat timeout: no data received for {elapsed_ms} ms");
                    token.cancel();
                    on_timeout(ConnectionError::ConnectionTimedOut { elapsed_ms });
                    return;
                }
            }
        }
    }
}
