//! TCP accept loop.

mod backoff;

use std::{future::Future, io, sync::Arc, time::Duration};

pub use backoff::BackoffConfig;
use log::{info, warn};
use tokio::{net::TcpListener, select, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{ServerConfig, ServerConnection, ServerHandler};

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Each accepted socket is served by a [`ServerConnection`] sharing
/// `handler`. Accept failures are retried with the configured
/// [`BackoffConfig`]. On shutdown the loop stops accepting, destroys every
/// open connection and waits for their tasks to finish.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use stompwire::server::{ServerConfig, ServerHandler, serve};
/// use tokio::net::TcpListener;
///
/// struct Accept;
/// impl ServerHandler for Accept {}
///
/// # async fn run() -> std::io::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:61613").await?;
/// serve(
///     listener,
///     ServerConfig::default(),
///     Arc::new(Accept),
///     std::future::pending(),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve<H, F>(
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<H>,
    shutdown: F,
) -> io::Result<()>
where
    H: ServerHandler,
    F: Future<Output = ()> + Send,
{
    let local_addr = listener.local_addr()?;
    info!("server listening: addr={local_addr}");
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(accept_loop(
        listener,
        config,
        handler,
        token.clone(),
        tracker.clone(),
    ));

    shutdown.await;
    token.cancel();
    tracker.close();
    tracker.wait().await;
    info!("server stopped: addr={local_addr}");
    Ok(())
}

async fn accept_loop<H: ServerHandler>(
    listener: TcpListener,
    config: ServerConfig,
    handler: Arc<H>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let backoff = config.backoff.normalized();
    let mut delay = backoff.initial_delay;
    while let Some(accepted) =
        accept_once(&listener, &config, &handler, &shutdown, &tracker, delay).await
    {
        delay = if accepted {
            backoff.initial_delay
        } else {
            backoff.next(delay)
        };
    }
}

/// Returns `None` on shutdown, otherwise whether the accept succeeded.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_once<H: ServerHandler>(
    listener: &TcpListener,
    config: &ServerConfig,
    handler: &Arc<H>,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
    delay: Duration,
) -> Option<bool> {
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer_addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("failed to set TCP_NODELAY: error={e}, peer_addr={peer_addr}");
                }
                let (connection, mut events) =
                    ServerConnection::accept(stream, config.clone(), Arc::clone(handler));
                let shutdown = shutdown.clone();
                tracker.spawn(async move {
                    select! {
                        biased;

                        () = shutdown.cancelled() => connection.destroy(None),
                        _ = events.closed() => {}
                    }
                    tracing::debug!(%peer_addr, "connection task finished");
                });
                true
            }
            Err(e) => {
                warn!("accept error: error={e}, delay_ms={}", delay.as_millis());
                sleep(delay).await;
                false
            }
        }),
    }
}
