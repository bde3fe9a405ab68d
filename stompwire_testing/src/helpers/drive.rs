//! Driving code under test over an in-memory duplex stream.

use std::{future::Future, io, panic::AssertUnwindSafe};

use futures::FutureExt as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

/// Run `server_fn` against a duplex stream, writing each chunk of `input` to
/// the other half and returning every byte `server_fn` wrote back.
///
/// The write side is shut down after the last chunk, so code under test sees
/// end of stream once it has consumed the input. If `server_fn` panics the
/// panic message is surfaced as an `io::Error` beginning with
/// `"server task failed"`.
///
/// ```rust
/// use tokio::io::{AsyncWriteExt, DuplexStream};
/// use stompwire_testing::drive_with_bytes;
///
/// async fn greet(mut io: DuplexStream) { let _ = io.write_all(b"CONNECTED\n\n\0").await; }
///
/// # async fn demo() -> std::io::Result<()> {
/// let out = drive_with_bytes(greet, vec![b"CONNECT\n\n\0".to_vec()], 64).await?;
/// assert_eq!(out, b"CONNECTED\n\n\0");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns transport errors from the driving side, or the panic described
/// above.
pub async fn drive_with_bytes<F, Fut>(
    server_fn: F,
    input: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<Vec<u8>>
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = ()> + Send,
{
    let (mut client, server) = duplex(capacity);

    let server_fut = async {
        match AssertUnwindSafe(server_fn(server)).catch_unwind().await {
            Ok(()) => Ok(()),
            Err(panic) => {
                let message = stompwire::panic::format_panic(panic);
                Err(io::Error::other(format!("server task failed: {message}")))
            }
        }
    };

    let client_fut = async {
        for chunk in &input {
            client.write_all(chunk).await?;
        }
        client.shutdown().await?;

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await?;
        io::Result::Ok(buf)
    };

    let ((), buf) = tokio::try_join!(server_fut, client_fut)?;
    Ok(buf)
}
