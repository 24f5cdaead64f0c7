//! Async I/O primitives used by the planner's background feeder tasks and
//! by the `out`/`out_checked` convenience layer.
//!
//! Bytes are shuttled as plain `tokio` futures driven by the single-threaded
//! executor, rather than on dedicated OS threads.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads `stream` to EOF and returns everything read.
///
/// Takes ownership of `stream` so that, once this future resolves (or is
/// dropped before resolving), the descriptor is closed along with it:
/// there is no separate "close the read end" step for callers to forget.
pub async fn read_all<R>(mut stream: R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Writes `bytes` to `stream` and closes it.
///
/// A reader that exits before consuming all of `bytes` (the common case for
/// `head`, `grep -m1`, and similar short-circuiting consumers) closes its
/// end of the pipe; the resulting `BrokenPipe`/`EPIPE` is treated as a
/// successful, merely truncated, write rather than an error.
pub async fn write_all<W>(mut stream: W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match stream.write_all(bytes).await {
        Ok(()) => {}
        Err(e) if is_broken_pipe(&e) => return Ok(()),
        Err(e) => return Err(e),
    }
    match stream.flush().await {
        Ok(()) => Ok(()),
        Err(e) if is_broken_pipe(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

fn is_broken_pipe(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe || err.raw_os_error() == Some(libc::EPIPE)
}
