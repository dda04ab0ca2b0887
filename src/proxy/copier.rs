// src/proxy/copier.rs
use super::buffer::BufferPool;
use crate::metrics::MetricsRecorder;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

/// Why one relay direction stopped.
#[derive(Debug)]
pub enum CopyEnd {
    Eof,
    ReadError(io::Error),
    WriteError(io::Error),
    IdleTimeout,
}

impl fmt::Display for CopyEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyEnd::Eof => f.write_str("eof"),
            CopyEnd::ReadError(e) => write!(f, "read error: {}", e),
            CopyEnd::WriteError(e) => write!(f, "write error: {}", e),
            CopyEnd::IdleTimeout => f.write_str("idle timeout"),
        }
    }
}

#[derive(Debug)]
pub struct CopyOutcome {
    pub bytes: u64,
    pub end: CopyEnd,
}

/// Relay bytes from `source` to `destination` until end-of-stream, an I/O
/// error, or `idle_timeout` passes without a read or a write completing.
///
/// Each non-empty read is counted through `metrics` before it is written.
/// Neither stream is closed here; the session owner tears both down.
pub async fn copy_with_idle_timeout<R, W>(
    source: &mut R,
    destination: &mut W,
    buffers: &BufferPool,
    idle_timeout: Duration,
    metrics: &dyn MetricsRecorder,
) -> CopyOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = buffers.acquire();
    let mut bytes = 0u64;

    let end = loop {
        let n = match timeout(idle_timeout, buffer.read_from(source)).await {
            Err(_) => break CopyEnd::IdleTimeout,
            Ok(Err(e)) => break CopyEnd::ReadError(e),
            Ok(Ok(0)) => break CopyEnd::Eof,
            Ok(Ok(n)) => n as u64,
        };

        metrics.bytes_transferred(n);
        bytes += n;

        let write = async {
            destination.write_all(&buffer).await?;
            destination.flush().await
        };
        match timeout(idle_timeout, write).await {
            Err(_) => break CopyEnd::IdleTimeout,
            Ok(Err(e)) => break CopyEnd::WriteError(e),
            Ok(Ok(())) => {}
        }
    };

    debug!(bytes, end = %end, "copy finished");
    CopyOutcome { bytes, end }
}
