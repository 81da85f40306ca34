//! # Byte transports
//!
//! A [`Transport`] moves raw bytes to and from a device. It knows nothing about
//! frames; the device layer pairs it with a [`FrameCodec`](crate::codec::FrameCodec).
//!
//! | Transport | Link | Feature |
//! |-----------|------|---------|
//! | [`TcpTransport`] | TCP socket | default |
//! | [`SerialTransport`] | RS-232 / RS-485 | `serial` |
//! | [`MockTransport`] | in-memory, scriptable failures | default |
//!
//! Every read and write is bounded by an explicit timeout, so a dead peer
//! surfaces as a `timeout` error instead of a hang.

mod mock;
mod tcp;

#[cfg(feature = "serial")]
mod serial;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::error::{VdlError, VdlResult};

/// Bidirectional byte link.
///
/// `close` is synchronous so it can run from `Drop`; everything that may block
/// on the peer is async and time-bounded.
pub trait Transport: Send {
    /// Open the link. Opening an already-open link re-opens it.
    fn open(&mut self) -> impl Future<Output = VdlResult<()>> + Send;

    /// Close the link. Idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Read whatever is available into `buf`, waiting at most `timeout`.
    ///
    /// Returns the number of bytes read; a transport may return 0 when nothing
    /// arrived, which callers treat as a timeout.
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = VdlResult<usize>> + Send;

    /// Write some prefix of `data`, waiting at most `timeout`.
    fn write(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = VdlResult<usize>> + Send;

    /// Write all of `data`, looping over partial writes.
    ///
    /// A write that accepts zero bytes fails with `write_failed`.
    fn write_all(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = VdlResult<()>> + Send {
        async move {
            let mut written = 0;
            while written < data.len() {
                let n = self.write(&data[written..], timeout).await?;
                if n == 0 {
                    return Err(VdlError::write_failed(format!(
                        "transport accepted 0 of {} remaining bytes",
                        data.len() - written
                    )));
                }
                written += n;
            }
            Ok(())
        }
    }

    /// Discard any unread input. Default: nothing to discard.
    fn flush_read(&mut self) -> impl Future<Output = VdlResult<()>> + Send {
        async { Ok(()) }
    }

    fn type_name(&self) -> &'static str;
}

// ============================================================================
// Transport configuration
// ============================================================================

/// Link settings shared by the stream transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound for `open()`
    pub connect_timeout: Duration,
    /// Disable Nagle on TCP links
    pub nodelay: bool,
    /// Hex-dump every TX/RX chunk at trace level
    pub packet_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            nodelay: true,
            packet_logging: false,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    pub fn validate(&self) -> VdlResult<()> {
        if self.connect_timeout.is_zero() {
            return Err(VdlError::invalid_argument("connect_timeout must be > 0"));
        }
        Ok(())
    }
}

// ============================================================================
// Stream helpers
// ============================================================================

/// Bounded read from an async stream. EOF maps to `connection_closed`.
pub(crate) async fn read_stream<S>(stream: &mut S, buf: &mut [u8], timeout: Duration) -> VdlResult<usize>
where
    S: AsyncRead + Unpin,
{
    if buf.is_empty() {
        return Ok(0);
    }
    match tokio::time::timeout(timeout, stream.read(buf)).await {
        Ok(Ok(0)) => Err(VdlError::connection_closed("peer closed the connection")),
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(VdlError::from(e).context("reading from transport")),
        Err(_) => Err(VdlError::timeout("read", timeout)),
    }
}

/// Bounded write to an async stream.
pub(crate) async fn write_stream<S>(stream: &mut S, data: &[u8], timeout: Duration) -> VdlResult<usize>
where
    S: AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, stream.write(data)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(VdlError::write_failed(e.to_string()).context("writing to transport")),
        Err(_) => Err(VdlError::timeout("write", timeout)),
    }
}
