//! TCP transport over a tokio socket.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use super::{read_stream, write_stream, Transport, TransportConfig};
use crate::error::{ErrorCode, VdlError, VdlResult};
use crate::logging::format_hex;

/// TCP client link to `host:port`.
///
/// The socket is only created by [`open`](Transport::open); constructing a
/// transport never touches the network.
#[derive(Debug)]
pub struct TcpTransport {
    address: String,
    config: TransportConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_config(address, TransportConfig::default())
    }

    pub fn with_config(address: impl Into<String>, config: TransportConfig) -> Self {
        Self {
            address: address.into(),
            config,
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.config.packet_logging = enabled;
    }

    fn stream_mut(&mut self) -> VdlResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| VdlError::new(ErrorCode::NotConnected, "TCP link not open"))
    }

    fn log_packet(&self, direction: &str, data: &[u8]) {
        if self.config.packet_logging {
            trace!("[TCP] {} {} {}", direction, self.address, format_hex(data));
        }
    }
}

impl Transport for TcpTransport {
    async fn open(&mut self) -> VdlResult<()> {
        self.config.validate()?;
        self.stream = None;

        let connect = TcpStream::connect(self.address.as_str());
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(VdlError::connection_failed(format!(
                    "Failed to connect to {}: {}",
                    self.address, e
                )))
            }
            Err(_) => {
                return Err(VdlError::connection_failed(format!(
                    "Connect to {} timed out after {} ms",
                    self.address,
                    self.config.connect_timeout.as_millis()
                )))
            }
        };

        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY on {}: {}", self.address, e);
            }
        }

        debug!("TCP link open: {}", self.address);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("TCP link closed: {}", self.address);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> VdlResult<usize> {
        let stream = self.stream_mut()?;
        let result = read_stream(stream, buf, timeout).await;

        match &result {
            Ok(n) => self.log_packet("RX", &buf[..*n]),
            Err(e) if e.code() == ErrorCode::ConnectionClosed => {
                // Peer hung up; the socket is useless from here on
                self.stream = None;
            }
            Err(_) => {}
        }
        result
    }

    async fn write(&mut self, data: &[u8], timeout: Duration) -> VdlResult<usize> {
        let stream = self.stream_mut()?;
        let n = write_stream(stream, data, timeout).await?;
        self.log_packet("TX", &data[..n]);
        Ok(n)
    }

    async fn flush_read(&mut self) -> VdlResult<()> {
        let stream = match self.stream.as_ref() {
            Some(stream) => stream,
            None => return Ok(()),
        };

        let mut scratch = [0u8; 256];
        let mut dropped = 0usize;
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => dropped += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        if dropped > 0 {
            trace!("Discarded {} stale bytes from {}", dropped, self.address);
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "tcp"
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
