//! Serial port transport (RS-232 / RS-485), behind the `serial` feature.

use std::time::Duration;

use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace};

use super::{read_stream, write_stream, Transport};
use crate::error::{ErrorCode, VdlError, VdlResult};
use crate::logging::format_hex;

/// Serial line settings.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub packet_logging: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            packet_logging: false,
        }
    }
}

/// Serial link to a local port such as `/dev/ttyUSB0` or `COM3`.
#[derive(Debug)]
pub struct SerialTransport {
    path: String,
    config: SerialConfig,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_config(
            path,
            SerialConfig {
                baud_rate,
                ..SerialConfig::default()
            },
        )
    }

    pub fn with_config(path: impl Into<String>, config: SerialConfig) -> Self {
        Self {
            path: path.into(),
            config,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port_mut(&mut self) -> VdlResult<&mut SerialStream> {
        self.port
            .as_mut()
            .ok_or_else(|| VdlError::new(ErrorCode::NotConnected, "Serial port not open"))
    }

    fn log_packet(&self, direction: &str, data: &[u8]) {
        if self.config.packet_logging {
            trace!("[SERIAL] {} {} {}", direction, self.path, format_hex(data));
        }
    }
}

impl Transport for SerialTransport {
    async fn open(&mut self) -> VdlResult<()> {
        self.port = None;
        if self.config.baud_rate == 0 {
            return Err(VdlError::invalid_argument("baud_rate must be > 0"));
        }

        let port = tokio_serial::new(self.path.as_str(), self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity)
            .open_native_async()
            .map_err(|e| {
                VdlError::connection_failed(format!("Failed to open {}: {}", self.path, e))
            })?;

        debug!("Serial port open: {} @ {} baud", self.path, self.config.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port closed: {}", self.path);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> VdlResult<usize> {
        let port = self.port_mut()?;
        let n = read_stream(port, buf, timeout).await?;
        self.log_packet("RX", &buf[..n]);
        Ok(n)
    }

    async fn write(&mut self, data: &[u8], timeout: Duration) -> VdlResult<usize> {
        let port = self.port_mut()?;
        let n = write_stream(port, data, timeout).await?;
        self.log_packet("TX", &data[..n]);
        Ok(n)
    }

    async fn flush_read(&mut self) -> VdlResult<()> {
        if let Some(port) = self.port.as_ref() {
            port.clear(ClearBuffer::Input)
                .map_err(|e| VdlError::new(ErrorCode::IoError, e.to_string()))?;
        }
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "serial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let transport = SerialTransport::new("/dev/null-port", 115200);
        assert_eq!(transport.config().baud_rate, 115200);
        assert_eq!(transport.config().data_bits, DataBits::Eight);
        assert!(!transport.is_open());
        assert_eq!(transport.type_name(), "serial");
    }

    #[tokio::test]
    async fn test_open_missing_port() {
        let mut transport = SerialTransport::new("/dev/vdl-does-not-exist", 9600);
        let err = transport.open().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);
    }
}
