//! SCPI convenience layer for text instruments.
//!
//! SCPI replies are comma-separated ASCII fields terminated by `\n`. The
//! adapter wraps the device's text helpers and adds the IEEE 488.2 common
//! commands (`*IDN?`, `*RST`, `*CLS`, `*WAI`, `*OPC?`) plus error-queue access.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use super::{Device, GenericDevice};
use crate::constants::{LINE_TERMINATOR, SCPI_MAX_ERROR_DRAIN};
use crate::error::{VdlError, VdlResult};
use crate::transport::Transport;

/// SCPI view over a borrowed [`GenericDevice`].
///
/// ```rust,no_run
/// use vdl::{Device, GenericDevice, LineCodec, ScpiAdapter, TcpTransport, VdlResult};
///
/// # async fn example() -> VdlResult<()> {
/// let mut device = GenericDevice::new(TcpTransport::new("10.0.0.7:5025"), Box::new(LineCodec::new()));
/// device.connect().await?;
///
/// let mut scpi = ScpiAdapter::new(&mut device);
/// println!("{}", scpi.idn().await?);
/// let freq = scpi.query_f64("SENS:FREQ:STAR?").await?;
/// # let _ = freq;
/// # Ok(())
/// # }
/// ```
pub struct ScpiAdapter<'a, T: Transport> {
    device: &'a mut GenericDevice<T>,
    timeout: Option<Duration>,
}

impl<'a, T: Transport> ScpiAdapter<'a, T> {
    pub fn new(device: &'a mut GenericDevice<T>) -> Self {
        Self {
            device,
            timeout: None,
        }
    }

    /// Override the device's command timeout for queries made through this adapter.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn device(&self) -> &GenericDevice<T> {
        self.device
    }

    pub fn device_mut(&mut self) -> &mut GenericDevice<T> {
        self.device
    }

    pub async fn connect(&mut self) -> VdlResult<()> {
        self.device.connect().await
    }

    pub fn disconnect(&mut self) {
        self.device.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    // =========================================================================
    // Basic I/O
    // =========================================================================

    /// Send a command that produces no reply.
    pub async fn command(&mut self, command: &str) -> VdlResult<()> {
        debug!("SCPI CMD: {}", command);
        if command.as_bytes().last() == Some(&LINE_TERMINATOR) {
            self.device.write(command).await
        } else {
            self.device.write(&format!("{}\n", command)).await
        }
    }

    /// Send a query and return the reply line.
    pub async fn query(&mut self, command: &str) -> VdlResult<String> {
        debug!("SCPI QUERY: {}", command);
        let reply = self.device.query(command, self.timeout).await?;
        debug!("SCPI RESP: {}", reply);
        Ok(reply)
    }

    /// Field `index` of a comma-separated reply, trimmed.
    pub async fn query_value(&mut self, command: &str, index: usize) -> VdlResult<String> {
        let reply = self.query(command).await?;
        reply
            .split(',')
            .nth(index)
            .map(|field| field.trim().to_string())
            .ok_or_else(|| {
                VdlError::invalid_format(format!(
                    "field {} out of range in reply {:?}",
                    index, reply
                ))
            })
    }

    /// First field of the reply as a float.
    pub async fn query_f64(&mut self, command: &str) -> VdlResult<f64> {
        let reply = self.query(command).await?;
        parse_first(&reply)
    }

    /// First field of the reply as an integer.
    pub async fn query_i64(&mut self, command: &str) -> VdlResult<i64> {
        let reply = self.query(command).await?;
        parse_first(&reply)
    }

    /// `1`/`ON`/`TRUE` or `0`/`OFF`/`FALSE`, case-insensitive.
    pub async fn query_bool(&mut self, command: &str) -> VdlResult<bool> {
        let reply = self.query(command).await?;
        parse_bool(&reply)
    }

    // =========================================================================
    // IEEE 488.2 common commands
    // =========================================================================

    pub async fn idn(&mut self) -> VdlResult<String> {
        self.query("*IDN?").await
    }

    pub async fn reset(&mut self) -> VdlResult<()> {
        self.command("*RST").await
    }

    pub async fn clear_status(&mut self) -> VdlResult<()> {
        self.command("*CLS").await
    }

    pub async fn wait(&mut self) -> VdlResult<()> {
        self.command("*WAI").await
    }

    pub async fn operation_complete(&mut self) -> VdlResult<bool> {
        self.query_bool("*OPC?").await
    }

    /// Pop one entry from the instrument error queue.
    pub async fn next_error(&mut self) -> VdlResult<String> {
        self.query("SYST:ERR?").await
    }

    /// Read the error queue until it reports `0,"No error"`.
    ///
    /// Gives up after a fixed number of reads so a misbehaving instrument
    /// cannot keep the caller looping.
    pub async fn drain_errors(&mut self) -> VdlResult<Vec<String>> {
        let mut errors = Vec::new();
        for _ in 0..SCPI_MAX_ERROR_DRAIN {
            let entry = self.next_error().await?;
            if is_no_error(&entry) {
                break;
            }
            errors.push(entry);
        }
        Ok(errors)
    }

    // =========================================================================
    // Block parsing
    // =========================================================================

    /// Parse `"1.0, 2.5,3e6"` into floats. Empty fields are skipped.
    pub fn parse_f64_list(data: &str) -> VdlResult<Vec<f64>> {
        parse_f64_list(data)
    }

    /// Parse interleaved `re,im,re,im,...` values into pairs.
    pub fn parse_complex_pairs(data: &str) -> VdlResult<Vec<(f64, f64)>> {
        parse_complex_pairs(data)
    }
}

fn is_no_error(entry: &str) -> bool {
    let entry = entry.trim_start();
    entry.starts_with("0,") || entry.starts_with("+0,")
}

fn parse_first<V: FromStr>(reply: &str) -> VdlResult<V> {
    let field = reply.split(',').next().unwrap_or_default().trim();
    field.parse().map_err(|_| {
        VdlError::invalid_format(format!(
            "cannot convert {:?} to {}",
            field,
            std::any::type_name::<V>()
        ))
    })
}

fn parse_bool(reply: &str) -> VdlResult<bool> {
    match reply.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" => Ok(true),
        "0" | "off" | "false" => Ok(false),
        other => Err(VdlError::invalid_format(format!(
            "cannot convert {:?} to bool",
            other
        ))),
    }
}

fn parse_f64_list(data: &str) -> VdlResult<Vec<f64>> {
    data.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| VdlError::invalid_format(format!("bad float {:?}", token)))
        })
        .collect()
}

fn parse_complex_pairs(data: &str) -> VdlResult<Vec<(f64, f64)>> {
    let values = parse_f64_list(data)?;
    if values.len() % 2 != 0 {
        return Err(VdlError::invalid_format(format!(
            "complex data needs an even number of values, got {}",
            values.len()
        )));
    }
    Ok(values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LineCodec;
    use crate::device::DeviceConfig;
    use crate::error::ErrorCode;
    use crate::transport::MockTransport;

    async fn connected(mock: &MockTransport) -> GenericDevice<MockTransport> {
        let config = DeviceConfig::new().with_command_timeout(Duration::from_millis(20));
        let mut device = GenericDevice::with_config(mock.clone(), Box::new(LineCodec::new()), config);
        device.connect().await.unwrap();
        device
    }

    #[tokio::test]
    async fn test_idn_and_common_commands() {
        let mock = MockTransport::new();
        let mut device = connected(&mock).await;
        let mut scpi = ScpiAdapter::new(&mut device);

        mock.set_response(b"ACME,VNA-2000,SN42,1.2.3\n");
        assert_eq!(scpi.idn().await.unwrap(), "ACME,VNA-2000,SN42,1.2.3");

        scpi.reset().await.unwrap();
        scpi.clear_status().await.unwrap();
        scpi.wait().await.unwrap();
        assert_eq!(mock.written_data(), b"*IDN?\n*RST\n*CLS\n*WAI\n");
    }

    #[tokio::test]
    async fn test_typed_queries() {
        let mock = MockTransport::new();
        let mut device = connected(&mock).await;
        let mut scpi = ScpiAdapter::new(&mut device);

        mock.set_response(b" 1.5E9 ,extra\n");
        assert_eq!(scpi.query_f64("SENS:FREQ?").await.unwrap(), 1.5e9);

        mock.set_response(b"+201\n");
        assert_eq!(scpi.query_i64("SENS:SWE:POIN?").await.unwrap(), 201);

        mock.set_response(b"ON\n");
        assert!(scpi.query_bool("OUTP?").await.unwrap());

        mock.set_response(b"1\n");
        assert!(scpi.operation_complete().await.unwrap());

        mock.set_response(b"a, b ,c\n");
        assert_eq!(scpi.query_value("LIST?", 1).await.unwrap(), "b");

        mock.set_response(b"a,b\n");
        let err = scpi.query_value("LIST?", 5).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFormat);
    }

    #[tokio::test]
    async fn test_parse_failures() {
        let mock = MockTransport::new();
        let mut device = connected(&mock).await;
        let mut scpi = ScpiAdapter::new(&mut device);

        mock.set_response(b"NaN-ish\n");
        assert_eq!(
            scpi.query_i64("X?").await.unwrap_err().code(),
            ErrorCode::InvalidFormat
        );

        mock.set_response(b"maybe\n");
        assert_eq!(
            scpi.query_bool("X?").await.unwrap_err().code(),
            ErrorCode::InvalidFormat
        );
    }

    #[tokio::test]
    async fn test_drain_errors() {
        let mock = MockTransport::new();
        let mut device = connected(&mock).await;
        let mut scpi = ScpiAdapter::new(&mut device);

        // one byte per read so each query only consumes its own line
        mock.set_read_chunk(Some(1));
        mock.set_response(b"-113,\"Undefined header\"\n-222,\"Data out of range\"\n+0,\"No error\"\n");
        let errors = scpi.drain_errors().await.unwrap();
        assert_eq!(
            errors,
            vec![
                "-113,\"Undefined header\"".to_string(),
                "-222,\"Data out of range\"".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_errors_is_bounded() {
        let mock = MockTransport::new();
        let mut device = connected(&mock).await;
        let mut scpi = ScpiAdapter::new(&mut device);

        mock.set_auto_response(Some(b"-100,\"Command error\"\n".to_vec()));
        let errors = scpi.drain_errors().await.unwrap();
        assert_eq!(errors.len(), SCPI_MAX_ERROR_DRAIN);
    }

    #[tokio::test]
    async fn test_disconnected_adapter() {
        let mock = MockTransport::new();
        let mut device = GenericDevice::new(mock.clone(), Box::new(LineCodec::new()));
        let mut scpi = ScpiAdapter::new(&mut device);
        assert!(!scpi.is_connected());
        assert_eq!(scpi.idn().await.unwrap_err().code(), ErrorCode::NotConnected);

        scpi.connect().await.unwrap();
        assert!(scpi.is_connected());
        scpi.disconnect();
        assert!(!scpi.device().is_connected());
    }

    #[test]
    fn test_parse_lists() {
        let values = ScpiAdapter::<MockTransport>::parse_f64_list("1.0, 2.5,,3e2 ").unwrap();
        assert_eq!(values, vec![1.0, 2.5, 300.0]);

        let pairs = ScpiAdapter::<MockTransport>::parse_complex_pairs("1,2,3,4").unwrap();
        assert_eq!(pairs, vec![(1.0, 2.0), (3.0, 4.0)]);

        let err = ScpiAdapter::<MockTransport>::parse_complex_pairs("1,2,3").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFormat);

        let err = ScpiAdapter::<MockTransport>::parse_f64_list("1,x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_no_error_detection() {
        assert!(is_no_error("0,\"No error\""));
        assert!(is_no_error("+0,\"No error\""));
        assert!(!is_no_error("-100,\"Command error\""));
    }
}
