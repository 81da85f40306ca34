//! Transport-generic device implementation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use super::{
    is_recoverable_error, Device, DeviceConfig, DeviceInfo, DeviceState, DeviceStats,
    ReconnectCallback, ReconnectEvent,
};
use crate::buffer::RingBuffer;
use crate::codec::{trim_line_end, FrameCodec};
use crate::constants::{LINE_TERMINATOR, READ_CHUNK_SIZE};
use crate::error::{ErrorCode, VdlError, VdlResult};
use crate::logging::{format_hex, CallbackLogger};
use crate::protocol::{Command, Response};
use crate::transport::Transport;

/// Device over any [`Transport`] and any [`FrameCodec`].
///
/// Owns both for its whole life. Framed traffic goes through
/// [`execute`](Device::execute); text instruments can use the
/// [`write`](Self::write) / [`read`](Self::read) / [`query`](Self::query)
/// helpers, which bypass the codec.
///
/// ```rust,no_run
/// use vdl::{BinaryCodec, Command, Device, GenericDevice, TcpTransport, VdlResult};
///
/// # async fn example() -> VdlResult<()> {
/// let mut device = GenericDevice::new(
///     TcpTransport::new("192.168.1.50:5025"),
///     Box::new(BinaryCodec::new()),
/// );
/// device.connect().await?;
/// let response = device.execute(&Command::read(0x03, 0x0000, 2)).await?;
/// println!("{:?}", response.u16_be(0));
/// # Ok(())
/// # }
/// ```
pub struct GenericDevice<T: Transport> {
    transport: T,
    codec: Box<dyn FrameCodec>,
    state: DeviceState,
    info: DeviceInfo,
    config: DeviceConfig,
    logger: Option<CallbackLogger>,
    reconnect_callback: Option<ReconnectCallback>,
    stats: DeviceStats,
}

impl<T: Transport> GenericDevice<T> {
    /// Create a disconnected device with the default config.
    pub fn new(transport: T, codec: Box<dyn FrameCodec>) -> Self {
        Self::with_config(transport, codec, DeviceConfig::default())
    }

    pub fn with_config(transport: T, codec: Box<dyn FrameCodec>, config: DeviceConfig) -> Self {
        Self {
            transport,
            codec,
            state: DeviceState::Disconnected,
            info: DeviceInfo::default(),
            config,
            logger: None,
            reconnect_callback: None,
            stats: DeviceStats::default(),
        }
    }

    /// Create a device that also reports to `logger`.
    ///
    /// The device emits its own `tracing` events, so the logger only feeds its
    /// callback (see [`CallbackLogger::callback_only`]).
    pub fn with_logger(transport: T, codec: Box<dyn FrameCodec>, logger: CallbackLogger) -> Self {
        let mut device = Self::new(transport, codec);
        device.set_logger(Some(logger));
        device
    }

    pub fn set_logger(&mut self, logger: Option<CallbackLogger>) {
        self.logger = logger.map(CallbackLogger::callback_only);
    }

    pub fn logger(&self) -> Option<&CallbackLogger> {
        self.logger.as_ref()
    }

    pub fn set_info(&mut self, info: DeviceInfo) {
        self.info = info;
    }

    /// Observe reconnect episodes.
    pub fn set_reconnect_callback(&mut self, callback: Option<ReconnectCallback>) {
        self.reconnect_callback = callback;
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn codec(&self) -> &dyn FrameCodec {
        self.codec.as_ref()
    }

    pub fn codec_mut(&mut self) -> &mut dyn FrameCodec {
        self.codec.as_mut()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    // =========================================================================
    // Raw and text helpers (bypass the codec)
    // =========================================================================

    /// Write bytes as-is.
    pub async fn write_raw(&mut self, data: &[u8], timeout: Option<Duration>) -> VdlResult<()> {
        if !self.is_connected() {
            return Err(VdlError::not_connected());
        }
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        self.log_packet("TX", data);
        self.transport.write_all(data, timeout).await
    }

    /// Single transport read of at most `max_bytes`.
    pub async fn read_raw(&mut self, max_bytes: usize, timeout: Option<Duration>) -> VdlResult<Vec<u8>> {
        if !self.is_connected() {
            return Err(VdlError::not_connected());
        }
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        let mut buf = vec![0u8; max_bytes];
        let n = self.transport.read(&mut buf, timeout).await?;
        buf.truncate(n);
        self.log_packet("RX", &buf);
        Ok(buf)
    }

    /// Write a text command as-is, without waiting for a reply.
    pub async fn write(&mut self, text: &str) -> VdlResult<()> {
        self.write_raw(text.as_bytes(), None).await
    }

    /// Read one `\n`-terminated line, without its line ending.
    pub async fn read(&mut self, timeout: Option<Duration>) -> VdlResult<String> {
        if !self.is_connected() {
            return Err(VdlError::not_connected());
        }
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        let max = self.codec.max_frame_size().max(1);
        let mut ring = RingBuffer::new(max);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE.min(max)];
        let mut pending = Vec::new();

        loop {
            pending.resize(ring.len(), 0);
            ring.peek(&mut pending);
            if let Some(pos) = pending.iter().position(|&b| b == LINE_TERMINATOR) {
                let line = String::from_utf8_lossy(trim_line_end(&pending[..=pos])).into_owned();
                ring.skip(pos + 1);
                trace!("Text line received: {:?}", line);
                return Ok(line);
            }
            if ring.is_full() {
                return Err(VdlError::frame_too_large(ring.len() + 1, max));
            }

            let room = chunk.len().min(ring.remaining());
            let n = self.transport.read(&mut chunk[..room], timeout).await?;
            if n == 0 {
                return Err(VdlError::timeout("text read", timeout));
            }
            self.log_packet("RX", &chunk[..n]);
            ring.write(&chunk[..n]);
        }
    }

    /// Write `text` (newline appended if absent) and read the reply line.
    pub async fn query(&mut self, text: &str, timeout: Option<Duration>) -> VdlResult<String> {
        if !self.is_connected() {
            return Err(VdlError::not_connected());
        }
        if text.as_bytes().last() == Some(&LINE_TERMINATOR) {
            self.write(text).await?;
        } else {
            self.write(&format!("{}\n", text)).await?;
        }
        self.read(timeout).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn log_packet(&self, direction: &str, data: &[u8]) {
        trace!("{} {}", direction, format_hex(data));
        if let Some(logger) = &self.logger {
            logger.log_packet(direction, data);
        }
    }

    fn emit(&self, event: ReconnectEvent) {
        if let Some(logger) = &self.logger {
            logger.debug(&format!("Reconnect event: {:?}", event));
        }
        if let Some(callback) = &self.reconnect_callback {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                error!("Reconnect callback panicked on {:?}", event);
            }
        }
    }

    /// One write + response reassembly.
    async fn transact(&mut self, frame: &[u8], timeout: Duration) -> VdlResult<Response> {
        self.log_packet("TX", frame);
        self.transport.write_all(frame, timeout).await?;
        self.read_response(timeout).await
    }

    /// Accumulate transport reads until the codec yields a frame.
    async fn read_response(&mut self, timeout: Duration) -> VdlResult<Response> {
        let max = self.codec.max_frame_size().max(1);
        let mut ring = RingBuffer::new(max);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE.min(max)];
        let mut pending = Vec::new();

        loop {
            if !ring.is_empty() {
                pending.resize(ring.len(), 0);
                ring.peek(&mut pending);

                let frame_len = self.codec.frame_length(&pending);
                let outcome = if frame_len > 0 {
                    self.codec.decode(&pending[..frame_len])
                } else {
                    self.codec.decode(&pending)
                };

                if frame_len > 0 || !outcome.is_incomplete() {
                    ring.skip(outcome.consumed);
                    match outcome.result {
                        // Line noise ahead of a frame: drop it and keep reassembling
                        Err(e) if e.code() == ErrorCode::InvalidFrame && outcome.consumed > 0 => {
                            warn!("Resynchronising: {}", e);
                            continue;
                        }
                        result => return result,
                    }
                }

                if ring.is_full() {
                    return Err(VdlError::frame_too_large(ring.len() + 1, max));
                }
            }

            let room = chunk.len().min(ring.remaining());
            let n = self.transport.read(&mut chunk[..room], timeout).await?;
            if n == 0 {
                return Err(VdlError::timeout("response read", timeout));
            }
            self.log_packet("RX", &chunk[..n]);
            ring.write(&chunk[..n]);
        }
    }

    /// Disconnect or reconnect after the final error of an execute.
    async fn handle_error(&mut self, err: &VdlError) {
        if !is_recoverable_error(err, &self.config) {
            debug!("Non-recoverable error ({}), disconnecting", err.code());
            self.disconnect();
            return;
        }
        if !self.config.auto_reconnect {
            debug!("Auto-reconnect disabled, disconnecting after {}", err.code());
            self.disconnect();
            return;
        }
        if let Err(e) = self.reconnect_episode().await {
            warn!("Reconnect after {} failed: {}", err.code(), e);
        }
    }

    /// Close + reopen with exponential backoff, up to `max_retries` times.
    async fn reconnect_episode(&mut self) -> VdlResult<()> {
        self.state = DeviceState::Reconnecting;
        self.stats.reconnects += 1;
        self.emit(ReconnectEvent::Started);

        let max_attempts = self.config.attempts();
        let mut delay = self.config.reconnect_delay;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.emit(ReconnectEvent::Attempting {
                attempt,
                max_attempts,
            });
            info!("Reconnect attempt {}/{} via {}", attempt, max_attempts, self.transport.type_name());

            self.transport.close();
            match self.transport.open().await {
                Ok(()) => {
                    self.state = DeviceState::Connected;
                    info!("Reconnected on attempt {}", attempt);
                    self.emit(ReconnectEvent::Success { attempt });
                    return Ok(());
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < max_attempts {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        delay = self.config.next_backoff(delay);
                    }
                }
            }
        }

        self.state = DeviceState::Error;
        self.stats.reconnect_failures += 1;
        let error = last_error
            .unwrap_or_else(|| VdlError::connection_failed("reconnect made no attempt"))
            .context(format!("reconnecting after {} attempts", max_attempts));
        error!("Reconnect exhausted: {}", error);
        self.emit(ReconnectEvent::Failed {
            attempts: max_attempts,
            error: error.clone(),
        });
        Err(error)
    }
}

impl<T: Transport> Device for GenericDevice<T> {
    async fn connect(&mut self) -> VdlResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.state = DeviceState::Connecting;
        debug!("Connecting via {} transport", self.transport.type_name());

        match self.transport.open().await {
            Ok(()) => {
                self.state = DeviceState::Connected;
                info!("Device connected ({} / {})", self.transport.type_name(), self.codec.name());
                if let Some(logger) = &self.logger {
                    logger.info("Device connected");
                }
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Error;
                warn!("Connect failed: {}", e);
                if let Some(logger) = &self.logger {
                    logger.error(&format!("Connect failed: {}", e));
                }
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.transport.close();
        if self.state != DeviceState::Disconnected {
            debug!("Device disconnected (was {})", self.state);
        }
        self.state = DeviceState::Disconnected;
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn is_connected(&self) -> bool {
        self.state == DeviceState::Connected && self.transport.is_open()
    }

    async fn execute_with_timeout(&mut self, command: &Command, timeout: Duration) -> VdlResult<Response> {
        if !self.is_connected() {
            return Err(VdlError::not_connected());
        }

        let frame = self.codec.encode(command)?;
        debug!("Execute {} ({} bytes, {})", command, frame.len(), self.codec.name());
        if let Some(logger) = &self.logger {
            logger.log_command(command);
        }

        let attempts = self.config.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.retries += 1;
                debug!("Retry {}/{} for {}", attempt, attempts, command);
                if !self.config.retry_delay.is_zero() {
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }

            self.stats.commands_sent += 1;
            match self.transact(&frame, timeout).await {
                Ok(response) => {
                    self.stats.responses_received += 1;
                    if let Some(logger) = &self.logger {
                        logger.log_response(&response);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    self.stats.errors += 1;
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    let is_logic = e.is_logic();
                    let is_protocol = e.is_protocol();
                    last_error = Some(e);
                    if is_logic {
                        break;
                    }
                    // Leftovers of a corrupt reply would poison the next attempt
                    if is_protocol && attempt < attempts {
                        if let Err(e) = self.transport.flush_read().await {
                            debug!("Flushing stale input failed: {}", e);
                        }
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| VdlError::invalid_state("execute made no attempt"));
        self.handle_error(&error).await;
        Err(error)
    }

    async fn reconnect(&mut self) -> VdlResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.reconnect_episode().await
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn set_config(&mut self, config: DeviceConfig) {
        self.config = config;
    }

    fn type_name(&self) -> &'static str {
        "generic_device"
    }
}

impl<T: Transport> Drop for GenericDevice<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryCodec, LineCodec};
    use crate::logging::{LogLevel, LoggingMode};
    use crate::transport::MockTransport;
    use std::sync::{Arc, Mutex};

    /// Fast timings so failure paths finish in milliseconds
    fn fast_config() -> DeviceConfig {
        DeviceConfig::new()
            .with_command_timeout(Duration::from_millis(20))
            .with_retry_delay(Duration::from_millis(1))
            .with_reconnect_delay(Duration::from_millis(1))
            .with_max_reconnect_delay(Duration::from_millis(4))
    }

    fn binary_device(mock: &MockTransport) -> GenericDevice<MockTransport> {
        GenericDevice::with_config(mock.clone(), Box::new(BinaryCodec::new()), fast_config())
    }

    fn reply(fc: u8, data: &[u8]) -> Vec<u8> {
        BinaryCodec::new()
            .encode(&Command::write(fc, 0, data.to_vec()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let mock = MockTransport::new();
        let device = binary_device(&mock);
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert!(!device.is_connected());
        assert_eq!(device.type_name(), "generic_device");
        assert_eq!(device.codec().name(), "binary");
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);

        device.connect().await.unwrap();
        assert_eq!(device.state(), DeviceState::Connected);
        assert!(device.is_connected());

        // Second connect is a no-op
        device.connect().await.unwrap();
        assert_eq!(mock.open_count(), 1);

        device.disconnect();
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert!(!mock.is_open());
    }

    #[tokio::test]
    async fn test_connect_failure_enters_error() {
        let mock = MockTransport::new();
        mock.set_fail_open(true);
        let mut device = binary_device(&mock);

        let err = device.connect().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionFailed);
        assert_eq!(device.state(), DeviceState::Error);
    }

    #[tokio::test]
    async fn test_execute_when_disconnected_skips_io() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotConnected);
        assert_eq!(mock.write_calls(), 0);
        assert_eq!(mock.read_calls(), 0);
        assert_eq!(mock.open_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        mock.set_response(&reply(0x03, &[0x12, 0x34]));
        let response = device.execute(&Command::read(0x03, 0, 1)).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.u16_be(0), Some(0x1234));
        assert_eq!(
            mock.written_data(),
            BinaryCodec::new().encode(&Command::read(0x03, 0, 1)).unwrap()
        );
        assert_eq!(device.stats().responses_received, 1);
    }

    #[tokio::test]
    async fn test_execute_reassembles_fragments() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        mock.set_read_chunk(Some(1));
        mock.set_response(&reply(0x04, b"fragmented payload"));

        let response = device.execute(&Command::execute(0x04)).await.unwrap();
        assert_eq!(response.data().as_ref(), b"fragmented payload");
        assert!(mock.read_calls() > 6);
    }

    #[tokio::test]
    async fn test_execute_skips_noise_before_frame() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let mut wire = vec![0x00, 0xFF, 0x13];
        wire.extend_from_slice(&reply(0x05, &[7]));
        mock.set_response(&wire);

        let response = device.execute(&Command::execute(0x05)).await.unwrap();
        assert_eq!(response.byte_at(0), Some(7));
        assert!(device.is_connected());
    }

    #[tokio::test]
    async fn test_write_fails_then_succeeds_on_last_attempt() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let max_retries = device.config().max_retries;
        mock.set_fail_write_times(max_retries - 1);
        mock.set_response(&reply(0x01, &[]));

        let response = device.execute(&Command::execute(0x01)).await.unwrap();
        assert!(response.is_success());
        assert_eq!(mock.write_calls(), max_retries);
        assert_eq!(device.stats().retries, u64::from(max_retries - 1));
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test]
    async fn test_write_always_fails_triggers_reconnect() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        device.set_reconnect_callback(Some(Arc::new(move |event: &ReconnectEvent| {
            sink.lock().unwrap().push(event.clone());
        })));

        let max_retries = device.config().max_retries;
        mock.set_fail_write_times(max_retries);

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteFailed);
        assert_eq!(mock.write_calls(), max_retries);

        // One reconnect episode; the first reopen succeeds
        assert_eq!(mock.open_count(), 2);
        assert_eq!(device.state(), DeviceState::Connected);

        let events = events.lock().unwrap();
        assert_eq!(events[0], ReconnectEvent::Started);
        assert_eq!(
            events[1],
            ReconnectEvent::Attempting {
                attempt: 1,
                max_attempts: max_retries
            }
        );
        assert_eq!(events[2], ReconnectEvent::Success { attempt: 1 });
    }

    #[tokio::test]
    async fn test_reconnect_exhaustion() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let max_retries = device.config().max_retries;
        mock.set_fail_write(true);
        mock.set_fail_open(true);

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteFailed);

        // Initial open plus one per reconnect attempt
        assert_eq!(mock.open_count(), 1 + max_retries);
        assert_eq!(device.state(), DeviceState::Error);
        assert_eq!(device.stats().reconnect_failures, 1);
    }

    fn assert_near(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_grows_caps_and_restarts() {
        let mock = MockTransport::new();
        mock.set_fail_open(true);
        let mut device = GenericDevice::with_config(
            mock.clone(),
            Box::new(BinaryCodec::new()),
            DeviceConfig::new()
                .with_max_retries(4)
                .with_reconnect_delay(Duration::from_millis(100))
                .with_max_reconnect_delay(Duration::from_millis(300))
                .with_backoff_multiplier(2.0),
        );

        let marks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&marks);
        device.set_reconnect_callback(Some(Arc::new(move |event: &ReconnectEvent| {
            sink.lock().unwrap().push((event.clone(), tokio::time::Instant::now()));
        })));

        // Both episodes must show the same schedule: 100, 200, then capped at 300
        for _ in 0..2 {
            marks.lock().unwrap().clear();
            let started = tokio::time::Instant::now();

            let err = device.reconnect().await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ConnectionFailed);
            assert_eq!(device.state(), DeviceState::Error);
            assert_near(started.elapsed(), 600);

            let recorded = marks.lock().unwrap();
            let attempts: Vec<_> = recorded
                .iter()
                .filter(|(event, _)| matches!(event, ReconnectEvent::Attempting { .. }))
                .map(|(_, at)| *at)
                .collect();
            assert_eq!(attempts.len(), 4);
            assert_near(attempts[0] - started, 0);
            assert_near(attempts[1] - attempts[0], 100);
            assert_near(attempts[2] - attempts[1], 200);
            assert_near(attempts[3] - attempts[2], 300);

            // No sleep after the final attempt
            let (last_event, failed_at) = recorded.last().unwrap();
            assert!(matches!(last_event, ReconnectEvent::Failed { attempts: 4, .. }));
            assert_near(*failed_at - attempts[3], 0);
        }

        assert_eq!(mock.open_count(), 8);
        assert_eq!(device.stats().reconnect_failures, 2);
    }

    #[tokio::test]
    async fn test_auto_reconnect_disabled_disconnects() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.set_config(fast_config().with_auto_reconnect(false));
        device.connect().await.unwrap();

        mock.set_fail_write(true);
        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteFailed);
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test]
    async fn test_protocol_error_never_reopens() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let mut bad = reply(0x03, &[1, 2, 3]);
        let last = bad.len() - 1;
        bad[last] ^= 0x55;
        mock.set_auto_response(Some(bad));

        let err = device.execute(&Command::read(0x03, 0, 1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChecksumError);

        // Every attempt is spent, but the link is never reopened
        assert_eq!(mock.write_calls(), device.config().max_retries);
        assert_eq!(mock.open_count(), 1);
        assert_eq!(device.state(), DeviceState::Disconnected);
    }

    #[tokio::test]
    async fn test_corrupt_reply_recovers_on_retry() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let mut bad = reply(0x03, &[0xDE, 0xAD]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        mock.set_response(&bad);
        mock.set_auto_response(Some(reply(0x03, &[0x12, 0x34])));

        let response = device.execute(&Command::read(0x03, 0, 1)).await.unwrap();
        assert_eq!(response.u16_be(0), Some(0x1234));
        assert_eq!(mock.write_calls(), 2);
        assert_eq!(mock.open_count(), 1);
        assert_eq!(device.stats().retries, 1);
        assert!(device.is_connected());
    }

    /// Line codec whose decoder rejects every frame as a device fault.
    struct RejectingCodec(LineCodec);

    impl FrameCodec for RejectingCodec {
        fn encode(&self, command: &Command) -> VdlResult<Vec<u8>> {
            self.0.encode(command)
        }

        fn frame_length(&self, buffer: &[u8]) -> usize {
            self.0.frame_length(buffer)
        }

        fn decode(&self, buffer: &[u8]) -> crate::codec::DecodeOutcome {
            crate::codec::DecodeOutcome::error(
                VdlError::device_error("device rejected the command"),
                self.0.frame_length(buffer),
            )
        }

        fn max_frame_size(&self) -> usize {
            self.0.max_frame_size()
        }

        fn set_max_frame_size(&mut self, size: usize) {
            self.0.set_max_frame_size(size)
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_logic_error_ends_attempts() {
        let mock = MockTransport::new();
        let mut device = GenericDevice::with_config(
            mock.clone(),
            Box::new(RejectingCodec(LineCodec::new())),
            fast_config(),
        );
        device.connect().await.unwrap();
        mock.set_auto_response(Some(b"ERR\n".to_vec()));

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeviceError);
        assert_eq!(mock.write_calls(), 1);
        assert_eq!(device.stats().retries, 0);
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test]
    async fn test_encode_error_keeps_connection() {
        let mock = MockTransport::new();
        let mut device = GenericDevice::with_config(
            mock.clone(),
            Box::new(BinaryCodec::with_max_frame_size(8)),
            fast_config(),
        );
        device.connect().await.unwrap();

        let err = device
            .execute(&Command::write(0x10, 0, vec![0u8; 16]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FrameTooLarge);
        assert!(device.is_connected());
        assert_eq!(mock.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_disconnects_without_reconnect_on_timeout() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.connect().await.unwrap();

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(mock.write_calls(), device.config().max_retries);
        assert_eq!(device.state(), DeviceState::Disconnected);
    }

    #[tokio::test]
    async fn test_timeout_reconnects_when_enabled() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.set_config(fast_config().with_reconnect_on_timeout(true));
        device.connect().await.unwrap();

        let err = device.execute(&Command::execute(0x01)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(mock.open_count(), 2);
        assert!(device.is_connected());
    }

    #[tokio::test]
    async fn test_manual_reconnect() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);

        // Connected devices ignore reconnect()
        device.connect().await.unwrap();
        device.reconnect().await.unwrap();
        assert_eq!(mock.open_count(), 1);

        device.disconnect();
        mock.set_fail_open_times(1);
        device.reconnect().await.unwrap();
        assert_eq!(mock.open_count(), 3);
        assert!(device.is_connected());
    }

    #[tokio::test]
    async fn test_panicking_reconnect_callback_is_contained() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.set_reconnect_callback(Some(Arc::new(|_: &ReconnectEvent| panic!("observer bug"))));

        device.reconnect().await.unwrap();
        assert!(device.is_connected());
    }

    #[tokio::test]
    async fn test_text_query() {
        let mock = MockTransport::new();
        let mut device =
            GenericDevice::with_config(mock.clone(), Box::new(LineCodec::new()), fast_config());
        device.connect().await.unwrap();

        mock.set_response(b"ACME,VNA-1,0001,2.3\r\n");
        let idn = device.query("*IDN?", None).await.unwrap();
        assert_eq!(idn, "ACME,VNA-1,0001,2.3");
        assert_eq!(mock.written_data(), b"*IDN?\n");
    }

    #[tokio::test]
    async fn test_text_read_timeout_and_overflow() {
        let mock = MockTransport::new();
        let mut device = GenericDevice::with_config(
            mock.clone(),
            Box::new(LineCodec::with_max_frame_size(8)),
            fast_config(),
        );
        device.connect().await.unwrap();

        let err = device.read(None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);

        mock.set_response(b"0123456789\n");
        let err = device.read(None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::FrameTooLarge);
    }

    #[tokio::test]
    async fn test_raw_helpers() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);

        let err = device.write_raw(b"x", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotConnected);

        device.connect().await.unwrap();
        device.write_raw(&[1, 2, 3], None).await.unwrap();
        assert_eq!(mock.written_data(), vec![1, 2, 3]);

        mock.set_response(&[9, 8, 7, 6]);
        let data = device.read_raw(2, None).await.unwrap();
        assert_eq!(data, vec![9, 8]);
    }

    #[tokio::test]
    async fn test_tracing_only_logger_is_silenced_on_device() {
        let mock = MockTransport::new();
        let mut device = binary_device(&mock);
        device.set_logger(Some(CallbackLogger::tracing_only(LogLevel::Trace)));
        assert_eq!(device.logger().map(|l| l.mode()), Some(LoggingMode::Disabled));

        device.set_logger(None);
        assert!(device.logger().is_none());
    }

    #[tokio::test]
    async fn test_logger_receives_lines() {
        let mock = MockTransport::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let logger = CallbackLogger::new(
            Some(Arc::new(move |_, msg: &str| sink.lock().unwrap().push(msg.to_string()))),
            LogLevel::Debug,
        );
        assert_eq!(logger.mode(), LoggingMode::Both);

        let mut device = GenericDevice::with_logger(mock.clone(), Box::new(BinaryCodec::new()), logger);
        device.connect().await.unwrap();
        mock.set_response(&reply(0x02, &[]));
        device.execute(&Command::execute(0x02)).await.unwrap();

        // tracing output comes from the device itself, never from the logger
        assert_eq!(device.logger().map(|l| l.mode()), Some(LoggingMode::Callback));

        let lines = lines.lock().unwrap();
        assert_eq!(lines.iter().filter(|l| *l == "Device connected").count(), 1);
        assert!(lines.iter().any(|l| l.starts_with("Command FC=02")));
        assert!(lines.iter().any(|l| l.starts_with("Response FC=02")));
    }
}
