//! In-memory transport for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::Transport;
use crate::error::{ErrorCode, VdlError, VdlResult};

#[derive(Debug, Default)]
struct MockState {
    is_open: bool,
    open_count: u32,
    write_calls: u32,
    read_calls: u32,

    fail_open: bool,
    fail_open_times: u32,
    fail_read: bool,
    fail_read_times: u32,
    fail_write: bool,
    fail_write_times: u32,

    rx: VecDeque<u8>,
    tx: Vec<u8>,
    read_chunk: Option<usize>,
    auto_response: Option<Vec<u8>>,
}

/// Scriptable in-memory transport.
///
/// Cloning yields another handle to the same state, so a test can keep one
/// handle while the device owns the other:
///
/// ```rust
/// use vdl::{BinaryCodec, GenericDevice, MockTransport};
///
/// let mock = MockTransport::new();
/// let device = GenericDevice::new(mock.clone(), Box::new(BinaryCodec::new()));
/// assert_eq!(mock.open_count(), 0);
/// # drop(device);
/// ```
///
/// Reads with nothing queued fail with `timeout`, mirroring a silent peer.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-call; the state is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Scripting =====

    /// Queue bytes for subsequent reads.
    pub fn set_response(&self, data: &[u8]) {
        self.state().rx.extend(data.iter().copied());
    }

    /// Queue `data` again after every successful write.
    pub fn set_auto_response(&self, data: Option<Vec<u8>>) {
        self.state().auto_response = data;
    }

    /// Deliver at most `chunk` bytes per read, to exercise reassembly.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        self.state().read_chunk = chunk.map(|c| c.max(1));
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Fail the next `times` opens, then succeed.
    pub fn set_fail_open_times(&self, times: u32) {
        self.state().fail_open_times = times;
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.state().fail_read = fail;
    }

    pub fn set_fail_read_times(&self, times: u32) {
        self.state().fail_read_times = times;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state().fail_write = fail;
    }

    /// Fail the next `times` writes, then succeed.
    pub fn set_fail_write_times(&self, times: u32) {
        self.state().fail_write_times = times;
    }

    // ===== Inspection =====

    /// Number of `open()` calls, successful or not.
    pub fn open_count(&self) -> u32 {
        self.state().open_count
    }

    pub fn write_calls(&self) -> u32 {
        self.state().write_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.state().read_calls
    }

    /// Everything written so far.
    pub fn written_data(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    pub fn clear_written_data(&self) {
        self.state().tx.clear();
    }

    /// Bytes queued but not yet read.
    pub fn pending_read(&self) -> usize {
        self.state().rx.len()
    }
}

impl Transport for MockTransport {
    async fn open(&mut self) -> VdlResult<()> {
        let mut state = self.state();
        state.open_count += 1;

        if state.fail_open_times > 0 {
            state.fail_open_times -= 1;
            return Err(VdlError::connection_failed("Mock: simulated transient open failure"));
        }
        if state.fail_open {
            return Err(VdlError::connection_failed("Mock: simulated open failure"));
        }

        state.is_open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state().is_open = false;
    }

    fn is_open(&self) -> bool {
        self.state().is_open
    }

    async fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> VdlResult<usize> {
        let mut state = self.state();
        state.read_calls += 1;

        if !state.is_open {
            return Err(VdlError::new(ErrorCode::NotConnected, "Mock: not connected"));
        }
        if state.fail_read_times > 0 {
            state.fail_read_times -= 1;
            return Err(VdlError::read_failed("Mock: simulated transient read failure"));
        }
        if state.fail_read {
            return Err(VdlError::read_failed("Mock: simulated read failure"));
        }
        if state.rx.is_empty() {
            return Err(VdlError::new(ErrorCode::Timeout, "Mock: no data available"));
        }

        let limit = state.read_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn write(&mut self, data: &[u8], _timeout: Duration) -> VdlResult<usize> {
        let mut state = self.state();
        state.write_calls += 1;

        if !state.is_open {
            return Err(VdlError::new(ErrorCode::NotConnected, "Mock: not connected"));
        }
        if state.fail_write_times > 0 {
            state.fail_write_times -= 1;
            return Err(VdlError::write_failed("Mock: simulated transient write failure"));
        }
        if state.fail_write {
            return Err(VdlError::write_failed("Mock: simulated write failure"));
        }

        state.tx.extend_from_slice(data);
        if let Some(reply) = state.auto_response.clone() {
            state.rx.extend(reply);
        }
        Ok(data.len())
    }

    async fn flush_read(&mut self) -> VdlResult<()> {
        self.state().rx.clear();
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const T: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_open_close_counts() {
        let mut mock = MockTransport::new();
        assert!(!mock.is_open());

        mock.open().await.unwrap();
        assert!(mock.is_open());
        mock.close();
        assert!(!mock.is_open());
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_open_failures() {
        let mut mock = MockTransport::new();
        mock.set_fail_open_times(2);

        assert_eq!(mock.open().await.unwrap_err().code(), ErrorCode::ConnectionFailed);
        assert_err!(mock.open().await);
        assert_ok!(mock.open().await);
        assert_eq!(mock.open_count(), 3);
    }

    #[tokio::test]
    async fn test_read_empty_is_timeout() {
        let mut mock = MockTransport::new();
        mock.open().await.unwrap();
        let mut buf = [0u8; 4];
        let err = mock.read(&mut buf, T).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_io_when_closed() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 4];
        assert_eq!(
            mock.read(&mut buf, T).await.unwrap_err().code(),
            ErrorCode::NotConnected
        );
        assert_eq!(
            mock.write(b"x", T).await.unwrap_err().code(),
            ErrorCode::NotConnected
        );
    }

    #[tokio::test]
    async fn test_chunked_reads() {
        let mut mock = MockTransport::new();
        mock.open().await.unwrap();
        mock.set_response(b"abcdef");
        mock.set_read_chunk(Some(4));

        let mut buf = [0u8; 16];
        assert_eq!(mock.read(&mut buf, T).await.unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(mock.read(&mut buf, T).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[tokio::test]
    async fn test_write_records_and_auto_responds() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();
        mock.open().await.unwrap();
        mock.set_auto_response(Some(b"OK\n".to_vec()));

        mock.write_all(b"*RST\n", T).await.unwrap();
        assert_eq!(handle.written_data(), b"*RST\n");
        assert_eq!(handle.pending_read(), 3);

        mock.flush_read().await.unwrap();
        assert_eq!(handle.pending_read(), 0);
    }

    #[tokio::test]
    async fn test_transient_write_failures() {
        let mut mock = MockTransport::new();
        mock.open().await.unwrap();
        mock.set_fail_write_times(1);

        assert_eq!(
            mock.write_all(b"x", T).await.unwrap_err().code(),
            ErrorCode::WriteFailed
        );
        assert!(mock.write_all(b"x", T).await.is_ok());
        assert_eq!(mock.write_calls(), 2);
    }
}
