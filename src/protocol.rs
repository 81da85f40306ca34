//! Command and response value types
//!
//! A [`Command`] is what a caller asks a device to do; a [`Response`] is what a
//! codec decoded from the wire. Both are plain values created per call. Payloads
//! are held in [`Bytes`] so cloning a command for a retry is cheap.

use std::fmt;

use bytes::Bytes;

/// Broad intent of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CommandKind {
    #[default]
    Read = 0x01,
    Write = 0x02,
    Execute = 0x03,
    Query = 0x04,
    Custom = 0xFF,
}

/// Request sent to a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    kind: CommandKind,
    function_code: u8,
    address: u16,
    count: u16,
    data: Bytes,
    tag: Option<String>,
}

impl Command {
    /// Create an empty command for a function code.
    pub fn new(function_code: u8) -> Self {
        Self {
            function_code,
            ..Self::default()
        }
    }

    /// Read `count` items starting at `address`.
    pub fn read(function_code: u8, address: u16, count: u16) -> Self {
        Self::new(function_code)
            .with_kind(CommandKind::Read)
            .with_address(address)
            .with_count(count)
    }

    /// Write `data` at `address`.
    pub fn write(function_code: u8, address: u16, data: impl Into<Bytes>) -> Self {
        Self::new(function_code)
            .with_kind(CommandKind::Write)
            .with_address(address)
            .with_data(data)
    }

    /// Trigger an action with no payload.
    pub fn execute(function_code: u8) -> Self {
        Self::new(function_code).with_kind(CommandKind::Execute)
    }

    /// Text command for line-oriented protocols. The terminator is added by the codec.
    pub fn text(text: &str) -> Self {
        Self::new(0)
            .with_kind(CommandKind::Query)
            .with_data(Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_function_code(mut self, function_code: u8) -> Self {
        self.function_code = function_code;
        self
    }

    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    pub fn with_count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Attach a debug tag, shown in logs.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn function_code(&self) -> u8 {
        self.function_code
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(
                f,
                "[{}] FC={:02X} addr={} count={} len={}",
                tag,
                self.function_code,
                self.address,
                self.count,
                self.data.len()
            ),
            None => write!(
                f,
                "FC={:02X} addr={} count={} len={}",
                self.function_code,
                self.address,
                self.count,
                self.data.len()
            ),
        }
    }
}

/// Outcome reported by a device response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0x00,
    Error = 0x01,
    Busy = 0x02,
    Timeout = 0x03,
    #[default]
    Invalid = 0xFF,
}

/// Decoded reply from a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    status: ResponseStatus,
    function_code: u8,
    error_code: u8,
    data: Bytes,
    raw_frame: Option<Bytes>,
}

impl Response {
    /// Successful response carrying `data`.
    pub fn success(function_code: u8, data: impl Into<Bytes>) -> Self {
        Self {
            status: ResponseStatus::Success,
            function_code,
            data: data.into(),
            ..Self::default()
        }
    }

    /// Error response with a device-specific error code.
    pub fn error(function_code: u8, error_code: u8) -> Self {
        Self {
            status: ResponseStatus::Error,
            function_code,
            error_code,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ResponseStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error_code(mut self, error_code: u8) -> Self {
        self.error_code = error_code;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Keep the wire bytes this response was decoded from (debugging aid).
    pub fn with_raw_frame(mut self, frame: impl Into<Bytes>) -> Self {
        self.raw_frame = Some(frame.into());
        self
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn function_code(&self) -> u8 {
        self.function_code
    }

    pub fn error_code(&self) -> u8 {
        self.error_code
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn raw_frame(&self) -> Option<&Bytes> {
        self.raw_frame.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub fn is_busy(&self) -> bool {
        self.status == ResponseStatus::Busy
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    // ===== Payload accessors =====

    pub fn byte_at(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    pub fn u16_be(&self, offset: usize) -> Option<u16> {
        self.array::<2>(offset).map(u16::from_be_bytes)
    }

    pub fn u16_le(&self, offset: usize) -> Option<u16> {
        self.array::<2>(offset).map(u16::from_le_bytes)
    }

    pub fn u32_be(&self, offset: usize) -> Option<u32> {
        self.array::<4>(offset).map(u32::from_be_bytes)
    }

    pub fn u32_le(&self, offset: usize) -> Option<u32> {
        self.array::<4>(offset).map(u32::from_le_bytes)
    }

    /// Payload as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        self.data.get(offset..end)?.try_into().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builders() {
        let cmd = Command::read(0x03, 0x0010, 4);
        assert_eq!(cmd.kind(), CommandKind::Read);
        assert_eq!(cmd.function_code(), 0x03);
        assert_eq!(cmd.address(), 0x0010);
        assert_eq!(cmd.count(), 4);
        assert!(!cmd.has_data());

        let cmd = Command::write(0x10, 1, vec![1u8, 2, 3]).with_tag("setpoint");
        assert_eq!(cmd.kind(), CommandKind::Write);
        assert_eq!(cmd.data().as_ref(), &[1, 2, 3]);
        assert_eq!(cmd.tag(), Some("setpoint"));
        assert!(cmd.to_string().starts_with("[setpoint] FC=10"));

        let cmd = Command::text("*IDN?");
        assert_eq!(cmd.data().as_ref(), b"*IDN?");
    }

    #[test]
    fn test_response_defaults() {
        let resp = Response::default();
        assert_eq!(resp.status(), ResponseStatus::Invalid);
        assert!(!resp.is_success());
        assert!(resp.raw_frame().is_none());
    }

    #[test]
    fn test_response_accessors() {
        let resp = Response::success(0x03, vec![0x12, 0x34, 0x56, 0x78]);
        assert!(resp.is_success());
        assert_eq!(resp.byte_at(0), Some(0x12));
        assert_eq!(resp.byte_at(9), None);
        assert_eq!(resp.u16_be(0), Some(0x1234));
        assert_eq!(resp.u16_le(0), Some(0x3412));
        assert_eq!(resp.u32_be(0), Some(0x1234_5678));
        assert_eq!(resp.u32_le(0), Some(0x7856_3412));
        assert_eq!(resp.u16_be(3), None);
        assert_eq!(resp.u32_be(usize::MAX), None);
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(0x05, 0x02);
        assert!(resp.is_error());
        assert_eq!(resp.error_code(), 0x02);
        assert!(!resp.has_data());
    }
}
