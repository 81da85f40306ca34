//! Error types for VDL
//!
//! Every fallible operation in the crate returns [`VdlResult`]. An error carries
//! an [`ErrorCode`] from a fixed taxonomy, the [`ErrorCategory`] derived from the
//! code's numeric range, a human-readable message and an optional chain of
//! context strings appended as the error travels outwards.
//!
//! | Range | Category | Meaning |
//! |-------|----------|---------|
//! | 100-199 | Transport | Transient link failure, eligible for reconnect |
//! | 200-299 | Protocol | Structural framing problem, never reconnect-eligible |
//! | 300-399 | Logic | Caller or semantic fault, never retried |

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type VdlResult<T> = Result<T, VdlError>;

/// Error category, derived from the numeric range of an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Link-level failures (100-199)
    Transport,
    /// Framing and encoding failures (200-299)
    Protocol,
    /// Caller or device-semantic failures (300-399)
    Logic,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Logic => "logic",
        };
        f.write_str(name)
    }
}

/// Fixed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // Transport (100-199)
    WriteFailed = 100,
    ReadFailed = 101,
    ConnectionClosed = 102,
    NotConnected = 103,
    IoError = 104,
    Timeout = 105,
    ConnectionFailed = 106,

    // Protocol (200-299)
    InvalidFrame = 200,
    ChecksumError = 201,
    EncodeFailed = 202,
    DecodeFailed = 203,
    IncompleteFrame = 204,
    FrameTooLarge = 205,
    ProtocolError = 206,
    InvalidFormat = 207,

    // Logic (300-399)
    InvalidArgument = 300,
    DeviceError = 301,
    InvalidState = 302,
}

impl ErrorCode {
    /// Numeric value of the code.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Category derived from the code range.
    pub fn category(self) -> ErrorCategory {
        match self.as_u16() {
            100..=199 => ErrorCategory::Transport,
            200..=299 => ErrorCategory::Protocol,
            _ => ErrorCategory::Logic,
        }
    }

    /// Snake-case name, matching the wire-level vocabulary used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::WriteFailed => "write_failed",
            ErrorCode::ReadFailed => "read_failed",
            ErrorCode::ConnectionClosed => "connection_closed",
            ErrorCode::NotConnected => "not_connected",
            ErrorCode::IoError => "io_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectionFailed => "connection_failed",
            ErrorCode::InvalidFrame => "invalid_frame",
            ErrorCode::ChecksumError => "checksum_error",
            ErrorCode::EncodeFailed => "encode_failed",
            ErrorCode::DecodeFailed => "decode_failed",
            ErrorCode::IncompleteFrame => "incomplete_frame",
            ErrorCode::FrameTooLarge => "frame_too_large",
            ErrorCode::ProtocolError => "protocol_error",
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::DeviceError => "device_error",
            ErrorCode::InvalidState => "invalid_state",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The crate's error value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}{}", render_context(.context))]
pub struct VdlError {
    code: ErrorCode,
    message: String,
    context: Vec<String>,
}

fn render_context(context: &[String]) -> String {
    context
        .iter()
        .rev()
        .map(|c| format!(" (while {})", c))
        .collect()
}

impl VdlError {
    /// Create an error with an explicit code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Append a context entry, outermost last.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context chain in the order it was appended.
    pub fn context_chain(&self) -> &[String] {
        &self.context
    }

    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    pub fn is_protocol(&self) -> bool {
        self.category() == ErrorCategory::Protocol
    }

    pub fn is_logic(&self) -> bool {
        self.category() == ErrorCategory::Logic
    }

    // ===== Constructors =====

    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WriteFailed, message)
    }

    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReadFailed, message)
    }

    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionClosed, message)
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "Device not connected")
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    /// Timeout of a named operation.
    pub fn timeout(operation: &str, timeout: Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("{} timed out after {} ms", operation, timeout.as_millis()),
        )
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFrame, message)
    }

    pub fn checksum(expected: u16, actual: u16) -> Self {
        Self::new(
            ErrorCode::ChecksumError,
            format!("CRC mismatch: expected {:04X}, got {:04X}", expected, actual),
        )
    }

    pub fn incomplete_frame() -> Self {
        Self::new(ErrorCode::IncompleteFrame, "Incomplete frame: need more data")
    }

    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::new(
            ErrorCode::FrameTooLarge,
            format!("Frame size {} exceeds maximum {}", size, max),
        )
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn device_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceError, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }
}

impl From<io::Error> for VdlError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorCode::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ErrorCode::ConnectionClosed,
            io::ErrorKind::NotConnected => ErrorCode::NotConnected,
            io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
                ErrorCode::ConnectionFailed
            }
            _ => ErrorCode::IoError,
        };
        VdlError::new(code, err.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
