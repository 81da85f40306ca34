//! Logging for VDL
//!
//! All library code logs through [`tracing`]. A [`CallbackLogger`] can be attached
//! to a device to additionally forward formatted lines to an application sink,
//! for example a GUI console or an instrument audit log.
//!
//! ```rust
//! use std::sync::Arc;
//! use vdl::{CallbackLogger, LogLevel};
//!
//! let logger = CallbackLogger::new(
//!     Some(Arc::new(|level, msg: &str| println!("[{}] {}", level, msg))),
//!     LogLevel::Debug,
//! );
//! logger.info("connected");
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::protocol::{Command, Response};

/// Log severity, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application log sink.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Where a [`CallbackLogger`] sends its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// Drop everything
    Disabled,
    /// `tracing` events only
    #[default]
    Tracing,
    /// The callback only
    Callback,
    /// Both `tracing` and the callback
    Both,
}

/// Format bytes as space-separated upper-case hex.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leveled logger with an optional application callback.
#[derive(Clone, Default)]
pub struct CallbackLogger {
    callback: Option<LogCallback>,
    min_level: LogLevel,
    mode: LoggingMode,
    packet_logging: bool,
}

impl fmt::Debug for CallbackLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLogger")
            .field("has_callback", &self.callback.is_some())
            .field("min_level", &self.min_level)
            .field("mode", &self.mode)
            .field("packet_logging", &self.packet_logging)
            .finish()
    }
}

impl CallbackLogger {
    /// Logger forwarding to `callback` (when given) and to `tracing`.
    pub fn new(callback: Option<LogCallback>, min_level: LogLevel) -> Self {
        let mode = if callback.is_some() {
            LoggingMode::Both
        } else {
            LoggingMode::Tracing
        };
        Self {
            callback,
            min_level,
            mode,
            packet_logging: false,
        }
    }

    /// Logger that only emits `tracing` events.
    pub fn tracing_only(min_level: LogLevel) -> Self {
        Self::new(None, min_level)
    }

    pub fn with_mode(mut self, mode: LoggingMode) -> Self {
        self.mode = mode;
        self
    }

    /// The same logger with its `tracing` output turned off.
    ///
    /// For callers that already emit their own `tracing` events and only want
    /// the callback fed.
    pub fn callback_only(mut self) -> Self {
        self.mode = match self.mode {
            LoggingMode::Both | LoggingMode::Callback => LoggingMode::Callback,
            LoggingMode::Tracing | LoggingMode::Disabled => LoggingMode::Disabled,
        };
        self
    }

    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn mode(&self) -> LoggingMode {
        self.mode
    }

    pub fn packet_logging(&self) -> bool {
        self.packet_logging
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.mode != LoggingMode::Disabled && level >= self.min_level
    }

    /// Emit one line. A panicking callback is swallowed.
    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.is_enabled(level) {
            return;
        }

        if matches!(self.mode, LoggingMode::Tracing | LoggingMode::Both) {
            match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error | LogLevel::Critical => tracing::error!("{}", message),
            }
        }

        if matches!(self.mode, LoggingMode::Callback | LoggingMode::Both) {
            if let Some(callback) = &self.callback {
                let _ = catch_unwind(AssertUnwindSafe(|| callback(level, message)));
            }
        }
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }

    /// Hex dump of a wire packet, only when packet logging is on.
    pub fn log_packet(&self, direction: &str, data: &[u8]) {
        if self.packet_logging {
            self.log(
                LogLevel::Debug,
                &format!("[{}] {} bytes: {}", direction, data.len(), format_hex(data)),
            );
        }
    }

    pub fn log_command(&self, command: &Command) {
        self.log(LogLevel::Debug, &format!("Command {}", command));
    }

    pub fn log_response(&self, response: &Response) {
        self.log(
            LogLevel::Debug,
            &format!(
                "Response FC={:02X} status={:?} len={}",
                response.function_code(),
                response.status(),
                response.data().len()
            ),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
