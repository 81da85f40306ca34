//! # Devices
//!
//! A device pairs one [`Transport`](crate::transport::Transport) with one
//! [`FrameCodec`](crate::codec::FrameCodec) and adds the reliability layer:
//! connection state, bounded retries and backoff reconnect.
//!
//! ## State machine
//!
//! ```text
//!  disconnected --connect ok--> connected --disconnect--> disconnected
//!  disconnected --connect err-> error
//!  connected --recoverable fault + auto_reconnect--> reconnecting
//!  reconnecting --reopen ok--> connected
//!  reconnecting --exhausted--> error
//!  any --disconnect--> disconnected
//! ```
//!
//! ## Error classification
//!
//! | Error | Recoverable |
//! |-------|-------------|
//! | `write_failed`, `read_failed`, `connection_closed`, `not_connected`, `io_error`, `connection_failed` | yes |
//! | `timeout` | only with `reconnect_on_timeout` |
//! | protocol and logic errors | never |
//!
//! A recoverable fault starts a reconnect episode when `auto_reconnect` is set;
//! anything else disconnects the device.

mod generic;
mod guard;
mod scpi;

pub use generic::GenericDevice;
pub use guard::DeviceGuard;
pub use scpi::ScpiAdapter;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_MAX_RECONNECT_DELAY_MS,
    DEFAULT_MAX_RETRIES, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RETRY_DELAY_MS,
};
use crate::error::{ErrorCode, VdlError, VdlResult};
use crate::protocol::{Command, Response};

/// Connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DeviceState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Error = 4,
}

impl DeviceState {
    pub fn name(self) -> &'static str {
        match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Reconnecting => "reconnecting",
            DeviceState::Error => "error",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Timing and retry policy of a device.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use vdl::DeviceConfig;
///
/// let config = DeviceConfig::new()
///     .with_command_timeout(Duration::from_millis(250))
///     .with_max_retries(5)
///     .with_auto_reconnect(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Per-read bound used by `execute()`
    pub command_timeout: Duration,
    /// Fixed pause between execute attempts
    pub retry_delay: Duration,
    /// Execute attempts, and reopen attempts per reconnect episode
    pub max_retries: u32,
    pub auto_reconnect: bool,
    /// First backoff delay of a reconnect episode
    pub reconnect_delay: Duration,
    /// Backoff ceiling
    pub max_reconnect_delay: Duration,
    pub backoff_multiplier: f64,
    /// Treat `timeout` as a link fault
    pub reconnect_on_timeout: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(DEFAULT_MAX_RECONNECT_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            reconnect_on_timeout: false,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_reconnect_on_timeout(mut self, enabled: bool) -> Self {
        self.reconnect_on_timeout = enabled;
        self
    }

    /// Reject settings that cannot describe a working policy.
    pub fn validate(&self) -> VdlResult<()> {
        if self.command_timeout.is_zero() {
            return Err(VdlError::invalid_argument("command_timeout must be > 0"));
        }
        if self.max_retries == 0 {
            return Err(VdlError::invalid_argument("max_retries must be >= 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(VdlError::invalid_argument(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(VdlError::invalid_argument(
                "max_reconnect_delay must be >= reconnect_delay",
            ));
        }
        Ok(())
    }

    /// Number of execute attempts; at least one.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Next backoff delay: `min(delay * multiplier, max_reconnect_delay)`.
    pub fn next_backoff(&self, delay: Duration) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier)
            .unwrap_or(self.max_reconnect_delay)
            .min(self.max_reconnect_delay)
    }
}

/// Identification of the instrument behind a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    pub fn with_firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = version.into();
        self
    }

    /// Fill manufacturer, model, serial and firmware from a `*IDN?` reply.
    pub fn from_idn(name: impl Into<String>, idn: &str) -> Self {
        let mut fields = idn.split(',').map(str::trim);
        let mut info = Self::new(name);
        info.manufacturer = fields.next().unwrap_or_default().to_string();
        info.model = fields.next().unwrap_or_default().to_string();
        info.serial_number = fields.next().unwrap_or_default().to_string();
        info.firmware_version = fields.next().unwrap_or_default().to_string();
        info
    }
}

/// Running counters kept by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Frames written, retries included
    pub commands_sent: u64,
    pub responses_received: u64,
    /// Failed attempts
    pub errors: u64,
    /// Attempts after the first one
    pub retries: u64,
    /// Reconnect episodes started
    pub reconnects: u64,
    /// Reconnect episodes that ended in `error`
    pub reconnect_failures: u64,
}

// ============================================================================
// Reconnect notifications
// ============================================================================

/// Progress of a reconnect episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectEvent {
    Started,
    Attempting { attempt: u32, max_attempts: u32 },
    Success { attempt: u32 },
    Failed { attempts: u32, error: VdlError },
}

/// Observer for reconnect episodes. Panics inside it are caught and logged.
pub type ReconnectCallback = Arc<dyn Fn(&ReconnectEvent) + Send + Sync>;

/// Whether `error` should trigger reconnect handling under `config`.
pub fn is_recoverable_error(error: &VdlError, config: &DeviceConfig) -> bool {
    match error.code() {
        ErrorCode::WriteFailed
        | ErrorCode::ReadFailed
        | ErrorCode::ConnectionClosed
        | ErrorCode::NotConnected
        | ErrorCode::IoError
        | ErrorCode::ConnectionFailed => true,
        ErrorCode::Timeout => config.reconnect_on_timeout,
        _ => false,
    }
}

// ============================================================================
// Device trait
// ============================================================================

/// Command/response endpoint with a managed connection.
///
/// # Implemented By
///
/// - [`GenericDevice`] - any transport plus any codec
pub trait Device: Send {
    /// Open the link. No-op when already connected.
    fn connect(&mut self) -> impl Future<Output = VdlResult<()>> + Send;

    /// Close the link and enter `disconnected`.
    fn disconnect(&mut self);

    fn state(&self) -> DeviceState;

    /// `connected` state with an open transport.
    fn is_connected(&self) -> bool;

    /// Execute with the configured `command_timeout`.
    fn execute(&mut self, command: &Command) -> impl Future<Output = VdlResult<Response>> + Send {
        let timeout = self.config().command_timeout;
        self.execute_with_timeout(command, timeout)
    }

    /// Send `command` and wait for its response, retrying link failures.
    fn execute_with_timeout(
        &mut self,
        command: &Command,
        timeout: Duration,
    ) -> impl Future<Output = VdlResult<Response>> + Send;

    /// Run a reconnect episode now. No-op when connected.
    fn reconnect(&mut self) -> impl Future<Output = VdlResult<()>> + Send;

    fn info(&self) -> &DeviceInfo;

    fn config(&self) -> &DeviceConfig;

    fn set_config(&mut self, config: DeviceConfig);

    fn type_name(&self) -> &'static str;
}

// ============================================================================
// Tests
// ============================================================================
