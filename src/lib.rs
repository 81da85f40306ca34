//! # VDL - Device Communication Library
//!
//! Talk to instruments and controllers over arbitrary byte links with
//! pluggable wire formats, automatic retry and reconnect, and background
//! liveness monitoring.
//!
//! ## Layers
//!
//! | Layer | Types | Role |
//! |-------|-------|------|
//! | Transport | [`TcpTransport`], [`MockTransport`], `SerialTransport` | raw bytes with timeouts |
//! | Codec | [`BinaryCodec`], [`LineCodec`] | framing, encode, streaming decode |
//! | Device | [`GenericDevice`], [`ScpiAdapter`], [`DeviceGuard`] | connection state, retries, reconnect |
//! | Heartbeat | [`HeartbeatRunner`], [`PingHeartbeat`], [`EchoHeartbeat`], [`ScpiHeartbeat`] | periodic probes |
//!
//! ## Features
//!
//! - **Streaming reassembly**: frames are rebuilt from arbitrarily fragmented reads
//! - **Self-resynchronising binary framing**: SOF marker plus CRC-16/CCITT
//! - **Error-driven recovery**: link faults trigger exponential-backoff reconnect,
//!   protocol faults never do
//! - **Heartbeat**: pause/resume/suspend around exclusive command sequences
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vdl::{BinaryCodec, Command, Device, GenericDevice, TcpTransport, VdlResult};
//!
//! #[tokio::main]
//! async fn main() -> VdlResult<()> {
//!     let mut device = GenericDevice::new(
//!         TcpTransport::new("192.168.1.50:5025"),
//!         Box::new(BinaryCodec::new()),
//!     );
//!     device.connect().await?;
//!
//!     let response = device.execute(&Command::read(0x03, 0x0100, 2)).await?;
//!     println!("status={:?} data={:02X?}", response.status(), &response.data()[..]);
//!
//!     device.disconnect();
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error taxonomy and result alias
pub mod error;

/// Wire-format and timing constants
pub mod constants;

/// Fixed-capacity ring buffer used for response reassembly
pub mod buffer;

/// Command and response value types
pub mod protocol;

/// Frame codecs (binary and line)
pub mod codec;

/// Byte transports
pub mod transport;

/// Devices: connection state machine, retries and reconnect
pub mod device;

/// Background heartbeat monitoring
pub mod heartbeat;

/// Logging system for the library
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use vdl::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{ErrorCategory, ErrorCode, VdlError, VdlResult};

// === Core types ===
pub use buffer::RingBuffer;
pub use protocol::{Command, CommandKind, Response, ResponseStatus};

// === Codecs ===
pub use codec::{crc16, BinaryCodec, DecodeOutcome, FrameCodec, LineCodec};

// === Transports ===
pub use transport::{MockTransport, TcpTransport, Transport, TransportConfig};

#[cfg(feature = "serial")]
pub use transport::{SerialConfig, SerialTransport};

// === Devices ===
pub use device::{
    is_recoverable_error, Device, DeviceConfig, DeviceGuard, DeviceInfo, DeviceState, DeviceStats,
    GenericDevice, ReconnectCallback, ReconnectEvent, ScpiAdapter,
};

// === Heartbeat ===
pub use heartbeat::{
    CustomHeartbeat, EchoHeartbeat, HeartbeatCallback, HeartbeatConfig, HeartbeatEvent,
    HeartbeatRunner, HeartbeatStrategy, HeartbeatSuspend, PingHeartbeat, ScpiHeartbeat,
};

// === Logging ===
pub use logging::{format_hex, CallbackLogger, LogCallback, LogLevel, LoggingMode};

// === Frame limits (commonly needed constants) ===
pub use constants::{BINARY_MIN_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE, SOF};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "VDL v{} - device communication with streaming codecs, reconnect and heartbeat",
        VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_mentions_version() {
        assert!(info().contains(VERSION));
    }
}
