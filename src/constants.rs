//! Wire-format and configuration constants
//!
//! Binary frame layout:
//!
//! ```text
//! +------+---------+------+-----------+---------+
//! | SOF  | LEN     | FUNC | DATA      | CRC16   |
//! | 0xAA | u16 LE  | u8   | LEN bytes | u16 LE  |
//! +------+---------+------+-----------+---------+
//! ```

// ============================================================================
// Binary Frame Constants
// ============================================================================

/// Start-of-frame marker
pub const SOF: u8 = 0xAA;

/// SOF(1) + LEN(2) + FUNC(1)
pub const BINARY_HEADER_SIZE: usize = 4;

/// Trailing CRC16 size
pub const BINARY_CRC_SIZE: usize = 2;

/// Smallest valid binary frame (empty payload)
pub const BINARY_MIN_FRAME_SIZE: usize = BINARY_HEADER_SIZE + BINARY_CRC_SIZE;

/// Bytes needed before the LEN field can be read
pub const BINARY_LENGTH_PREFIX: usize = 3;

// ============================================================================
// Text Frame Constants
// ============================================================================

/// Line terminator for text protocols
pub const LINE_TERMINATOR: u8 = b'\n';

/// Carriage return, stripped from decoded lines
pub const CARRIAGE_RETURN: u8 = b'\r';

// ============================================================================
// Sizes
// ============================================================================

/// Default maximum frame size for both codecs
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65536;

/// Chunk size used for a single transport read during reassembly
pub const READ_CHUNK_SIZE: usize = 1024;

// ============================================================================
// Timing defaults (milliseconds)
// ============================================================================

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_HEARTBEAT_MAX_FAILURES: u32 = 3;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Upper bound on `SYST:ERR?` reads when draining an instrument error queue
pub const SCPI_MAX_ERROR_DRAIN: usize = 100;
