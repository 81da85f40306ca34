//! # Frame codecs
//!
//! A codec turns a [`Command`] into wire bytes and reconstructs a [`Response`]
//! from a byte stream that may arrive in arbitrary fragments.
//!
//! The device's reassembly loop drives a codec through three calls:
//!
//! 1. [`FrameCodec::frame_length`] - is a whole frame buffered? (0 = not yet)
//! 2. [`FrameCodec::decode`] - decode it and report how many bytes to drop
//! 3. the caller skips exactly [`DecodeOutcome::consumed`] bytes, success or not
//!
//! A decode error with `consumed > 0` lets the caller resynchronise by dropping
//! garbage before the next start-of-frame.
//!
//! | Codec | Frame | Checksum |
//! |-------|-------|----------|
//! | [`BinaryCodec`] | `SOF LEN FUNC DATA CRC` | CRC-16/CCITT |
//! | [`LineCodec`] | bytes through `\n` | none |

mod binary;
mod line;

pub use binary::{crc16, BinaryCodec};
pub use line::LineCodec;

pub(crate) use line::trim_line_end;

use crate::error::{ErrorCode, VdlError, VdlResult};
use crate::protocol::{Command, Response};

/// Result of one decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Decoded response or the reason decoding failed
    pub result: VdlResult<Response>,
    /// Bytes the caller must drop from the front of its buffer
    pub consumed: usize,
}

impl DecodeOutcome {
    pub fn complete(response: Response, consumed: usize) -> Self {
        Self {
            result: Ok(response),
            consumed,
        }
    }

    /// More bytes are needed; nothing is consumed.
    pub fn incomplete() -> Self {
        Self {
            result: Err(VdlError::incomplete_frame()),
            consumed: 0,
        }
    }

    pub fn error(error: VdlError, consumed: usize) -> Self {
        Self {
            result: Err(error),
            consumed,
        }
    }

    /// True when the decoder is only waiting for more data.
    pub fn is_incomplete(&self) -> bool {
        matches!(&self.result, Err(e) if e.code() == ErrorCode::IncompleteFrame)
    }
}

/// Wire-format strategy: framing, encoding, decoding.
///
/// Implementations are stateless apart from their max frame size, so the same
/// codec can be used for any number of calls.
pub trait FrameCodec: Send + Sync {
    /// Encode a command into a complete frame.
    ///
    /// Fails with `frame_too_large` before producing any bytes when the frame
    /// would exceed [`max_frame_size`](Self::max_frame_size).
    fn encode(&self, command: &Command) -> VdlResult<Vec<u8>>;

    /// Length of the complete frame at the front of `buffer`, or 0 when no whole
    /// frame is buffered yet. Pure function of its input.
    fn frame_length(&self, buffer: &[u8]) -> usize;

    /// Decode the frame at the front of `buffer`.
    fn decode(&self, buffer: &[u8]) -> DecodeOutcome;

    fn max_frame_size(&self) -> usize;

    fn set_max_frame_size(&mut self, size: usize);

    /// Short codec name for logs.
    fn name(&self) -> &'static str;
}

impl<C: FrameCodec + ?Sized> FrameCodec for Box<C> {
    fn encode(&self, command: &Command) -> VdlResult<Vec<u8>> {
        (**self).encode(command)
    }

    fn frame_length(&self, buffer: &[u8]) -> usize {
        (**self).frame_length(buffer)
    }

    fn decode(&self, buffer: &[u8]) -> DecodeOutcome {
        (**self).decode(buffer)
    }

    fn max_frame_size(&self) -> usize {
        (**self).max_frame_size()
    }

    fn set_max_frame_size(&mut self, size: usize) {
        (**self).set_max_frame_size(size)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_helpers() {
        assert!(DecodeOutcome::incomplete().is_incomplete());
        assert_eq!(DecodeOutcome::incomplete().consumed, 0);

        let outcome = DecodeOutcome::error(VdlError::invalid_frame("junk"), 3);
        assert!(!outcome.is_incomplete());
        assert_eq!(outcome.consumed, 3);

        let outcome = DecodeOutcome::complete(Response::success(1, Vec::new()), 6);
        assert!(outcome.result.is_ok());
    }

    #[test]
    fn test_boxed_codec_delegates() {
        let codec: Box<dyn FrameCodec> = Box::new(LineCodec::new());
        assert_eq!(codec.name(), "line");
        assert_eq!(codec.frame_length(b"OK\n"), 3);
    }
}
