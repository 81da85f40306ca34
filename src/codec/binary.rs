//! Length-prefixed binary framing with a CRC-16 trailer.

use crc::{Crc, CRC_16_IBM_3740};
use tracing::trace;

use super::{DecodeOutcome, FrameCodec};
use crate::constants::{
    BINARY_CRC_SIZE, BINARY_HEADER_SIZE, BINARY_MIN_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE, SOF,
};
use crate::error::{VdlError, VdlResult};
use crate::protocol::{Command, Response};

/// CRC-16/CCITT (poly 0x1021, init 0xFFFF, no reflection)
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC used by the binary frame.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Declared frame length, when the LEN field is available.
#[inline]
fn declared_length(buffer: &[u8]) -> Option<usize> {
    let len = u16::from_le_bytes([*buffer.get(1)?, *buffer.get(2)?]);
    Some(BINARY_HEADER_SIZE + len as usize + BINARY_CRC_SIZE)
}

/// `SOF(0xAA) | LEN(u16 LE) | FUNC | DATA | CRC16(LE)`
#[derive(Debug, Clone)]
pub struct BinaryCodec {
    max_frame_size: usize,
}

impl BinaryCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for BinaryCodec {
    fn encode(&self, command: &Command) -> VdlResult<Vec<u8>> {
        let data = command.data();
        let frame_len = BINARY_HEADER_SIZE + data.len() + BINARY_CRC_SIZE;

        if frame_len > self.max_frame_size {
            return Err(VdlError::frame_too_large(frame_len, self.max_frame_size));
        }
        let data_len = u16::try_from(data.len())
            .map_err(|_| VdlError::frame_too_large(frame_len, BINARY_MIN_FRAME_SIZE + u16::MAX as usize))?;

        let mut frame = Vec::with_capacity(frame_len);
        frame.push(SOF);
        frame.extend_from_slice(&data_len.to_le_bytes());
        frame.push(command.function_code());
        frame.extend_from_slice(data);

        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        trace!("Encoded binary frame FC={:02X} len={}", command.function_code(), frame_len);
        Ok(frame)
    }

    fn frame_length(&self, buffer: &[u8]) -> usize {
        if buffer.len() < BINARY_MIN_FRAME_SIZE || buffer[0] != SOF {
            return 0;
        }
        match declared_length(buffer) {
            Some(frame_len) if buffer.len() >= frame_len => frame_len,
            _ => 0,
        }
    }

    fn decode(&self, buffer: &[u8]) -> DecodeOutcome {
        if buffer.len() < BINARY_MIN_FRAME_SIZE {
            return DecodeOutcome::incomplete();
        }

        // Drop everything before the next SOF
        if buffer[0] != SOF {
            let skip = buffer
                .iter()
                .position(|&b| b == SOF)
                .unwrap_or(buffer.len());
            return DecodeOutcome::error(
                VdlError::invalid_frame(format!("{} bytes of garbage before SOF", skip)),
                skip,
            );
        }

        let frame_len = match declared_length(buffer) {
            Some(len) => len,
            None => return DecodeOutcome::incomplete(),
        };
        if buffer.len() < frame_len {
            return DecodeOutcome::incomplete();
        }
        if frame_len > self.max_frame_size {
            return DecodeOutcome::error(
                VdlError::frame_too_large(frame_len, self.max_frame_size),
                1,
            );
        }

        let crc_at = frame_len - BINARY_CRC_SIZE;
        let expected = crc16(&buffer[..crc_at]);
        let actual = u16::from_le_bytes([buffer[crc_at], buffer[crc_at + 1]]);
        if expected != actual {
            return DecodeOutcome::error(VdlError::checksum(expected, actual), 1);
        }

        let response = Response::success(
            buffer[3],
            bytes::Bytes::copy_from_slice(&buffer[BINARY_HEADER_SIZE..crc_at]),
        )
        .with_raw_frame(bytes::Bytes::copy_from_slice(&buffer[..frame_len]));

        DecodeOutcome::complete(response, frame_len)
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }

    fn name(&self) -> &'static str {
        "binary"
    }
}

// ============================================================================
// Tests
// ============================================================================
