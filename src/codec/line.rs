//! Newline-delimited text framing, as used by SCPI instruments.

use bytes::Bytes;

use super::{DecodeOutcome, FrameCodec};
use crate::constants::{CARRIAGE_RETURN, DEFAULT_MAX_FRAME_SIZE, LINE_TERMINATOR};
use crate::error::{VdlError, VdlResult};
use crate::protocol::{Command, Response};

/// Strip trailing `\r` / `\n` from a line.
pub(crate) fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == CARRIAGE_RETURN || line[end - 1] == LINE_TERMINATOR) {
        end -= 1;
    }
    &line[..end]
}

/// One frame per `\n`-terminated line.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_frame_size: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for LineCodec {
    fn encode(&self, command: &Command) -> VdlResult<Vec<u8>> {
        let data = command.data();
        let needs_terminator = data.last() != Some(&LINE_TERMINATOR);
        let frame_len = data.len() + usize::from(needs_terminator);

        if frame_len > self.max_frame_size {
            return Err(VdlError::frame_too_large(frame_len, self.max_frame_size));
        }

        let mut frame = Vec::with_capacity(frame_len);
        frame.extend_from_slice(data);
        if needs_terminator {
            frame.push(LINE_TERMINATOR);
        }
        Ok(frame)
    }

    fn frame_length(&self, buffer: &[u8]) -> usize {
        buffer
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
            .map_or(0, |pos| pos + 1)
    }

    fn decode(&self, buffer: &[u8]) -> DecodeOutcome {
        let frame_len = self.frame_length(buffer);
        if frame_len == 0 {
            return DecodeOutcome::incomplete();
        }
        if frame_len > self.max_frame_size {
            return DecodeOutcome::error(
                VdlError::frame_too_large(frame_len, self.max_frame_size),
                frame_len,
            );
        }

        let line = trim_line_end(&buffer[..frame_len]);
        let response = Response::success(0, Bytes::copy_from_slice(line))
            .with_raw_frame(Bytes::copy_from_slice(&buffer[..frame_len]));
        DecodeOutcome::complete(response, frame_len)
    }

    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }

    fn name(&self) -> &'static str {
        "line"
    }
}
