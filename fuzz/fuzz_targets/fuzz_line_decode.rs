//! Line decoder must never panic on arbitrary input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vdl::{FrameCodec, LineCodec};

fuzz_target!(|data: &[u8]| {
    let codec = LineCodec::new();
    let mut buffer = data;
    loop {
        let frame_len = codec.frame_length(buffer);
        let outcome = codec.decode(buffer);
        if frame_len == 0 || outcome.consumed == 0 {
            break;
        }
        if let Ok(response) = &outcome.result {
            assert!(!response.data().contains(&b'\n'));
        }
        buffer = &buffer[outcome.consumed..];
    }
});
