//! Binary decoder must never panic and must always make progress.
//!
//! Feeds arbitrary bytes through the same reassembly steps a device uses:
//! `frame_length`, `decode`, then drop `consumed` bytes.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vdl::{BinaryCodec, ErrorCode, FrameCodec};

#[derive(Debug, Arbitrary)]
struct Input {
    max_frame_size: u16,
    stream: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut codec = BinaryCodec::new();
    codec.set_max_frame_size(usize::from(input.max_frame_size).max(6));

    let mut buffer = &input.stream[..];
    while !buffer.is_empty() {
        let frame_len = codec.frame_length(buffer);
        assert!(frame_len <= buffer.len());

        let outcome = codec.decode(buffer);
        assert!(outcome.consumed <= buffer.len());

        match &outcome.result {
            Ok(response) => {
                assert_eq!(outcome.consumed, frame_len);
                assert!(response.data().len() + 6 == frame_len);
            }
            Err(e) if e.code() == ErrorCode::IncompleteFrame => {
                assert_eq!(outcome.consumed, 0);
                break;
            }
            Err(_) => {}
        }

        // a stuck decoder would spin forever in the device loop
        if outcome.consumed == 0 {
            break;
        }
        buffer = &buffer[outcome.consumed..];
    }
});
