// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for journal frame decoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use verisim_journal::{Decoded, FrameBuffer, FrameCodec, FrameFormat};

fuzz_target!(|data: &[u8]| {
    for format in [FrameFormat::Current, FrameFormat::Legacy] {
        let codec = FrameCodec::new(format, 64 * 1024);

        // Whole-slice decoding must never panic, only report corruption.
        let mut offset = 0usize;
        while offset < data.len() {
            match codec.decode_slice(&data[offset..], offset as u64) {
                Ok(Decoded::Complete(frame)) => offset += frame.len,
                Ok(Decoded::Incomplete | Decoded::EndOfData) | Err(_) => break,
            }
        }

        // Streaming through a small buffer must agree with slice decoding.
        let mut buffer = FrameBuffer::with_capacity(16);
        let mut src = data;
        let mut streamed = 0usize;
        while let Ok(Decoded::Complete(frame)) = buffer.read_frame(&codec, &mut src) {
            streamed += frame.len;
        }
        assert_eq!(streamed, offset);
    }
});
