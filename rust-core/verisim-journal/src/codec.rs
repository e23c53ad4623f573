// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Framed entry codec
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Every record is stored as a self-delimiting frame:
//
//   [4 bytes: length (u32, big-endian)]
//   [4 bytes: crc32 of payload (u32, big-endian)]
//   [N bytes: payload]
//
// Two frame formats exist. `Current` stores `payload length + 1` so that a
// stored length of zero can mark a tombstone (absent payload); a tombstone
// carries the checksum sentinel 0xFFFFFFFF so that an all-zero header,
// which is what a preallocated segment contains, always means end of data.
// `Legacy` stores the payload length directly and has no tombstones.
//
// Decoding never consumes a partial frame. Every attempt resolves to one
// of three outcomes: a complete frame, an incomplete frame (more bytes may
// arrive later), or the end of written data.

use std::io::{self, Read};

use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{FrameCorruption, JournalError, JournalResult};

/// Size of the fixed frame header (length + checksum).
pub const FRAME_HEADER_BYTES: usize = 4 + 4;

/// Checksum value stored in the header of a tombstone frame.
pub const TOMBSTONE_CHECKSUM: u32 = 0xFFFF_FFFF;

/// Initial capacity of a [`FrameBuffer`] created with `Default`.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32 * 1024;

// ---------------------------------------------------------------------------
// FrameFormat
// ---------------------------------------------------------------------------

/// On-disk frame layout, selected once when a journal is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Stored length is `payload length + 1`; zero marks a tombstone.
    #[default]
    Current,
    /// Stored length is the payload length; zero marks end of data.
    Legacy,
}

// ---------------------------------------------------------------------------
// Frame / Decoded
// ---------------------------------------------------------------------------

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The payload, or `None` for a tombstone.
    pub payload: Option<Vec<u8>>,
    /// Total number of bytes the frame occupies, header included.
    pub len: usize,
}

/// The outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, checksum-valid frame was decoded.
    Complete(Frame),
    /// Only part of a frame is available; nothing was consumed.
    Incomplete,
    /// No further frame has been written.
    EndOfData,
}

impl Decoded {
    /// Returns the frame if decoding completed.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Complete(frame) => Some(frame),
            Self::Incomplete | Self::EndOfData => None,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Encodes and decodes frames in one [`FrameFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    format: FrameFormat,
    max_entry_size: u32,
}

impl FrameCodec {
    /// Create a codec for `format` that rejects payloads larger than
    /// `max_entry_size` bytes.
    pub fn new(format: FrameFormat, max_entry_size: u32) -> Self {
        Self {
            format,
            max_entry_size,
        }
    }

    /// The frame format this codec reads and writes.
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// The largest payload this codec accepts.
    pub fn max_entry_size(&self) -> u32 {
        self.max_entry_size
    }

    /// Number of bytes the frame for `payload` occupies.
    pub fn frame_len(payload: Option<&[u8]>) -> usize {
        FRAME_HEADER_BYTES + payload.map_or(0, <[u8]>::len)
    }

    /// Encode `payload` (or a tombstone for `None`) into a new frame.
    pub fn encode(&self, payload: Option<&[u8]>) -> JournalResult<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::frame_len(payload));
        self.encode_into(payload, &mut out)?;
        Ok(out)
    }

    /// Encode `payload` and append the frame to `out`.
    pub fn encode_into(&self, payload: Option<&[u8]>, out: &mut Vec<u8>) -> JournalResult<()> {
        let size = payload.map_or(0, <[u8]>::len);
        if size > self.max_entry_size as usize {
            return Err(JournalError::EntryTooLarge {
                size,
                limit: self.max_entry_size as usize,
            });
        }

        let (length, checksum) = match (self.format, payload) {
            (FrameFormat::Current, None) => (0u32, TOMBSTONE_CHECKSUM),
            (FrameFormat::Current, Some(bytes)) => (size as u32 + 1, crc32(bytes)),
            (FrameFormat::Legacy, None) => {
                return Err(JournalError::Serialization(
                    "legacy frames cannot encode tombstones".to_string(),
                ))
            }
            (FrameFormat::Legacy, Some([])) => {
                return Err(JournalError::Serialization(
                    "legacy frames cannot encode empty payloads".to_string(),
                ))
            }
            (FrameFormat::Legacy, Some(bytes)) => (size as u32, crc32(bytes)),
        };

        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&checksum.to_be_bytes());
        if let Some(bytes) = payload {
            out.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Total length of the frame whose header starts `bytes`, if the header
    /// is present. Returns `Some(FRAME_HEADER_BYTES)` for end-of-data and
    /// tombstone headers.
    pub fn peek_frame_len(&self, bytes: &[u8]) -> Option<usize> {
        let (length, _) = read_header(bytes)?;
        let payload = match self.format {
            FrameFormat::Current => length.saturating_sub(1),
            FrameFormat::Legacy => length,
        };
        Some(FRAME_HEADER_BYTES + payload as usize)
    }

    /// Decode the frame at the start of `bytes`. `offset` is the position
    /// of `bytes[0]` within its segment and is only used in errors.
    ///
    /// An empty slice is [`Decoded::EndOfData`]; a slice holding only part
    /// of a frame is [`Decoded::Incomplete`].
    pub fn decode_slice(&self, bytes: &[u8], offset: u64) -> JournalResult<Decoded> {
        if bytes.is_empty() {
            return Ok(Decoded::EndOfData);
        }
        let Some((length, checksum)) = read_header(bytes) else {
            return Ok(Decoded::Incomplete);
        };

        let payload_len = match self.format {
            FrameFormat::Current => {
                if length == 0 {
                    return match checksum {
                        0 => Ok(Decoded::EndOfData),
                        TOMBSTONE_CHECKSUM => Ok(Decoded::Complete(Frame {
                            payload: None,
                            len: FRAME_HEADER_BYTES,
                        })),
                        other => Err(JournalError::Corrupted {
                            offset,
                            detail: FrameCorruption::InvalidTombstone(other),
                        }),
                    };
                }
                length - 1
            }
            FrameFormat::Legacy => {
                if length == 0 {
                    return Ok(Decoded::EndOfData);
                }
                length
            }
        };

        if payload_len > self.max_entry_size {
            return Err(JournalError::Corrupted {
                offset,
                detail: FrameCorruption::LengthExceedsMaximum {
                    length: payload_len,
                    max_length: self.max_entry_size,
                },
            });
        }

        let end = FRAME_HEADER_BYTES + payload_len as usize;
        if bytes.len() < end {
            return Ok(Decoded::Incomplete);
        }

        let payload = &bytes[FRAME_HEADER_BYTES..end];
        let actual = crc32(payload);
        if actual != checksum {
            return Err(JournalError::Corrupted {
                offset,
                detail: FrameCorruption::ChecksumMismatch {
                    expected: checksum,
                    actual,
                },
            });
        }

        Ok(Decoded::Complete(Frame {
            payload: Some(payload.to_vec()),
            len: end,
        }))
    }
}

fn read_header(bytes: &[u8]) -> Option<(u32, u32)> {
    let header: &[u8; FRAME_HEADER_BYTES] = bytes.get(..FRAME_HEADER_BYTES)?.try_into().ok()?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Some((length, checksum))
}

/// CRC32 (IEEE) of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// A read buffer over a byte source that yields whole frames.
///
/// The buffer tracks the source offset of its first byte (`origin`), so a
/// caller can always tell where the next undecoded frame starts via
/// [`source_offset`](Self::source_offset). The source handed to
/// [`read_frame`](Self::read_frame) must be positioned at
/// `source_offset() + remaining()`, i.e. just past the buffered bytes.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    pos: usize,
    limit: usize,
    origin: u64,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl FrameBuffer {
    /// Create an empty buffer. The capacity grows on demand when a frame
    /// larger than it is encountered.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(FRAME_HEADER_BYTES)],
            pos: 0,
            limit: 0,
            origin: 0,
        }
    }

    /// Read position within the buffered bytes.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of buffered bytes not yet decoded.
    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Current allocated capacity.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Source offset of the next undecoded byte.
    pub fn source_offset(&self) -> u64 {
        self.origin + self.pos as u64
    }

    /// Source offset just past the last buffered byte.
    pub fn fill_offset(&self) -> u64 {
        self.origin + self.limit as u64
    }

    /// Discard all buffered bytes and restart at source offset `offset`.
    pub fn reset(&mut self, offset: u64) {
        self.pos = 0;
        self.limit = 0;
        self.origin = offset;
    }

    /// Append bytes that arrived out of band (for example from a
    /// replication stream) after the currently buffered ones.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.compact();
        let needed = self.limit + bytes.len();
        if needed > self.buf.len() {
            self.buf.resize(needed, 0);
        }
        self.buf[self.limit..needed].copy_from_slice(bytes);
        self.limit = needed;
    }

    /// Decode the next frame, reading more bytes from `src` when the
    /// buffered ones do not hold a complete frame.
    ///
    /// The buffer only advances past a frame that decoded completely. On
    /// [`Decoded::Incomplete`] every byte read so far is kept and the buffer
    /// is left positioned at the start of the partial frame.
    pub fn read_frame<R: Read>(&mut self, codec: &FrameCodec, src: &mut R) -> JournalResult<Decoded> {
        // Fast path: the whole frame is already buffered.
        if self.remaining() > 0 {
            match codec.decode_slice(&self.buf[self.pos..self.limit], self.source_offset())? {
                Decoded::Complete(frame) => {
                    self.pos += frame.len;
                    return Ok(Decoded::Complete(frame));
                }
                Decoded::EndOfData => return Ok(Decoded::EndOfData),
                Decoded::Incomplete => {}
            }
        }

        // Slow path: make room, then pull from the source until a frame is
        // complete or the source has nothing more.
        self.compact();
        loop {
            if let Some(frame_len) = codec.peek_frame_len(&self.buf[..self.limit]) {
                if frame_len > self.buf.len() {
                    self.buf.resize(frame_len, 0);
                }
            }

            let read = self.fill(src)?;
            match codec.decode_slice(&self.buf[..self.limit], self.origin)? {
                Decoded::Complete(frame) => {
                    self.pos = frame.len;
                    return Ok(Decoded::Complete(frame));
                }
                Decoded::EndOfData => return Ok(Decoded::EndOfData),
                Decoded::Incomplete => {
                    let grow = codec
                        .peek_frame_len(&self.buf[..self.limit])
                        .is_some_and(|frame_len| frame_len > self.buf.len());
                    if read == 0 || !grow {
                        return Ok(Decoded::Incomplete);
                    }
                }
            }
        }
    }

    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.buf.copy_within(self.pos..self.limit, 0);
        self.origin += self.pos as u64;
        self.limit -= self.pos;
        self.pos = 0;
    }

    fn fill<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        let mut total = 0;
        while self.limit < self.buf.len() {
            match src.read(&mut self.buf[self.limit..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.limit += n;
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// A source that hands out pre-scripted chunks, one per `read` call.
    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ScriptedSource {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    impl Read for ScriptedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                chunk.drain(..n);
                self.chunks.push_front(chunk);
            }
            Ok(n)
        }
    }

    fn codec() -> FrameCodec {
        FrameCodec::new(FrameFormat::Current, 1024)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_encode_layout() {
        let frame = codec().encode(Some(b"abc")).unwrap();
        assert_eq!(&frame[0..4], &4u32.to_be_bytes());
        assert_eq!(&frame[4..8], &crc32(b"abc").to_be_bytes());
        assert_eq!(&frame[8..], b"abc");
    }

    #[test]
    fn test_tombstone_and_empty_payload_are_distinct() {
        let codec = codec();
        let tombstone = codec.encode(None).unwrap();
        let empty = codec.encode(Some(&[])).unwrap();
        assert_eq!(tombstone, [0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty, [0, 0, 0, 1, 0, 0, 0, 0]);

        let decoded = codec.decode_slice(&tombstone, 0).unwrap().into_frame().unwrap();
        assert_eq!(decoded.payload, None);
        let decoded = codec.decode_slice(&empty, 0).unwrap().into_frame().unwrap();
        assert_eq!(decoded.payload, Some(Vec::new()));
    }

    #[test]
    fn test_zero_header_is_end_of_data() {
        assert_eq!(codec().decode_slice(&[0u8; 16], 64).unwrap(), Decoded::EndOfData);
    }

    #[test]
    fn test_bad_tombstone_checksum_is_corruption() {
        let err = codec().decode_slice(&[0, 0, 0, 0, 0, 0, 0, 7], 64).unwrap_err();
        assert!(matches!(
            err,
            JournalError::Corrupted {
                offset: 64,
                detail: FrameCorruption::InvalidTombstone(7)
            }
        ));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut frame = codec().encode(Some(b"payload")).unwrap();
        frame[10] ^= 0xFF;
        let err = codec().decode_slice(&frame, 128).unwrap_err();
        assert!(matches!(
            err,
            JournalError::Corrupted {
                offset: 128,
                detail: FrameCorruption::ChecksumMismatch { .. }
            }
        ));
    }

    #[test]
    fn test_declared_length_over_maximum() {
        let small = FrameCodec::new(FrameFormat::Current, 16);
        let frame = codec().encode(Some(&payload(32))).unwrap();
        let err = small.decode_slice(&frame, 0).unwrap_err();
        assert!(matches!(
            err,
            JournalError::Corrupted {
                detail: FrameCorruption::LengthExceedsMaximum {
                    length: 32,
                    max_length: 16
                },
                ..
            }
        ));
        assert!(matches!(
            small.encode(Some(&payload(17))),
            Err(JournalError::EntryTooLarge { size: 17, limit: 16 })
        ));
    }

    #[test]
    fn test_legacy_format() {
        let legacy = FrameCodec::new(FrameFormat::Legacy, 1024);
        let frame = legacy.encode(Some(b"xyz")).unwrap();
        assert_eq!(&frame[0..4], &3u32.to_be_bytes());
        let decoded = legacy.decode_slice(&frame, 0).unwrap().into_frame().unwrap();
        assert_eq!(decoded.payload.as_deref(), Some(&b"xyz"[..]));
        assert_eq!(decoded.len, 11);

        assert!(legacy.encode(None).is_err());
        assert!(legacy.encode(Some(&[])).is_err());
        assert_eq!(legacy.decode_slice(&[0u8; 8], 0).unwrap(), Decoded::EndOfData);
    }

    #[test]
    fn test_fast_path_decodes_buffered_frame() {
        let codec = codec();
        let body = payload(42);
        let frame = codec.encode(Some(&body)).unwrap();
        assert_eq!(frame.len(), 50);

        let mut buffer = FrameBuffer::with_capacity(56);
        buffer.push_bytes(&frame);
        let mut source = ScriptedSource::empty();
        let decoded = buffer.read_frame(&codec, &mut source).unwrap();
        assert_eq!(
            decoded,
            Decoded::Complete(Frame {
                payload: Some(body),
                len: 50
            })
        );
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.source_offset(), 50);
    }

    #[test]
    fn test_slow_path_end_of_stream() {
        let codec = codec();
        let mut buffer = FrameBuffer::with_capacity(56);
        let decoded = buffer.read_frame(&codec, &mut ScriptedSource::empty()).unwrap();
        assert_eq!(decoded, Decoded::EndOfData);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.source_offset(), 0);
    }

    #[test]
    fn test_slow_path_end_of_stream_after_consumed_frame() {
        let codec = codec();
        let mut buffer = FrameBuffer::with_capacity(56);
        buffer.push_bytes(&codec.encode(Some(&payload(42))).unwrap());
        assert!(matches!(
            buffer.read_frame(&codec, &mut ScriptedSource::empty()).unwrap(),
            Decoded::Complete(_)
        ));

        let decoded = buffer.read_frame(&codec, &mut ScriptedSource::empty()).unwrap();
        assert_eq!(decoded, Decoded::EndOfData);
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.source_offset(), 50);
    }

    #[test]
    fn test_slow_path_reads_full_frame_from_source() {
        let codec = codec();
        let body = payload(20);
        let frame = codec.encode(Some(&body)).unwrap();
        assert_eq!(frame.len(), 28);

        let mut buffer = FrameBuffer::with_capacity(56);
        let mut source = ScriptedSource::new(vec![frame]);
        let decoded = buffer.read_frame(&codec, &mut source).unwrap();
        assert_eq!(decoded.into_frame().unwrap().payload, Some(body));
        assert_eq!(buffer.remaining(), 0);
        assert_eq!(buffer.source_offset(), 28);
    }

    #[test]
    fn test_slow_path_partial_frame_from_source_is_not_consumed() {
        let codec = codec();
        let frame = codec.encode(Some(&payload(42))).unwrap();
        let partial = frame[..28].to_vec();

        let mut buffer = FrameBuffer::with_capacity(56);
        let mut source = ScriptedSource::new(vec![partial]);
        let decoded = buffer.read_frame(&codec, &mut source).unwrap();
        assert_eq!(decoded, Decoded::Incomplete);
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.remaining(), 28);

        // The rest arrives later and the frame completes.
        let mut rest = ScriptedSource::new(vec![frame[28..].to_vec()]);
        let decoded = buffer.read_frame(&codec, &mut rest).unwrap();
        assert_eq!(decoded.into_frame().unwrap().len, 50);
    }

    #[test]
    fn test_slow_path_prefilled_partial_rewinds() {
        let codec = codec();
        let frame = codec.encode(Some(&payload(42))).unwrap();

        let mut buffer = FrameBuffer::with_capacity(56);
        buffer.push_bytes(&frame[..28]);
        let decoded = buffer.read_frame(&codec, &mut ScriptedSource::empty()).unwrap();
        assert_eq!(decoded, Decoded::Incomplete);
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.remaining(), 28);
    }

    #[test]
    fn test_buffer_grows_for_large_frame() {
        let codec = codec();
        let body = payload(300);
        let frame = codec.encode(Some(&body)).unwrap();

        let mut buffer = FrameBuffer::with_capacity(16);
        let chunks = frame.chunks(7).map(<[u8]>::to_vec).collect();
        let mut source = ScriptedSource::new(chunks);
        let decoded = buffer.read_frame(&codec, &mut source).unwrap();
        assert_eq!(decoded.into_frame().unwrap().payload, Some(body));
        assert!(buffer.capacity() >= frame.len());
    }

    #[test]
    fn test_sequential_frames_across_refills() {
        let codec = codec();
        let mut stream = Vec::new();
        for i in 0..10u8 {
            codec.encode_into(Some(&[i; 5]), &mut stream).unwrap();
        }

        let mut buffer = FrameBuffer::with_capacity(20);
        let mut source = &stream[..];
        for i in 0..10u8 {
            let frame = buffer.read_frame(&codec, &mut source).unwrap().into_frame().unwrap();
            assert_eq!(frame.payload, Some(vec![i; 5]));
        }
        assert_eq!(buffer.read_frame(&codec, &mut source).unwrap(), Decoded::EndOfData);
        assert_eq!(buffer.source_offset(), stream.len() as u64);
    }
}
