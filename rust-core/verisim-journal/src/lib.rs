// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A segmented, append-only record journal used as the durable log beneath
// replicated state machines. Callers append typed entries, which receive
// consecutive record indices starting at 1, mark a prefix as committed,
// read entries back through independent cursors, truncate uncommitted
// tails, and compact away segments that are no longer needed.
//
// # Architecture
//
// The journal is a directory of **segment files** named
// `{name}-{id}.log`. Each segment is preallocated to a fixed size and holds
// a 64-byte descriptor followed by length-prefixed, CRC32-protected frames,
// one per record. A sparse in-memory index per segment bounds the cost of
// seeking to a record index.
//
// ## On-disk frame format (all integers big-endian)
//
// ```text
// [4 bytes: length (u32)]    -- payload length + 1; 0 marks a tombstone
// [4 bytes: crc32 (u32)]     -- CRC32 of the payload; 0xFFFFFFFF for tombstones
// [N bytes: payload]
// ```
//
// ## Usage
//
// ```no_run
// use verisim_journal::{BytesSerdes, JournalConfig, ReaderMode, SegmentedJournal};
//
// let config = JournalConfig::new("/tmp/verisim-journal", "raft");
// let mut journal = SegmentedJournal::open(config, BytesSerdes).unwrap();
//
// // Append and commit.
// let writer = journal.writer().unwrap();
// let index = writer.append(b"hello".to_vec()).unwrap().index;
// writer.commit(index).unwrap();
//
// // Read back committed entries.
// let mut reader = journal.open_reader(1, ReaderMode::Commits).unwrap();
// while let Some(indexed) = reader.try_next().unwrap() {
//     println!("index={} bytes={}", indexed.index, indexed.entry.len());
// }
// ```

pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod file;
pub mod index;
pub mod journal;
pub mod reader;
pub mod registry;
pub mod segment;
pub mod serdes;
pub mod writer;

// Re-export the primary public API for ergonomic imports.
pub use codec::{Decoded, Frame, FrameBuffer, FrameCodec, FrameFormat};
pub use config::{JournalConfig, StorageLevel};
pub use descriptor::{Descriptor, DescriptorBuilder, DESCRIPTOR_BYTES, VERSION};
pub use error::{ErrorKind, FrameCorruption, JournalError, JournalResult};
pub use index::{Position, SparseIndex};
pub use journal::SegmentedJournal;
pub use reader::{JournalReader, ReaderMode};
pub use segment::Segment;
pub use serdes::{BytesSerdes, EntrySerdes, JsonSerdes, Tombstoned};
pub use writer::{Indexed, JournalWriter};
