// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines every error condition the journal can surface: corruption of
// frames or segment descriptors, I/O failures, caller precondition
// violations, missing segment files and use after close.

use std::path::PathBuf;

use thiserror::Error;

/// The ways a single on-disk frame can be found to be corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameCorruption {
    /// The stored CRC32 does not match the payload bytes.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The CRC32 value stored in the frame header.
        expected: u32,
        /// The CRC32 value computed from the payload.
        actual: u32,
    },

    /// The frame header declares a payload larger than the configured
    /// maximum entry size.
    #[error("declared length {length} exceeds maximum entry size {max_length}")]
    LengthExceedsMaximum {
        /// The payload length declared in the header.
        length: u32,
        /// The configured maximum entry size.
        max_length: u32,
    },

    /// A zero-length (tombstone) header carries a checksum other than the
    /// tombstone sentinel.
    #[error("tombstone frame carries unexpected checksum {0:#010x}")]
    InvalidTombstone(u32),
}

/// Coarse classification of [`JournalError`], used by callers that only
/// need to decide between retrying, resynchronizing and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stored data is damaged or in an unknown format.
    Corruption,
    /// The operating system reported a failure.
    Io,
    /// The caller violated an API precondition.
    Precondition,
    /// A segment file that should exist is missing.
    NotFound,
    /// The journal or segment has been closed.
    Closed,
    /// The payload serializer failed.
    Serialization,
}

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// An I/O error occurred while reading or writing a segment file.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame inside the valid region of a segment failed validation.
    #[error("corrupt frame at offset {offset}: {detail}")]
    Corrupted {
        /// Byte offset of the frame within its segment.
        offset: u64,
        /// What was wrong with the frame.
        detail: FrameCorruption,
    },

    /// The segment descriptor was written by an unknown format version.
    #[error("unsupported segment descriptor version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found on disk.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// The segment descriptor could not be parsed.
    #[error("malformed segment descriptor: {0}")]
    MalformedDescriptor(String),

    /// A segment file that was discovered or expected could not be found.
    #[error("segment file not found: {}", .0.display())]
    SegmentNotFound(PathBuf),

    /// An entry is too large to be stored.
    #[error("entry of {size} bytes exceeds the limit of {limit} bytes")]
    EntryTooLarge {
        /// Size of the encoded payload or frame.
        size: usize,
        /// The limit it was checked against.
        limit: usize,
    },

    /// `commit` was called with an index that has not been appended yet.
    #[error("cannot commit index {index}: last index is {last_index}")]
    CommitBeyondLastIndex {
        /// The requested commit index.
        index: u64,
        /// The writer's last index at the time of the call.
        last_index: u64,
    },

    /// An index lies outside the range an operation accepts.
    #[error("index {index} is outside the valid range [{first}, {last}]")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// Lowest accepted index.
        first: u64,
        /// Highest accepted index.
        last: u64,
    },

    /// Truncation would discard entries at or below the commit watermark.
    #[error("cannot truncate to {index}: entries up to {commit_index} are committed")]
    TruncateCommitted {
        /// The requested truncation index.
        index: u64,
        /// The current commit watermark.
        commit_index: u64,
    },

    /// The journal configuration is invalid.
    #[error("invalid journal configuration: {0}")]
    InvalidConfig(String),

    /// The payload serializer failed or rejected a payload.
    #[error("entry serialization error: {0}")]
    Serialization(String),

    /// JSON serialization or deserialization of a payload failed.
    #[error("JSON error in journal payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The journal has been closed.
    #[error("journal is closed")]
    Closed,

    /// The segment has been closed (compacted, truncated away or the
    /// journal closed).
    #[error("segment {0} is closed")]
    SegmentClosed(u64),
}

impl JournalError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Corrupted { .. } | Self::UnsupportedVersion { .. } | Self::MalformedDescriptor(_) => {
                ErrorKind::Corruption
            }
            Self::Io(_) => ErrorKind::Io,
            Self::SegmentNotFound(_) => ErrorKind::NotFound,
            Self::EntryTooLarge { .. }
            | Self::CommitBeyondLastIndex { .. }
            | Self::IndexOutOfRange { .. }
            | Self::TruncateCommitted { .. }
            | Self::InvalidConfig(_) => ErrorKind::Precondition,
            Self::Serialization(_) | Self::Json(_) => ErrorKind::Serialization,
            Self::Closed | Self::SegmentClosed(_) => ErrorKind::Closed,
        }
    }

    /// Returns `true` for errors caused by damaged or unknown stored data.
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }
}

/// Convenience type alias for journal results.
pub type JournalResult<T> = Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_checksum_mismatch() {
        let error = JournalError::Corrupted {
            offset: 64,
            detail: FrameCorruption::ChecksumMismatch {
                expected: 0xDEADBEEF,
                actual: 0xCAFEBABE,
            },
        };
        let message = format!("{error}");
        assert!(message.contains("offset 64"));
        assert!(message.contains("0xdeadbeef"));
        assert!(message.contains("0xcafebabe"));
        assert!(error.is_corruption());
    }

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let error = JournalError::Io(io_error);
        assert!(format!("{error}").contains("file gone"));
        assert_eq!(error.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            JournalError::CommitBeyondLastIndex {
                index: 5,
                last_index: 3
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            JournalError::SegmentNotFound(PathBuf::from("j-1.log")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(JournalError::Closed.kind(), ErrorKind::Closed);
        assert_eq!(
            JournalError::UnsupportedVersion {
                found: 9,
                expected: 1
            }
            .kind(),
            ErrorKind::Corruption
        );
    }
}
