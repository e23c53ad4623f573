// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Segment descriptor
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixed 64-byte header at the start of every segment file.
//
// On-disk layout (all integers big-endian):
//   [0..4)   version          (u32)
//   [4..12)  id               (u64)  -- segment identifier
//   [12..20) index            (u64)  -- first record index in the segment
//   [20..24) max_segment_size (u32)
//   [24..32) max_entries      (u64)  -- u32 value, widened on disk
//   [32..40) updated          (u64)  -- milliseconds since the Unix epoch
//   [40..64) reserved, zero

use serde::Serialize;

use crate::error::{JournalError, JournalResult};

/// Descriptor format version understood by this build.
pub const VERSION: u32 = 1;

/// Size of the descriptor on disk.
pub const DESCRIPTOR_BYTES: usize = 64;

/// Byte range of the `updated` field, rewritten in place on truncation.
pub const UPDATED_RANGE: std::ops::Range<usize> = 32..40;

/// Identity and bounds of one segment.
///
/// Only [`Descriptor::parse`] and [`DescriptorBuilder`] construct one, so
/// the version is always checked or fixed at [`VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    version: u32,
    id: u64,
    index: u64,
    max_segment_size: u32,
    max_entries: u32,
    updated: u64,
}

impl Descriptor {
    /// Start building a descriptor. The version is always [`VERSION`].
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    /// Format version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Segment identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// First record index stored in the segment.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Maximum size of the segment file in bytes.
    pub fn max_segment_size(&self) -> u32 {
        self.max_segment_size
    }

    /// Maximum number of entries the segment may hold.
    pub fn max_entries(&self) -> u32 {
        self.max_entries
    }

    /// Last time the segment bounds changed.
    pub fn updated(&self) -> u64 {
        self.updated
    }

    /// Replace the `updated` field.
    pub fn set_updated(&mut self, updated: u64) {
        self.updated = updated;
    }

    /// Serialize to the fixed on-disk layout.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_BYTES] {
        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        bytes[0..4].copy_from_slice(&self.version.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.id.to_be_bytes());
        bytes[12..20].copy_from_slice(&self.index.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.max_segment_size.to_be_bytes());
        bytes[24..32].copy_from_slice(&u64::from(self.max_entries).to_be_bytes());
        bytes[UPDATED_RANGE].copy_from_slice(&self.updated.to_be_bytes());
        bytes
    }

    /// Parse a descriptor from the first [`DESCRIPTOR_BYTES`] of `bytes`.
    pub fn parse(bytes: &[u8]) -> JournalResult<Self> {
        if bytes.len() < DESCRIPTOR_BYTES {
            return Err(JournalError::MalformedDescriptor(format!(
                "need {DESCRIPTOR_BYTES} bytes, got {}",
                bytes.len()
            )));
        }

        let version = be_u32(&bytes[0..4]);
        if version != VERSION {
            return Err(JournalError::UnsupportedVersion {
                found: version,
                expected: VERSION,
            });
        }

        let max_entries = be_u64(&bytes[24..32]);
        let max_entries = u32::try_from(max_entries).map_err(|_| {
            JournalError::MalformedDescriptor(format!("max entries {max_entries} out of range"))
        })?;

        let descriptor = Self {
            version,
            id: be_u64(&bytes[4..12]),
            index: be_u64(&bytes[12..20]),
            max_segment_size: be_u32(&bytes[20..24]),
            max_entries,
            updated: be_u64(&bytes[UPDATED_RANGE]),
        };

        if descriptor.index == 0 {
            return Err(JournalError::MalformedDescriptor(
                "first index must be at least 1".to_string(),
            ));
        }
        if (descriptor.max_segment_size as usize) < DESCRIPTOR_BYTES {
            return Err(JournalError::MalformedDescriptor(format!(
                "max segment size {} is smaller than the descriptor",
                descriptor.max_segment_size
            )));
        }
        Ok(descriptor)
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

/// Builder for [`Descriptor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorBuilder {
    id: u64,
    index: u64,
    max_segment_size: u32,
    max_entries: u32,
    updated: u64,
}

impl DescriptorBuilder {
    /// Set the segment identifier.
    pub fn id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Set the first record index.
    pub fn index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    /// Set the maximum segment size in bytes.
    pub fn max_segment_size(mut self, max_segment_size: u32) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, max_entries: u32) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the `updated` timestamp.
    pub fn updated(mut self, updated: u64) -> Self {
        self.updated = updated;
        self
    }

    /// Finish building.
    pub fn build(self) -> Descriptor {
        Descriptor {
            version: VERSION,
            id: self.id,
            index: self.index,
            max_segment_size: self.max_segment_size,
            max_entries: self.max_entries,
            updated: self.updated,
        }
    }
}
