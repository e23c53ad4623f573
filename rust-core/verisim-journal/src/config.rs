// SPDX-License-Identifier: PMPL-1.0-or-later
//! Journal configuration.
//!
//! Defaults:
//! - name: `journal`, directory: `.`
//! - storage level: disk
//! - max segment size 32 MiB, max entry size 1 MiB
//! - max entries per segment: 1 048 576
//! - sparse index density: 0.005
//! - no flush on commit, current frame format

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{FrameFormat, FRAME_HEADER_BYTES};
use crate::descriptor::DESCRIPTOR_BYTES;
use crate::error::{JournalError, JournalResult};

/// Default maximum segment size in bytes (32 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u32 = 32 * 1024 * 1024;

/// Default maximum payload size in bytes (1 MiB).
pub const DEFAULT_MAX_ENTRY_SIZE: u32 = 1024 * 1024;

/// Default maximum number of entries per segment.
pub const DEFAULT_MAX_ENTRIES_PER_SEGMENT: u32 = 1024 * 1024;

/// Default sparse index density.
pub const DEFAULT_INDEX_DENSITY: f64 = 0.005;

/// Where segment bytes live while a segment is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLevel {
    /// Positional reads and writes on the segment file.
    #[default]
    Disk,
    /// The segment file is memory-mapped.
    Mapped,
}

/// Configuration for a [`SegmentedJournal`](crate::SegmentedJournal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory holding the segment files.
    pub directory: PathBuf,
    /// Journal name, used as the segment file name prefix.
    pub name: String,
    /// Disk or memory-mapped segments.
    pub storage_level: StorageLevel,
    /// Maximum size of one segment file, descriptor included.
    pub max_segment_size: u32,
    /// Maximum size of one entry payload.
    pub max_entry_size: u32,
    /// Maximum number of entries per segment.
    pub max_entries_per_segment: u32,
    /// Fraction of records kept in each segment's sparse index (0.0–1.0].
    pub index_density: f64,
    /// Whether `commit` flushes the active segment.
    pub flush_on_commit: bool,
    /// Frame layout used for every segment.
    pub frame_format: FrameFormat,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            name: "journal".to_string(),
            storage_level: StorageLevel::Disk,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            max_entries_per_segment: DEFAULT_MAX_ENTRIES_PER_SEGMENT,
            index_density: DEFAULT_INDEX_DENSITY,
            flush_on_commit: false,
            frame_format: FrameFormat::Current,
        }
    }
}

impl JournalConfig {
    /// Default configuration for a journal named `name` stored in
    /// `directory`.
    pub fn new(directory: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> JournalResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the storage level.
    pub fn with_storage_level(mut self, storage_level: StorageLevel) -> Self {
        self.storage_level = storage_level;
        self
    }

    /// Set the maximum segment size.
    pub fn with_max_segment_size(mut self, max_segment_size: u32) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Set the maximum entry payload size.
    pub fn with_max_entry_size(mut self, max_entry_size: u32) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    /// Set the maximum number of entries per segment.
    pub fn with_max_entries_per_segment(mut self, max_entries: u32) -> Self {
        self.max_entries_per_segment = max_entries;
        self
    }

    /// Set the sparse index density.
    pub fn with_index_density(mut self, index_density: f64) -> Self {
        self.index_density = index_density;
        self
    }

    /// Set whether commits flush the active segment.
    pub fn with_flush_on_commit(mut self, flush_on_commit: bool) -> Self {
        self.flush_on_commit = flush_on_commit;
        self
    }

    /// Set the frame format.
    pub fn with_frame_format(mut self, frame_format: FrameFormat) -> Self {
        self.frame_format = frame_format;
        self
    }

    /// Check every field is in range.
    pub fn validate(&self) -> JournalResult<()> {
        if self.name.is_empty() {
            return Err(invalid("journal name must not be empty"));
        }
        if self.name.contains(['-', '/', '\\']) {
            return Err(invalid(format!(
                "journal name {:?} must not contain '-', '/' or '\\'",
                self.name
            )));
        }
        if (self.max_segment_size as usize) < DESCRIPTOR_BYTES + FRAME_HEADER_BYTES {
            return Err(invalid(format!(
                "max segment size {} must exceed {} bytes",
                self.max_segment_size,
                DESCRIPTOR_BYTES + FRAME_HEADER_BYTES
            )));
        }
        if self.max_entry_size == 0 {
            return Err(invalid("max entry size must be positive"));
        }
        if self.max_entries_per_segment == 0 {
            return Err(invalid("max entries per segment must be positive"));
        }
        if !(self.index_density > 0.0 && self.index_density <= 1.0) {
            return Err(invalid(format!(
                "index density {} must be in (0, 1]",
                self.index_density
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> JournalError {
    JournalError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JournalConfig::default();
        assert_eq!(config.name, "journal");
        assert_eq!(config.storage_level, StorageLevel::Disk);
        assert_eq!(config.max_segment_size, 32 * 1024 * 1024);
        assert_eq!(config.max_entry_size, 1024 * 1024);
        assert_eq!(config.max_entries_per_segment, 1024 * 1024);
        assert!((config.index_density - 0.005).abs() < f64::EPSILON);
        assert!(!config.flush_on_commit);
        assert_eq!(config.frame_format, FrameFormat::Current);
        config.validate().unwrap();
    }

    #[test]
    fn test_name_validation() {
        for bad in ["", "a-b", "a/b", "a\\b"] {
            let config = JournalConfig::new(".", bad);
            assert!(matches!(config.validate(), Err(JournalError::InvalidConfig(_))), "{bad}");
        }
        JournalConfig::new(".", "raft_partition_1").validate().unwrap();
    }

    #[test]
    fn test_range_validation() {
        let base = JournalConfig::new(".", "j");
        assert!(base.clone().with_max_segment_size(64).validate().is_err());
        assert!(base.clone().with_max_entry_size(0).validate().is_err());
        assert!(base.clone().with_max_entries_per_segment(0).validate().is_err());
        assert!(base.clone().with_index_density(0.0).validate().is_err());
        assert!(base.clone().with_index_density(1.5).validate().is_err());
        assert!(base.with_index_density(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = JournalConfig::from_json(
            r#"{"name": "raft", "storage_level": "mapped", "frame_format": "legacy"}"#,
        )
        .unwrap();
        assert_eq!(config.name, "raft");
        assert_eq!(config.storage_level, StorageLevel::Mapped);
        assert_eq!(config.frame_format, FrameFormat::Legacy);
        assert_eq!(config.max_segment_size, DEFAULT_MAX_SEGMENT_SIZE);

        assert!(JournalConfig::from_json(r#"{"name": "a-b"}"#).is_err());
        assert!(matches!(
            JournalConfig::from_json("{not json"),
            Err(JournalError::Json(_))
        ));
    }
}
