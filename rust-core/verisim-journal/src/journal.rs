// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Segmented journal
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `SegmentedJournal` owns an ordered table of segments covering one
// gapless range of record indices. The table is an immutable snapshot
// behind `RwLock<Arc<_>>`: rollover, truncation and compaction build a new
// table and swap it in, readers clone the `Arc` and never block each other.
//
// Lifecycle:
// 1. `open` discovers `{name}-{id}[-{generation}].log` files, loads them,
//    drops duplicates and anything that does not line up, and creates the
//    first segment if none survive.
// 2. `writer()` hands out the single writer; `open_reader` any number of
//    independent readers.
// 3. `compact(index)` deletes every segment before the one holding `index`
//    and tells readers that the journal now starts later.
// 4. `close()` (or drop) closes every segment. Closing twice is harmless.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::codec::FrameCodec;
use crate::config::JournalConfig;
use crate::descriptor::{Descriptor, DESCRIPTOR_BYTES};
use crate::error::{JournalError, JournalResult};
use crate::file::{list_segment_files, next_segment_path, SegmentFile};
use crate::reader::{JournalReader, ReaderMode};
use crate::registry::ReaderRegistry;
use crate::segment::{Segment, SegmentOptions};
use crate::serdes::EntrySerdes;
use crate::writer::JournalWriter;

// ---------------------------------------------------------------------------
// SegmentTable
// ---------------------------------------------------------------------------

/// Snapshot of the journal's segments, keyed by first record index.
#[derive(Debug, Clone, Default)]
pub(crate) struct SegmentTable {
    segments: BTreeMap<u64, Arc<Segment>>,
}

impl SegmentTable {
    pub(crate) fn first(&self) -> Option<&Arc<Segment>> {
        self.segments.values().next()
    }

    pub(crate) fn last(&self) -> Option<&Arc<Segment>> {
        self.segments.values().next_back()
    }

    /// The segment whose range would contain `index`.
    pub(crate) fn floor(&self, index: u64) -> Option<&Arc<Segment>> {
        self.segments
            .range(..=index)
            .next_back()
            .map(|(_, segment)| segment)
            .or_else(|| self.first())
    }

    /// The segment that starts right after the one starting at `first_index`.
    pub(crate) fn next_after(&self, first_index: u64) -> Option<&Arc<Segment>> {
        self.segments
            .range(first_index + 1..)
            .next()
            .map(|(_, segment)| segment)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Segment>> {
        self.segments.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    fn insert(&mut self, segment: Arc<Segment>) {
        self.segments.insert(segment.first_index(), segment);
    }

    /// Remove every segment starting before `index`.
    fn split_off_before(&mut self, index: u64) -> Vec<Arc<Segment>> {
        let kept = self.segments.split_off(&index);
        let removed = std::mem::replace(&mut self.segments, kept);
        removed.into_values().collect()
    }

    /// Remove every segment starting after `index`.
    fn split_off_after(&mut self, index: u64) -> Vec<Arc<Segment>> {
        self.segments
            .split_off(&index.saturating_add(1))
            .into_values()
            .collect()
    }

    fn clear(&mut self) -> Vec<Arc<Segment>> {
        std::mem::take(&mut self.segments).into_values().collect()
    }
}

// ---------------------------------------------------------------------------
// JournalShared
// ---------------------------------------------------------------------------

/// State shared by the journal, its writer and its readers.
pub(crate) struct JournalShared<S> {
    pub(crate) config: JournalConfig,
    pub(crate) options: SegmentOptions,
    pub(crate) serdes: S,
    table: RwLock<Arc<SegmentTable>>,
    commit_index: AtomicU64,
    pub(crate) registry: ReaderRegistry,
    closed: AtomicBool,
}

impl<S> JournalShared<S> {
    pub(crate) fn codec(&self) -> &FrameCodec {
        &self.options.codec
    }

    pub(crate) fn snapshot(&self) -> Arc<SegmentTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Build a new table from the current one and swap it in.
    pub(crate) fn update_table<R>(
        &self,
        update: impl FnOnce(&mut SegmentTable) -> JournalResult<R>,
    ) -> JournalResult<R> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = SegmentTable::clone(&table);
        let result = update(&mut next)?;
        *table = Arc::new(next);
        Ok(result)
    }

    pub(crate) fn ensure_open(&self) -> JournalResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JournalError::Closed);
        }
        Ok(())
    }

    pub(crate) fn first_index(&self) -> u64 {
        self.snapshot().first().map_or(1, |segment| segment.first_index())
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.snapshot().last().map_or(0, |segment| segment.last_index())
    }

    pub(crate) fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::Acquire)
    }

    pub(crate) fn set_commit_index(&self, index: u64) {
        self.commit_index.fetch_max(index, Ordering::AcqRel);
    }

    /// Create and open a new segment file starting at `index`.
    pub(crate) fn create_segment(&self, id: u64, index: u64) -> JournalResult<Arc<Segment>> {
        let (path, generation) = next_segment_path(&self.config.directory, &self.config.name, id);
        if generation > 0 {
            warn!(
                journal = %self.config.name,
                id,
                generation,
                "Segment file name already taken, using a new generation"
            );
        }
        let descriptor = Descriptor::builder()
            .id(id)
            .index(index)
            .max_segment_size(self.config.max_segment_size)
            .max_entries(self.config.max_entries_per_segment)
            .updated(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0))
            .build();
        Ok(Arc::new(Segment::create(&path, descriptor, self.options)?))
    }

    /// Close `active` for writing and append a fresh segment after it.
    pub(crate) fn roll_over(&self, active: &Segment) -> JournalResult<Arc<Segment>> {
        active.flush()?;
        let segment = self.create_segment(active.id() + 1, active.last_index() + 1)?;
        self.update_table(|table| {
            table.insert(Arc::clone(&segment));
            Ok(())
        })?;

        info!(
            journal = %self.config.name,
            id = segment.id(),
            first_index = segment.first_index(),
            "Rolled over to new journal segment"
        );
        Ok(segment)
    }

    /// Delete every segment and start over with one empty segment at
    /// `index`.
    pub(crate) fn restart(&self, index: u64) -> JournalResult<Arc<Segment>> {
        let next_id = self.snapshot().last().map_or(1, |segment| segment.id() + 1);
        let segment = self.create_segment(next_id, index)?;
        let removed = self.update_table(|table| {
            let removed = table.clear();
            table.insert(Arc::clone(&segment));
            Ok(removed)
        })?;
        delete_segments(&removed)?;

        info!(
            journal = %self.config.name,
            first_index = index,
            removed = removed.len(),
            "Restarted journal"
        );
        Ok(segment)
    }

    /// Delete every segment starting after `index`.
    pub(crate) fn drop_segments_after(&self, index: u64) -> JournalResult<()> {
        let removed = self.update_table(|table| Ok(table.split_off_after(index)))?;
        delete_segments(&removed)
    }

    fn close_all(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for segment in self.snapshot().iter() {
            segment.close();
        }
        info!(journal = %self.config.name, "Closed journal");
    }
}

fn delete_segments(segments: &[Arc<Segment>]) -> JournalResult<()> {
    for segment in segments {
        segment.delete()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SegmentedJournal
// ---------------------------------------------------------------------------

/// A segmented, append-only journal of typed entries.
pub struct SegmentedJournal<S: EntrySerdes> {
    shared: Arc<JournalShared<S>>,
    writer: Option<JournalWriter<S>>,
}

impl<S: EntrySerdes> SegmentedJournal<S> {
    /// Open (or create) the journal described by `config`.
    pub fn open(config: JournalConfig, serdes: S) -> JournalResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory)?;

        let options = SegmentOptions {
            storage_level: config.storage_level,
            codec: FrameCodec::new(config.frame_format, config.max_entry_size),
            index_density: config.index_density,
        };
        let shared = Arc::new(JournalShared {
            config,
            options,
            serdes,
            table: RwLock::new(Arc::new(SegmentTable::default())),
            commit_index: AtomicU64::new(0),
            registry: ReaderRegistry::new(),
            closed: AtomicBool::new(false),
        });

        let mut table = load_segments(&shared.config, options)?;
        if table.len() == 0 {
            table.insert(shared.create_segment(1, 1)?);
        }
        let first_index = table.first().map_or(1, |segment| segment.first_index());
        let last_index = table.last().map_or(0, |segment| segment.last_index());
        *shared.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
        shared.commit_index.store(first_index - 1, Ordering::Release);

        info!(
            journal = %shared.config.name,
            dir = %shared.config.directory.display(),
            first_index,
            last_index,
            "Opened journal"
        );

        Ok(Self {
            shared,
            writer: None,
        })
    }

    /// Journal name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Directory holding the segment files.
    pub fn directory(&self) -> &Path {
        &self.shared.config.directory
    }

    /// Configuration the journal was opened with.
    pub fn config(&self) -> &JournalConfig {
        &self.shared.config
    }

    /// The journal's single writer, created on first use.
    pub fn writer(&mut self) -> JournalResult<&mut JournalWriter<S>> {
        self.shared.ensure_open()?;
        if self.writer.is_none() {
            self.writer = Some(JournalWriter::new(Arc::clone(&self.shared))?);
        }
        self.writer.as_mut().ok_or(JournalError::Closed)
    }

    /// Open a reader whose first `try_next` returns the entry at `index`.
    ///
    /// An index below the first index starts at the first index; one past
    /// the next append index is rejected.
    pub fn open_reader(&self, index: u64, mode: ReaderMode) -> JournalResult<JournalReader<S>> {
        self.shared.ensure_open()?;
        JournalReader::open(Arc::clone(&self.shared), index, mode)
    }

    /// Shorthand for a [`ReaderMode::Commits`] reader.
    pub fn open_commits_reader(&self, index: u64) -> JournalResult<JournalReader<S>> {
        self.open_reader(index, ReaderMode::Commits)
    }

    /// First record index still stored.
    pub fn first_index(&self) -> u64 {
        self.shared.first_index()
    }

    /// Last record index written, or `first_index - 1` when empty.
    pub fn last_index(&self) -> u64 {
        self.shared.last_index()
    }

    /// Current commit watermark.
    pub fn commit_index(&self) -> u64 {
        self.shared.commit_index()
    }

    /// `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.last_index() < self.first_index()
    }

    /// Bytes used by all segments.
    pub fn size(&self) -> u64 {
        self.shared.snapshot().iter().map(|segment| segment.size()).sum()
    }

    /// Snapshot of the current segments, in index order.
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.shared.snapshot().iter().cloned().collect()
    }

    /// Number of open readers.
    pub fn reader_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// The index compaction to `index` would move the journal's start to:
    /// the first index of the segment holding `index`, or 0 when there are
    /// no segments.
    pub fn compactable_index(&self, index: u64) -> u64 {
        self.shared
            .snapshot()
            .floor(index)
            .map_or(0, |segment| segment.first_index())
    }

    /// `true` if `compact(index)` would delete at least one segment.
    pub fn is_compactable(&self, index: u64) -> bool {
        let first = self.compactable_index(index);
        first != 0 && first > self.first_index()
    }

    /// Delete every segment before the one holding `index`. Entries at or
    /// after `index` are never touched, and the active segment is always
    /// kept. Readers positioned in deleted territory jump forward to the
    /// new first index on their next call.
    pub fn compact(&self, index: u64) -> JournalResult<()> {
        self.shared.ensure_open()?;
        if !self.is_compactable(index) {
            return Ok(());
        }
        let first_index = self.compactable_index(index);

        self.shared.registry.reset_head(first_index);
        let removed = self
            .shared
            .update_table(|table| Ok(table.split_off_before(first_index)))?;
        delete_segments(&removed)?;

        debug!(
            journal = %self.shared.config.name,
            segments = removed.len(),
            first_index,
            "Compacted journal"
        );
        Ok(())
    }

    /// `true` until the journal is closed.
    pub fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    /// Close every segment. The writer and readers fail with
    /// [`JournalError::Closed`] afterwards. Calling this again does nothing.
    pub fn close(&mut self) {
        self.writer = None;
        self.shared.close_all();
    }
}

impl<S: EntrySerdes> Drop for SegmentedJournal<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: EntrySerdes> std::fmt::Debug for SegmentedJournal<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentedJournal")
            .field("name", &self.name())
            .field("first_index", &self.first_index())
            .field("last_index", &self.last_index())
            .field("commit_index", &self.commit_index())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load every segment file of the journal and keep the longest run that
/// lines up from the lowest first index.
fn load_segments(config: &JournalConfig, options: SegmentOptions) -> JournalResult<SegmentTable> {
    let mut by_first_index: BTreeMap<u64, Arc<Segment>> = BTreeMap::new();

    // Files arrive ordered by (id, generation), so a later file claiming the
    // same first index replaces the earlier one.
    for file in list_segment_files(&config.directory, &config.name)? {
        if is_blank(&file)? {
            warn!(path = %file.path.display(), "Removing uninitialized segment file");
            fs::remove_file(&file.path)?;
            continue;
        }
        let segment = Arc::new(Segment::load(&file.path, options)?);
        if let Some(replaced) = by_first_index.insert(segment.first_index(), Arc::clone(&segment)) {
            warn!(
                kept = %segment.path().display(),
                removed = %replaced.path().display(),
                first_index = segment.first_index(),
                "Removing superseded segment with duplicate first index"
            );
            replaced.delete()?;
        }
    }

    let mut table = SegmentTable::default();
    let mut expected_first: Option<u64> = None;
    let mut misaligned = Vec::new();
    for segment in by_first_index.into_values() {
        match expected_first {
            Some(expected) if !misaligned.is_empty() || segment.first_index() != expected => {
                // A segment only rolls over once it is complete, so a torn
                // frame followed by later records is damage, not a crash.
                if let Some((offset, detail)) = table.last().and_then(|last| last.torn_tail()) {
                    if misaligned.is_empty() && segment.first_index() > expected {
                        return Err(JournalError::Corrupted { offset, detail });
                    }
                }
                misaligned.push(segment);
            }
            _ => {
                expected_first = Some(segment.last_index() + 1);
                table.insert(segment);
            }
        }
    }

    for segment in &misaligned {
        warn!(
            path = %segment.path().display(),
            first_index = segment.first_index(),
            "Removing segment that does not line up with its predecessor"
        );
        segment.delete()?;
    }

    debug!(
        journal = %config.name,
        segments = table.len(),
        removed = misaligned.len(),
        "Loaded journal segments"
    );
    Ok(table)
}

/// `true` for a file whose descriptor region was never written.
fn is_blank(file: &SegmentFile) -> io::Result<bool> {
    let mut header = [0u8; DESCRIPTOR_BYTES];
    let mut handle = File::open(&file.path)?;
    let mut read = 0;
    while read < header.len() {
        match handle.read(&mut header[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(header[..read].iter().all(|&b| b == 0))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::serdes::BytesSerdes;

    fn config(dir: &TempDir) -> JournalConfig {
        JournalConfig::new(dir.path(), "test")
            .with_max_segment_size(1024)
            .with_max_entries_per_segment(8)
            .with_index_density(0.25)
    }

    fn fill(journal: &mut SegmentedJournal<BytesSerdes>, count: u64) {
        let writer = journal.writer().unwrap();
        for i in 0..count {
            writer.append(format!("entry-{i}").into_bytes()).unwrap();
        }
    }

    #[test]
    fn test_open_fresh_creates_first_segment() {
        let dir = TempDir::new().unwrap();
        let journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert_eq!(journal.first_index(), 1);
        assert_eq!(journal.last_index(), 0);
        assert_eq!(journal.commit_index(), 0);
        assert!(journal.is_empty());
        assert_eq!(journal.segments().len(), 1);
        assert!(dir.path().join("test-1.log").exists());
    }

    #[test]
    fn test_rollover_by_entry_count() {
        let dir = TempDir::new().unwrap();
        let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        fill(&mut journal, 20);
        let firsts: Vec<_> = journal.segments().iter().map(|s| s.first_index()).collect();
        assert_eq!(firsts, vec![1, 9, 17]);
        let ids: Vec<_> = journal.segments().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(journal.last_index(), 20);
    }

    #[test]
    fn test_compactable_index() {
        let dir = TempDir::new().unwrap();
        let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        fill(&mut journal, 20);
        assert_eq!(journal.compactable_index(5), 1);
        assert_eq!(journal.compactable_index(12), 9);
        assert_eq!(journal.compactable_index(100), 17);
        assert!(!journal.is_compactable(8));
        assert!(journal.is_compactable(9));
    }

    #[test]
    fn test_compact_keeps_segment_holding_index() {
        let dir = TempDir::new().unwrap();
        let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        fill(&mut journal, 20);
        journal.compact(12).unwrap();
        assert_eq!(journal.first_index(), 9);
        assert!(!dir.path().join("test-1.log").exists());

        // Compacting past the end keeps the active segment.
        journal.compact(1000).unwrap();
        assert_eq!(journal.first_index(), 17);
        assert_eq!(journal.segments().len(), 1);
        assert_eq!(journal.last_index(), 20);
    }

    #[test]
    fn test_reopen_recovers_segments() {
        let dir = TempDir::new().unwrap();
        {
            let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
            fill(&mut journal, 20);
        }
        let journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert_eq!(journal.first_index(), 1);
        assert_eq!(journal.last_index(), 20);
        assert_eq!(journal.segments().len(), 3);
    }

    #[test]
    fn test_reopen_removes_misaligned_segments() {
        let dir = TempDir::new().unwrap();
        {
            let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
            fill(&mut journal, 20);
        }
        // Losing the middle segment leaves the third one dangling.
        fs::remove_file(dir.path().join("test-2.log")).unwrap();

        let journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert_eq!(journal.last_index(), 8);
        assert_eq!(journal.segments().len(), 1);
        assert!(!dir.path().join("test-3.log").exists());
    }

    #[test]
    fn test_reopen_prefers_newer_duplicate() {
        let dir = TempDir::new().unwrap();
        let options = SegmentOptions {
            storage_level: crate::config::StorageLevel::Disk,
            codec: FrameCodec::new(crate::codec::FrameFormat::Current, 1024),
            index_density: 1.0,
        };
        let descriptor = |id| {
            Descriptor::builder()
                .id(id)
                .index(1)
                .max_segment_size(1024)
                .max_entries(8)
                .build()
        };
        let codec = options.codec;
        let old = Segment::create(&dir.path().join("test-1.log"), descriptor(1), options).unwrap();
        old.append_raw(&codec.encode(Some(b"old")).unwrap()).unwrap();
        old.close();
        let new = Segment::create(&dir.path().join("test-1-1.log"), descriptor(1), options).unwrap();
        new.append_raw(&codec.encode(Some(b"new")).unwrap()).unwrap();
        new.close();

        let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert_eq!(journal.segments().len(), 1);
        assert!(!dir.path().join("test-1.log").exists());
        assert_eq!(
            journal.writer().unwrap().last_entry().unwrap().map(|e| e.entry.clone()),
            Some(b"new".to_vec())
        );
    }

    #[test]
    fn test_blank_segment_file_is_removed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("test-1.log"), [0u8; 100]).unwrap();
        let journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert_eq!(journal.segments().len(), 1);
        assert_eq!(journal.first_index(), 1);
    }

    #[test]
    fn test_corrupt_descriptor_fails_open() {
        let dir = TempDir::new().unwrap();
        let mut bytes = vec![0u8; 1024];
        bytes[3] = 9;
        fs::write(dir.path().join("test-1.log"), bytes).unwrap();
        let err = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_other_journals_are_ignored() {
        let dir = TempDir::new().unwrap();
        {
            let mut other =
                SegmentedJournal::open(JournalConfig::new(dir.path(), "other"), BytesSerdes).unwrap();
            fill(&mut other, 3);
        }
        let journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        assert!(journal.is_empty());
        assert!(dir.path().join("other-1.log").exists());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut journal = SegmentedJournal::open(config(&dir), BytesSerdes).unwrap();
        fill(&mut journal, 3);
        journal.close();
        journal.close();
        assert!(!journal.is_open());
        assert!(matches!(journal.writer(), Err(JournalError::Closed)));
        assert!(matches!(journal.compact(2), Err(JournalError::Closed)));
    }
}
