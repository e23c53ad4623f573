// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Journal writer
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The `JournalWriter` is the journal's single append cursor. It encodes
// entries into frames, writes them into the active segment, rolls over to
// a new segment when the active one is full, and moves the commit
// watermark. It is not meant to be shared between threads; callers
// serialize `append`, `commit`, `truncate` and `reset` themselves.

use std::sync::Arc;

use tracing::{debug, info};

use crate::descriptor::DESCRIPTOR_BYTES;
use crate::error::{JournalError, JournalResult};
use crate::journal::JournalShared;
use crate::segment::Segment;
use crate::serdes::EntrySerdes;

/// An entry together with the record index it was stored at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexed<E> {
    /// Record index.
    pub index: u64,
    /// The entry.
    pub entry: E,
    /// Size of the entry's frame on disk.
    pub size: usize,
}

/// Sequential append cursor of a [`SegmentedJournal`](crate::SegmentedJournal).
pub struct JournalWriter<S: EntrySerdes> {
    shared: Arc<JournalShared<S>>,
    active: Arc<Segment>,
    next_index: u64,
    last_entry: Option<Indexed<S::Entry>>,
    frame: Vec<u8>,
}

impl<S: EntrySerdes> JournalWriter<S> {
    pub(crate) fn new(shared: Arc<JournalShared<S>>) -> JournalResult<Self> {
        let active = shared
            .snapshot()
            .last()
            .cloned()
            .ok_or(JournalError::Closed)?;
        let next_index = active.last_index() + 1;
        Ok(Self {
            shared,
            active,
            next_index,
            last_entry: None,
            frame: Vec::new(),
        })
    }

    /// Index the next appended entry will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Index of the last appended entry, or `first_index - 1` when the
    /// journal is empty.
    pub fn last_index(&self) -> u64 {
        self.next_index - 1
    }

    /// Current commit watermark.
    pub fn commit_index(&self) -> u64 {
        self.shared.commit_index()
    }

    /// The last appended entry, read back from disk if this writer has not
    /// appended it itself.
    pub fn last_entry(&mut self) -> JournalResult<Option<&Indexed<S::Entry>>> {
        let last_index = self.last_index();
        if last_index == 0 || last_index < self.shared.first_index() {
            self.last_entry = None;
            return Ok(None);
        }
        if self.last_entry.as_ref().map(|e| e.index) != Some(last_index) {
            let table = self.shared.snapshot();
            let Some(segment) = table.floor(last_index) else {
                return Ok(None);
            };
            let Some(frame) = segment.read_entry(last_index)? else {
                return Ok(None);
            };
            let entry = self.shared.serdes.decode(frame.payload.as_deref())?;
            self.last_entry = Some(Indexed {
                index: last_index,
                entry,
                size: frame.len,
            });
        }
        Ok(self.last_entry.as_ref())
    }

    /// Append `entry` at [`next_index`](Self::next_index), rolling over to a
    /// new segment first when the active one is full.
    pub fn append(&mut self, entry: S::Entry) -> JournalResult<&Indexed<S::Entry>> {
        self.shared.ensure_open()?;

        let payload = self.shared.serdes.encode(&entry)?;
        self.frame.clear();
        self.shared
            .codec()
            .encode_into(payload.as_deref(), &mut self.frame)?;

        let frame_len = self.frame.len();
        let max_segment_size = u64::from(self.shared.config.max_segment_size);
        if !Segment::fits_empty(max_segment_size, frame_len) {
            return Err(JournalError::EntryTooLarge {
                size: frame_len,
                limit: max_segment_size as usize - DESCRIPTOR_BYTES,
            });
        }

        if !self.active.has_room(frame_len) {
            self.active = self.shared.roll_over(&self.active)?;
        }
        self.active.append_raw(&self.frame)?;

        let index = self.next_index;
        self.next_index += 1;
        let indexed = self.last_entry.insert(Indexed {
            index,
            entry,
            size: frame_len,
        });
        Ok(&*indexed)
    }

    /// Advance the commit watermark to `index`. Lower values are ignored;
    /// values past the last index are rejected.
    pub fn commit(&mut self, index: u64) -> JournalResult<()> {
        self.shared.ensure_open()?;
        let last_index = self.last_index();
        if index > last_index {
            return Err(JournalError::CommitBeyondLastIndex { index, last_index });
        }
        if index <= self.shared.commit_index() {
            return Ok(());
        }
        if self.shared.config.flush_on_commit {
            self.active.flush()?;
        }
        self.shared.set_commit_index(index);
        Ok(())
    }

    /// Discard every entry after `index`. Truncating at or past the last
    /// index does nothing; truncating below the commit watermark is
    /// rejected. `truncate(0)` leaves a single empty segment.
    pub fn truncate(&mut self, index: u64) -> JournalResult<()> {
        self.shared.ensure_open()?;
        if index >= self.last_index() {
            return Ok(());
        }
        let commit_index = self.shared.commit_index();
        if index < commit_index {
            return Err(JournalError::TruncateCommitted {
                index,
                commit_index,
            });
        }

        let first_index = self.shared.first_index();
        if index + 1 < first_index {
            self.restart(index + 1)?;
            return Ok(());
        }

        self.shared.registry.reset_tail(index + 1);
        let segment = self
            .shared
            .snapshot()
            .floor(index)
            .cloned()
            .ok_or(JournalError::Closed)?;
        segment.truncate(index)?;
        self.shared.drop_segments_after(segment.first_index())?;

        self.active = segment;
        self.next_index = index + 1;
        if self.last_entry.as_ref().is_some_and(|e| e.index > index) {
            self.last_entry = None;
        }

        debug!(
            journal = %self.shared.config.name,
            last_index = index,
            "Truncated journal"
        );
        Ok(())
    }

    /// Move the append cursor so the next entry lands at `index`.
    ///
    /// Within `[first_index, next_index]` the bytes after the cursor are
    /// left in place until overwritten; segments after the one holding
    /// `index` are removed. Outside that range the journal restarts empty
    /// at `index`, as when installing a snapshot, and the commit watermark
    /// moves up to `index - 1`. Any reset that would discard a committed
    /// entry is rejected.
    pub fn reset(&mut self, index: u64) -> JournalResult<()> {
        self.shared.ensure_open()?;
        let index = index.max(1);
        let first_index = self.shared.first_index();

        let commit_index = self.shared.commit_index();
        if index < first_index || index > self.next_index {
            // Restarting below the watermark would leave it past the new
            // last index.
            if index <= commit_index {
                return Err(JournalError::TruncateCommitted {
                    index: index - 1,
                    commit_index,
                });
            }
            self.restart(index)?;
            self.shared.set_commit_index(index - 1);
            return Ok(());
        }
        if index == self.next_index {
            return Ok(());
        }

        if index <= commit_index {
            return Err(JournalError::TruncateCommitted {
                index: index - 1,
                commit_index,
            });
        }

        self.shared.registry.reset_tail(index);
        let segment = self
            .shared
            .snapshot()
            .floor(index)
            .cloned()
            .ok_or(JournalError::Closed)?;
        segment.reset_to(index)?;
        self.shared.drop_segments_after(segment.first_index())?;

        self.active = segment;
        self.next_index = index;
        if self.last_entry.as_ref().is_some_and(|e| e.index >= index) {
            self.last_entry = None;
        }

        debug!(
            journal = %self.shared.config.name,
            next_index = index,
            "Reset journal writer"
        );
        Ok(())
    }

    fn restart(&mut self, index: u64) -> JournalResult<()> {
        self.shared.registry.reset_head(index);
        self.shared.registry.reset_tail(index);
        self.active = self.shared.restart(index)?;
        self.next_index = index;
        self.last_entry = None;
        info!(
            journal = %self.shared.config.name,
            next_index = index,
            "Journal writer restarted at new index"
        );
        Ok(())
    }

    /// Flush the active segment to stable storage.
    pub fn flush(&self) -> JournalResult<()> {
        self.shared.ensure_open()?;
        self.active.flush()
    }
}

impl<S: EntrySerdes> std::fmt::Debug for JournalWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalWriter")
            .field("next_index", &self.next_index)
            .field("active_segment", &self.active.id())
            .finish()
    }
}
