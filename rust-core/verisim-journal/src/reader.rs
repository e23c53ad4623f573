// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Journal reader
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `JournalReader` is an independent cursor over the journal. It never
// blocks: `try_next` returns `None` when nothing new is visible and the
// caller polls again later.
//
// Readers hold no segment file handles of their own. They keep an
// `Arc<Segment>` and an offset, and re-resolve through the journal's
// segment table whenever the segment was closed underneath them or a
// rebase notice (compaction, truncation, writer reset) is pending.

use std::sync::Arc;

use tracing::debug;

use crate::codec::{Decoded, FrameBuffer};
use crate::descriptor::DESCRIPTOR_BYTES;
use crate::error::{JournalError, JournalResult};
use crate::journal::JournalShared;
use crate::registry::ReaderSignal;
use crate::segment::Segment;
use crate::serdes::EntrySerdes;
use crate::writer::Indexed;

/// Which entries a reader may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// Every written entry.
    All,
    /// Only entries at or below the commit watermark.
    Commits,
}

/// Independent read cursor of a [`SegmentedJournal`](crate::SegmentedJournal).
pub struct JournalReader<S: EntrySerdes> {
    shared: Arc<JournalShared<S>>,
    id: u64,
    signal: Arc<ReaderSignal>,
    mode: ReaderMode,
    from_index: u64,
    segment: Option<Arc<Segment>>,
    offset: u64,
    buffer: FrameBuffer,
    next_index: u64,
    current: Option<Indexed<S::Entry>>,
}

impl<S: EntrySerdes> JournalReader<S> {
    pub(crate) fn open(shared: Arc<JournalShared<S>>, index: u64, mode: ReaderMode) -> JournalResult<Self> {
        let (id, signal) = shared.registry.register();
        let mut reader = Self {
            shared,
            id,
            signal,
            mode,
            from_index: index,
            segment: None,
            offset: DESCRIPTOR_BYTES as u64,
            buffer: FrameBuffer::default(),
            next_index: index,
            current: None,
        };
        reader.reset_to(index)?;
        Ok(reader)
    }

    /// Visibility mode.
    pub fn mode(&self) -> ReaderMode {
        self.mode
    }

    /// The journal's current first index.
    pub fn first_index(&self) -> u64 {
        self.shared.first_index()
    }

    /// Index of the entry the next successful `try_next` returns.
    pub fn next_index(&self) -> u64 {
        self.signal
            .peek()
            .map_or(self.next_index, |rebase| rebase.apply(self.next_index))
    }

    /// The entry last returned by `try_next`, unless the reader has been
    /// repositioned since.
    pub fn current_entry(&self) -> Option<&Indexed<S::Entry>> {
        if self.next_index() != self.next_index {
            return None;
        }
        self.current.as_ref()
    }

    /// Return the entry at [`next_index`](Self::next_index) and advance, or
    /// `None` if it has not been written (or committed, in
    /// [`ReaderMode::Commits`]) yet.
    pub fn try_next(&mut self) -> JournalResult<Option<&Indexed<S::Entry>>> {
        self.shared.ensure_open()?;
        loop {
            self.apply_notices();

            if self.mode == ReaderMode::Commits && self.next_index > self.shared.commit_index() {
                return Ok(None);
            }

            let Some(segment) = self.segment.clone() else {
                if !self.seek(self.next_index)? && !self.signal.is_pending() {
                    return Ok(None);
                }
                continue;
            };

            match segment.read_at(self.offset, &mut self.buffer) {
                Ok(Decoded::Complete(frame)) => {
                    // A notice posted while reading may have invalidated it.
                    if self.signal.is_pending() {
                        continue;
                    }
                    let index = self.next_index;
                    let entry = self.shared.serdes.decode(frame.payload.as_deref())?;
                    self.offset += frame.len as u64;
                    self.next_index += 1;
                    let indexed = self.current.insert(Indexed {
                        index,
                        entry,
                        size: frame.len,
                    });
                    return Ok(Some(&*indexed));
                }
                Ok(Decoded::Incomplete | Decoded::EndOfData) => {
                    let table = self.shared.snapshot();
                    match table.next_after(segment.first_index()) {
                        Some(next) if next.first_index() == self.next_index => {
                            self.segment = Some(Arc::clone(next));
                            self.offset = DESCRIPTOR_BYTES as u64;
                            self.buffer.reset(self.offset);
                        }
                        _ => return Ok(None),
                    }
                }
                Err(JournalError::SegmentClosed(_)) => {
                    self.shared.ensure_open()?;
                    self.segment = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Return to the index the reader was opened at, or the journal's first
    /// index if that has been compacted away.
    pub fn reset(&mut self) -> JournalResult<()> {
        let first_index = self.shared.first_index();
        self.reset_to(self.from_index.max(first_index))
    }

    /// Reposition so the next `try_next` returns the entry at `index`.
    /// Indices below the first index start at the first index; indices past
    /// the next append index are rejected.
    pub fn reset_to(&mut self, index: u64) -> JournalResult<()> {
        self.shared.ensure_open()?;
        self.signal.take();

        let first = self.shared.first_index();
        let next = self.shared.last_index() + 1;
        if index > next {
            return Err(JournalError::IndexOutOfRange {
                index,
                first,
                last: next,
            });
        }
        let target = index.max(first);
        if !self.seek(target)? {
            return Err(JournalError::IndexOutOfRange {
                index,
                first,
                last: next,
            });
        }
        self.current = None;
        Ok(())
    }

    fn apply_notices(&mut self) {
        if let Some(rebase) = self.signal.take() {
            let target = rebase.apply(self.next_index);
            if target != self.next_index {
                debug!(
                    reader = self.id,
                    from = self.next_index,
                    to = target,
                    "Journal reader rebased"
                );
                self.current = None;
                self.next_index = target;
            }
            self.segment = None;
        }
    }

    /// Position the cursor at `index`. Returns `false` if the journal no
    /// longer (or not yet) has a position for it.
    fn seek(&mut self, index: u64) -> JournalResult<bool> {
        let table = self.shared.snapshot();
        let Some(segment) = table.floor(index).cloned() else {
            return Ok(false);
        };
        let offset = match segment.locate(index) {
            Ok(Some(offset)) => offset,
            Ok(None) | Err(JournalError::SegmentClosed(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if index != self.next_index {
            self.current = None;
        }
        self.segment = Some(segment);
        self.offset = offset;
        self.buffer.reset(offset);
        self.next_index = index;
        Ok(true)
    }
}

impl<S: EntrySerdes> Drop for JournalReader<S> {
    fn drop(&mut self) {
        self.shared.registry.unregister(self.id);
    }
}

impl<S: EntrySerdes> std::fmt::Debug for JournalReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("next_index", &self.next_index())
            .finish()
    }
}
