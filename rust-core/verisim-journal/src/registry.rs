// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Reader registry
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The journal never holds references to its readers. Each reader owns an
// `Arc<ReaderSignal>` that the journal also keeps in a map keyed by reader
// id. Compaction, truncation and writer resets post a rebase notice to
// every signal; readers apply pending notices lazily on their next call.
//
// A notice is a clamp of the reader's next index into `[lo, hi]`:
//   head(h): the journal now starts at `h`, so positions below move up
//   tail(t): the journal now ends before `t`, so positions above move down
// Consecutive notices compose into a single clamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A pending repositioning of a reader's next index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebase {
    lo: u64,
    hi: u64,
}

impl Rebase {
    const IDENTITY: Self = Self { lo: 0, hi: u64::MAX };

    /// Compose with "the journal now starts at `index`".
    fn head(self, index: u64) -> Self {
        Self {
            lo: self.lo.max(index),
            hi: self.hi.max(index),
        }
    }

    /// Compose with "the next index is now at most `index`".
    fn tail(self, index: u64) -> Self {
        Self {
            lo: self.lo.min(index),
            hi: self.hi.min(index),
        }
    }

    /// Where a reader whose next index is `next_index` ends up.
    pub fn apply(self, next_index: u64) -> u64 {
        next_index.max(self.lo).min(self.hi)
    }
}

/// Per-reader mailbox for rebase notices.
#[derive(Debug, Default)]
pub struct ReaderSignal {
    dirty: AtomicBool,
    pending: Mutex<Option<Rebase>>,
}

impl ReaderSignal {
    fn post(&self, compose: impl FnOnce(Rebase) -> Rebase) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = Some(compose(pending.unwrap_or(Rebase::IDENTITY)));
        self.dirty.store(true, Ordering::Release);
    }

    /// `true` if a notice is waiting.
    pub fn is_pending(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Look at the pending notice without consuming it.
    pub fn peek(&self) -> Option<Rebase> {
        if !self.is_pending() {
            return None;
        }
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume the pending notice.
    pub fn take(&self) -> Option<Rebase> {
        if !self.is_pending() {
            return None;
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.dirty.store(false, Ordering::Release);
        pending.take()
    }
}

/// Journal-side table of open readers.
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    next_id: AtomicU64,
    readers: Mutex<HashMap<u64, Arc<ReaderSignal>>>,
}

impl ReaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new reader and return its id and signal.
    pub fn register(&self) -> (u64, Arc<ReaderSignal>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let signal = Arc::new(ReaderSignal::default());
        self.readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&signal));
        (id, signal)
    }

    /// Remove a reader.
    pub fn unregister(&self, id: u64) {
        self.readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of registered readers.
    pub fn len(&self) -> usize {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if no reader is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell every reader the journal now starts at `index`.
    pub fn reset_head(&self, index: u64) {
        self.broadcast(|rebase| rebase.head(index));
    }

    /// Tell every reader the journal's next index is now `index`.
    pub fn reset_tail(&self, index: u64) {
        self.broadcast(|rebase| rebase.tail(index));
    }

    fn broadcast(&self, compose: impl Fn(Rebase) -> Rebase) {
        let readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        for signal in readers.values() {
            signal.post(&compose);
        }
    }
}
