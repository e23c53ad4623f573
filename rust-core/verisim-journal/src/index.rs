// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Sparse index
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory map from a strided subset of record indices to the byte offset
// of their frame within one segment. Rebuilt by scanning whenever a
// segment is opened; never persisted.

/// A known (record index, frame offset) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Record index.
    pub index: u64,
    /// Byte offset of the record's frame within the segment.
    pub offset: u64,
}

/// Strided record index to offset map for one segment.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    stride: u64,
    positions: Vec<Position>,
}

impl SparseIndex {
    /// Create an index that keeps roughly `density` of the records offered
    /// to it. `density` is clamped to `(0, 1]`.
    pub fn new(density: f64) -> Self {
        let density = if density.is_finite() && density > 0.0 {
            density.min(1.0)
        } else {
            1.0
        };
        let stride = (1.0 / density).ceil().max(1.0) as u64;
        Self {
            stride,
            positions: Vec::new(),
        }
    }

    /// Every how many record indices one position is kept.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Number of positions held.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// `true` if no positions are held.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Offer a scanned or appended record. Kept only when it falls on the
    /// stride and lies beyond every position already held.
    pub fn record(&mut self, index: u64, offset: u64) {
        if index % self.stride != 0 {
            return;
        }
        if let Some(last) = self.positions.last() {
            if index <= last.index || offset <= last.offset {
                return;
            }
        }
        self.positions.push(Position { index, offset });
    }

    /// Nearest known position at or below `index`.
    pub fn lookup(&self, index: u64) -> Option<Position> {
        let upper = self.positions.partition_point(|p| p.index <= index);
        upper.checked_sub(1).map(|i| self.positions[i])
    }

    /// Forget every position above `index`.
    pub fn truncate(&mut self, index: u64) {
        let keep = self.positions.partition_point(|p| p.index <= index);
        self.positions.truncate(keep);
    }

    /// Forget every position.
    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_sets_stride() {
        assert_eq!(SparseIndex::new(0.2).stride(), 5);
        assert_eq!(SparseIndex::new(0.005).stride(), 200);
        assert_eq!(SparseIndex::new(1.0).stride(), 1);
        assert_eq!(SparseIndex::new(0.0).stride(), 1);
        assert_eq!(SparseIndex::new(f64::NAN).stride(), 1);
    }

    #[test]
    fn test_record_keeps_strided_positions() {
        let mut index = SparseIndex::new(0.2);
        for i in 1..=20u64 {
            index.record(i, 64 + i * 10);
        }
        assert_eq!(index.len(), 4);
        assert_eq!(
            index.lookup(12),
            Some(Position {
                index: 10,
                offset: 164
            })
        );
        assert_eq!(index.lookup(4), None);
        assert_eq!(index.lookup(20).unwrap().index, 20);
    }

    #[test]
    fn test_record_ignores_non_monotonic() {
        let mut index = SparseIndex::new(1.0);
        index.record(5, 500);
        index.record(5, 600);
        index.record(4, 700);
        index.record(6, 400);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_truncate() {
        let mut index = SparseIndex::new(0.5);
        for i in 1..=10u64 {
            index.record(i, i * 100);
        }
        index.truncate(5);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(10).unwrap().index, 4);

        index.record(6, 600);
        assert_eq!(index.lookup(10).unwrap().index, 6);

        index.clear();
        assert!(index.is_empty());
    }
}
