// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::collections::BTreeMap;

/// A known record position inside a segment file
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    /// Record index
    pub index: u64,

    /// Absolute file offset of the record's frame
    pub position: u64,
}

/// Sparse in-memory mapping from record index to file offset.
///
/// Only every `density`-th record is retained. The map is a lossy cache:
/// a miss means the caller scans forward from the segment start (or from
/// the closest smaller entry).
#[derive(Debug)]
pub struct SparseIndex {
    density: u64,
    entries: BTreeMap<u64, u64>,
}

impl SparseIndex {
    pub(crate) fn new(density: u64) -> Self {
        assert!(density > 0, "index density must be positive");

        Self {
            density,
            entries: BTreeMap::new(),
        }
    }

    /// Records the position of `index` if it aligns on the density.
    pub(crate) fn observe(&mut self, index: u64, position: u64) {
        if index % self.density == 0 {
            self.entries.insert(index, position);
        }
    }

    /// Returns the greatest entry with an index less than or equal to `index`.
    pub(crate) fn lookup(&self, index: u64) -> Option<IndexEntry> {
        self.entries
            .range(..=index)
            .next_back()
            .map(|(&index, &position)| IndexEntry { index, position })
    }

    /// Drops all entries with an index greater than `index`.
    pub(crate) fn truncate_after(&mut self, index: u64) {
        let _ = self.entries.split_off(&(index.saturating_add(1)));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
