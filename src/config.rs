// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Journal configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Base name of segment files (`<name>-<id>.log`)
    pub(crate) name: String,

    /// Every k-th record is added to the sparse offset index
    pub(crate) index_density: u64,

    /// Maximum size of a segment file in bytes
    pub(crate) max_segment_size: u64,

    /// Maximum size of a single entry payload in bytes
    pub(crate) max_entry_size: usize,

    /// Maximum number of entries per segment (0 = unbounded)
    pub(crate) max_entries: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "journal".into(),
            index_density: 5,
            max_segment_size: 32 * 1_024 * 1_024,
            max_entry_size: 1_024 * 1_024,
            max_entries: 0,
        }
    }
}

impl Config {
    /// Sets the base name of segment files.
    ///
    /// Default = "journal"
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the sparse index density.
    ///
    /// Every k-th record's file offset is kept in memory to shortcut seeks;
    /// a higher density lowers memory usage but lengthens scans.
    ///
    /// Default = 5
    #[must_use]
    pub fn index_density(mut self, density: u64) -> Self {
        self.index_density = density;
        self
    }

    /// Sets the maximum size of segment files.
    ///
    /// When the active segment cannot fit another entry, the journal rolls
    /// over to a fresh segment.
    ///
    /// Default = 32 MiB
    #[must_use]
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    /// Sets the maximum size of a single entry payload.
    ///
    /// Default = 1 MiB
    #[must_use]
    pub fn max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }

    /// Sets the maximum number of entries per segment.
    ///
    /// Default = unbounded
    #[must_use]
    pub fn max_entries(mut self, count: u64) -> Self {
        self.max_entries = count;
        self
    }
}
