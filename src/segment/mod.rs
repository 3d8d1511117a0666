// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

pub mod reader;
pub mod writer;

use crate::{
    descriptor::{SegmentDescriptor, DESCRIPTOR_SIZE},
    index::{IndexEntry, SparseIndex},
};
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

/// Builds the file name of a segment: `<name>-<id>.log`.
pub(crate) fn segment_file_name(name: &str, segment_id: u64) -> String {
    format!("{name}-{segment_id}.log")
}

/// Parses the segment id out of a file name produced by [`segment_file_name`].
pub(crate) fn parse_segment_file_name(name: &str, file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

/// One fixed-capacity journal segment holding a contiguous range of indices.
///
/// Shared between the single writer and any number of readers. The writer
/// publishes its progress through `last_index`; readers never look past it,
/// so they cannot observe bytes of a frame that is still being written.
#[derive(Debug)]
pub struct Segment {
    descriptor: SegmentDescriptor,

    path: PathBuf,

    /// Sparse offset cache, fed by the writer and lazily by readers
    index: RwLock<SparseIndex>,

    /// Index of the last committed record (`first_index - 1` when empty)
    last_index: AtomicU64,

    /// Bumped whenever frames are rewritten in place, so readers drop
    /// buffered bytes that no longer reflect the file
    epoch: AtomicU64,

    deleted: AtomicBool,
}

impl Segment {
    /// Creates a new segment file, writing and syncing its descriptor before
    /// any frame can be appended.
    pub(crate) fn create(
        path: &Path,
        descriptor: SegmentDescriptor,
        index_density: u64,
    ) -> crate::Result<Arc<Self>> {
        log::debug!(
            "Creating segment #{} (first index {}) at {}",
            descriptor.segment_id,
            descriptor.first_index,
            path.display(),
        );

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let mut header = Vec::with_capacity(DESCRIPTOR_SIZE);
        descriptor.encode_into(&mut header)?;
        file.write_all(&header)?;

        // Preallocating keeps the tail zero-filled, so the live region is
        // always terminated by a zero length word
        file.set_len(descriptor.max_segment_size)?;
        file.sync_all()?;

        #[cfg(not(target_os = "windows"))]
        {
            // fsync folder on Unix
            if let Some(parent) = path.parent() {
                let folder = File::open(parent)?;
                folder.sync_all()?;
            }
        }

        Ok(Arc::new(Self {
            last_index: AtomicU64::new(descriptor.first_index - 1),
            descriptor,
            path: path.into(),
            index: RwLock::new(SparseIndex::new(index_density)),
            epoch: AtomicU64::new(0),
            deleted: AtomicBool::new(false),
        }))
    }

    /// Opens an existing segment file, validating its descriptor.
    ///
    /// The last index is initialized to "empty"; the caller derives it from
    /// the successor segment or by re-scanning the live region.
    pub(crate) fn open(path: &Path, index_density: u64) -> crate::Result<Arc<Self>> {
        let mut reader = BufReader::new(File::open(path)?);
        let descriptor = SegmentDescriptor::decode_from(&mut reader)?;

        if descriptor.segment_id == 0 || descriptor.first_index == 0 {
            return Err(crate::Error::CorruptJournal(format!(
                "segment at {} has an invalid descriptor",
                path.display(),
            )));
        }

        log::trace!(
            "Opened segment #{} (first index {}) at {}",
            descriptor.segment_id,
            descriptor.first_index,
            path.display(),
        );

        Ok(Arc::new(Self {
            last_index: AtomicU64::new(descriptor.first_index - 1),
            descriptor,
            path: path.into(),
            index: RwLock::new(SparseIndex::new(index_density)),
            epoch: AtomicU64::new(0),
            deleted: AtomicBool::new(false),
        }))
    }

    pub(crate) fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn id(&self) -> u64 {
        self.descriptor.segment_id
    }

    pub(crate) fn first_index(&self) -> u64 {
        self.descriptor.first_index
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.last_index.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.last_index() < self.first_index()
    }

    pub(crate) fn publish_last_index(&self, index: u64) {
        self.last_index.store(index, Ordering::Release);
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Marks the segment dead and removes its file.
    pub(crate) fn delete(&self) -> crate::Result<()> {
        log::debug!("Deleting segment #{} at {}", self.id(), self.path.display());

        self.deleted.store(true, Ordering::Release);
        std::fs::remove_file(&self.path)?;

        Ok(())
    }

    pub(crate) fn lookup(&self, index: u64) -> Option<IndexEntry> {
        self.index.read().expect("lock is poisoned").lookup(index)
    }

    pub(crate) fn observe(&self, index: u64, position: u64) {
        self.index
            .write()
            .expect("lock is poisoned")
            .observe(index, position);
    }

    pub(crate) fn truncate_index_after(&self, index: u64) {
        self.index
            .write()
            .expect("lock is poisoned")
            .truncate_after(index);
    }

    pub(crate) fn clear_index(&self) {
        self.index.write().expect("lock is poisoned").clear();
    }
}
