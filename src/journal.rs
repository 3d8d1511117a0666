// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    config::Config,
    descriptor::{SegmentDescriptor, DESCRIPTOR_SIZE},
    frame,
    path::absolute_path,
    reader::JournalReader,
    record::{Record, ASQN_UNSPECIFIED},
    segment::{
        parse_segment_file_name, reader::Reader as SegmentReader, segment_file_name,
        writer::Writer, Segment,
    },
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

/// A disk-resident segmented journal
#[derive(Clone)]
pub struct Journal(Arc<JournalInner>);

impl std::ops::Deref for Journal {
    type Target = JournalInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Journal state shared between handles and readers
pub struct JournalInner {
    /// Base folder
    pub path: PathBuf,

    /// Journal configuration
    config: Config,

    /// Segment chain and the active segment's writer.
    ///
    /// One exclusive lock serializes append, truncation, reset and
    /// rollover; readers take it shared only while resolving a segment and
    /// then proceed against that segment on their own file handle.
    state: RwLock<State>,

    is_open: AtomicBool,
}

struct State {
    /// All segments, keyed by their first index; the last one is active
    segments: BTreeMap<u64, Arc<Segment>>,

    /// Writer of the active segment
    writer: Writer,

    /// Highest specified application sequence number so far
    last_asqn: u64,
}

impl JournalInner {
    pub(crate) fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> crate::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(crate::Error::Closed)
        }
    }

    pub(crate) fn first_index(&self) -> u64 {
        let state = self.state.read().expect("lock is poisoned");
        state
            .segments
            .keys()
            .next()
            .copied()
            .expect("journal has at least one segment")
    }

    pub(crate) fn last_index(&self) -> u64 {
        let state = self.state.read().expect("lock is poisoned");
        state.writer.last_index()
    }

    pub(crate) fn max_entry_size(&self) -> usize {
        self.config.max_entry_size
    }

    /// Resolves the segment containing `index`.
    pub(crate) fn segment_for(&self, index: u64) -> Option<Arc<Segment>> {
        let state = self.state.read().expect("lock is poisoned");

        state
            .segments
            .range(..=index)
            .next_back()
            .map(|(_, segment)| Arc::clone(segment))
            .filter(|segment| !segment.is_deleted() && index <= segment.last_index())
    }
}

impl Journal {
    /// Creates or recovers a journal in the given directory.
    ///
    /// Recovery validates the segment chain and discards any torn tail left
    /// behind by a crash; everything appended before the last [`flush`] is
    /// guaranteed to survive.
    ///
    /// [`flush`]: Journal::flush
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs or the segment chain is
    /// corrupted.
    ///
    /// # Panics
    ///
    /// Panics if the configuration cannot fit a single maximum-size entry
    /// into a segment.
    pub fn open<P: Into<PathBuf>>(path: P, config: Config) -> crate::Result<Self> {
        assert!(
            config.max_segment_size
                >= DESCRIPTOR_SIZE as u64 + frame::frame_length(config.max_entry_size),
            "segment size must fit at least one maximum-size entry",
        );
        assert!(config.index_density > 0, "index density must be positive");

        let path = absolute_path(path.into());
        std::fs::create_dir_all(&path)?;

        let mut segment_files = Vec::new();

        for dirent in std::fs::read_dir(&path)? {
            let dirent = dirent?;
            let file_name = dirent.file_name();
            let file_name = file_name.to_string_lossy();

            if let Some(id) = parse_segment_file_name(&config.name, &file_name) {
                segment_files.push((id, dirent.path()));
            } else if !file_name.starts_with('.') {
                log::warn!("Ignoring unrecognized file {file_name:?} in journal folder");
            }
        }

        segment_files.sort_by_key(|(id, _)| *id);

        if segment_files.is_empty() {
            Self::create_new(path, config)
        } else {
            Self::recover(path, config, &segment_files)
        }
    }

    /// Creates a new empty journal in a directory.
    fn create_new(path: PathBuf, config: Config) -> crate::Result<Self> {
        log::trace!("Creating journal at {}", path.display());

        let (segments, writer) = Self::bootstrap_segment(&path, &config, 1, 1)?;

        Ok(Self(Arc::new(JournalInner {
            path,
            state: RwLock::new(State {
                segments,
                writer,
                last_asqn: ASQN_UNSPECIFIED,
            }),
            config,
            is_open: AtomicBool::new(true),
        })))
    }

    /// Creates the initial segment of a fresh (or freshly reset) journal.
    fn bootstrap_segment(
        path: &std::path::Path,
        config: &Config,
        segment_id: u64,
        first_index: u64,
    ) -> crate::Result<(BTreeMap<u64, Arc<Segment>>, Writer)> {
        let descriptor = SegmentDescriptor {
            segment_id,
            first_index,
            max_segment_size: config.max_segment_size,
            max_entries: config.max_entries,
        };

        let file_path = path.join(segment_file_name(&config.name, segment_id));
        let segment = Segment::create(&file_path, descriptor, config.index_density)?;
        let writer = Writer::open(Arc::clone(&segment), config.max_entry_size)?;

        let mut segments = BTreeMap::new();
        segments.insert(first_index, segment);

        Ok((segments, writer))
    }

    /// Recovers a journal from its segment files.
    fn recover(
        path: PathBuf,
        config: Config,
        segment_files: &[(u64, PathBuf)],
    ) -> crate::Result<Self> {
        log::info!(
            "Recovering journal at {} ({} segments)",
            path.display(),
            segment_files.len(),
        );

        let mut segments = BTreeMap::new();
        let mut previous: Option<Arc<Segment>> = None;

        for (id, file_path) in segment_files {
            let segment = Segment::open(file_path, config.index_density)?;

            if segment.id() != *id {
                return Err(crate::Error::CorruptJournal(format!(
                    "segment file {} carries id {} in its descriptor",
                    file_path.display(),
                    segment.id(),
                )));
            }

            if let Some(previous) = &previous {
                if segment.id() != previous.id() + 1 {
                    return Err(crate::Error::CorruptJournal(format!(
                        "segment chain has a gap between #{} and #{}",
                        previous.id(),
                        segment.id(),
                    )));
                }

                if segment.first_index() <= previous.first_index() {
                    return Err(crate::Error::CorruptJournal(format!(
                        "segments #{} and #{} overlap",
                        previous.id(),
                        segment.id(),
                    )));
                }

                // Sealed segments were fsynced before rollover, so their
                // extent is given by the successor's first index
                previous.publish_last_index(segment.first_index() - 1);
            }

            segments.insert(segment.first_index(), Arc::clone(&segment));
            previous = Some(segment);
        }

        let tail = previous.expect("at least one segment file");

        // Re-scanning the tail discards any torn frames
        let writer = Writer::open(Arc::clone(&tail), config.max_entry_size)?;

        let last_asqn = match writer.last_entry() {
            Some(record) if record.has_asqn() => record.asqn,
            _ => Self::recover_last_asqn(&segments, config.max_entry_size)?,
        };

        log::debug!(
            "Recovered journal: indices {}..={}, last asqn {last_asqn}",
            segments
                .keys()
                .next()
                .copied()
                .expect("at least one segment"),
            writer.last_index(),
        );

        Ok(Self(Arc::new(JournalInner {
            path,
            state: RwLock::new(State {
                segments,
                writer,
                last_asqn,
            }),
            config,
            is_open: AtomicBool::new(true),
        })))
    }

    /// Finds the highest specified asqn by scanning segments back to front.
    ///
    /// Sequence numbers are non-decreasing, so the first segment (from the
    /// back) that contains any specified asqn holds the highest one.
    fn recover_last_asqn(
        segments: &BTreeMap<u64, Arc<Segment>>,
        max_entry_size: usize,
    ) -> crate::Result<u64> {
        for segment in segments.values().rev() {
            if segment.is_empty() {
                continue;
            }

            let mut reader = SegmentReader::new(Arc::clone(segment), max_entry_size)?;
            let mut found = ASQN_UNSPECIFIED;

            while let Some(record) = reader.read_next()? {
                if record.has_asqn() {
                    found = record.asqn;
                }
            }

            if found != ASQN_UNSPECIFIED {
                return Ok(found);
            }
        }

        Ok(ASQN_UNSPECIFIED)
    }

    /// Appends a payload, assigning the next index and no asqn.
    ///
    /// The record is readable immediately but only durable after [`flush`].
    ///
    /// [`flush`]: Journal::flush
    ///
    /// # Errors
    ///
    /// `TooLarge` if the payload exceeds the maximum entry size, `Io` on
    /// channel failure, `Closed` after close.
    pub fn append(&self, data: &[u8]) -> crate::Result<Record> {
        self.append_inner(ASQN_UNSPECIFIED, data)
    }

    /// Appends a payload with an application sequence number.
    ///
    /// # Errors
    ///
    /// `InvalidAsqn` unless `asqn` is positive and greater than every
    /// previously specified asqn; otherwise as [`append`].
    ///
    /// [`append`]: Journal::append
    pub fn append_with_asqn(&self, asqn: u64, data: &[u8]) -> crate::Result<Record> {
        if asqn == ASQN_UNSPECIFIED {
            return Err(crate::Error::InvalidAsqn {
                last: ASQN_UNSPECIFIED,
                actual: asqn,
            });
        }

        self.append_inner(asqn, data)
    }

    fn append_inner(&self, asqn: u64, data: &[u8]) -> crate::Result<Record> {
        self.ensure_open()?;

        let mut state = self.state.write().expect("lock is poisoned");

        if asqn != ASQN_UNSPECIFIED && asqn <= state.last_asqn {
            return Err(crate::Error::InvalidAsqn {
                last: state.last_asqn,
                actual: asqn,
            });
        }

        if state.writer.is_full() {
            self.roll(&mut state)?;
        }

        let record = match state.writer.append(asqn, data) {
            Ok(record) => record,
            // An empty segment that cannot fit the frame never will; rolling
            // over would just orphan it
            Err(crate::Error::OutOfSpace) if state.writer.entry_count() > 0 => {
                self.roll(&mut state)?;

                match state.writer.append(asqn, data) {
                    Ok(record) => record,
                    Err(crate::Error::OutOfSpace) => {
                        return Err(crate::Error::TooLarge {
                            size: data.len(),
                            max: self.config.max_entry_size,
                        })
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(crate::Error::OutOfSpace) => {
                return Err(crate::Error::TooLarge {
                    size: data.len(),
                    max: self.config.max_entry_size,
                })
            }
            Err(e) => return Err(e),
        };

        if record.has_asqn() {
            state.last_asqn = record.asqn;
        }

        Ok(record)
    }

    /// Appends an already-indexed record (replication path).
    ///
    /// The record's checksum is verified against its payload first. A record
    /// at the next index is appended verbatim; a record that conflicts with
    /// a stored one truncates the journal back to its index and rewrites the
    /// tail; a duplicate of a stored record or a record past the next index
    /// is rejected.
    ///
    /// # Errors
    ///
    /// `InvalidChecksum`, `InvalidIndex`, `TooLarge`, `Io`, `Closed`.
    pub fn append_record(&self, record: &Record) -> crate::Result<Record> {
        self.ensure_open()?;

        let mut state = self.state.write().expect("lock is poisoned");

        if frame::record_checksum(record.index, record.asqn, &record.data) != record.checksum {
            return Err(crate::Error::InvalidChecksum {
                index: record.index,
            });
        }

        let next_index = state.writer.last_index() + 1;

        if record.index > next_index {
            return Err(crate::Error::InvalidIndex {
                expected: next_index,
                actual: record.index,
            });
        }

        if record.index < next_index {
            let first_index = state
                .segments
                .keys()
                .next()
                .copied()
                .expect("journal has at least one segment");

            if record.index < first_index {
                return Err(crate::Error::InvalidIndex {
                    expected: next_index,
                    actual: record.index,
                });
            }

            let stored = self.read_record_locked(&state, record.index)?;

            if stored.as_ref() == Some(record) {
                // Records are never rewritten in place; replaying a record
                // that is already stored is a protocol error
                return Err(crate::Error::InvalidIndex {
                    expected: next_index,
                    actual: record.index,
                });
            }

            log::debug!(
                "Record {} conflicts with the stored one, truncating tail",
                record.index,
            );

            self.delete_after_locked(&mut state, record.index - 1)?;
        }

        if state.writer.is_full() {
            self.roll(&mut state)?;
        }

        let stored = match state.writer.append_record(record) {
            Ok(stored) => stored,
            Err(crate::Error::OutOfSpace) if state.writer.entry_count() > 0 => {
                self.roll(&mut state)?;

                match state.writer.append_record(record) {
                    Ok(stored) => stored,
                    Err(crate::Error::OutOfSpace) => {
                        return Err(crate::Error::TooLarge {
                            size: record.data.len(),
                            max: self.config.max_entry_size,
                        })
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(crate::Error::OutOfSpace) => {
                return Err(crate::Error::TooLarge {
                    size: record.data.len(),
                    max: self.config.max_entry_size,
                })
            }
            Err(e) => return Err(e),
        };

        if stored.has_asqn() {
            state.last_asqn = stored.asqn;
        }

        Ok(stored)
    }

    /// Seals the active segment and starts the next one.
    fn roll(&self, state: &mut State) -> crate::Result<()> {
        // Sealed segments must be durable before the chain grows past them;
        // recovery derives their extent from the successor
        state.writer.flush()?;

        // Continuing from the tail's id keeps the chain contiguous even
        // after trailing segments have been deleted
        let segment_id = state.writer.segment().id() + 1;
        let first_index = state.writer.last_index() + 1;

        log::debug!(
            "Rolling over to segment #{segment_id} (first index {first_index})",
        );

        let descriptor = SegmentDescriptor {
            segment_id,
            first_index,
            max_segment_size: self.config.max_segment_size,
            max_entries: self.config.max_entries,
        };

        let file_path = self
            .path
            .join(segment_file_name(&self.config.name, segment_id));
        let segment = Segment::create(&file_path, descriptor, self.config.index_density)?;

        state.writer = Writer::open(Arc::clone(&segment), self.config.max_entry_size)?;
        state.segments.insert(first_index, segment);

        Ok(())
    }

    fn read_record_locked(&self, state: &State, index: u64) -> crate::Result<Option<Record>> {
        let Some((_, segment)) = state.segments.range(..=index).next_back() else {
            return Ok(None);
        };

        if index > segment.last_index() {
            return Ok(None);
        }

        let mut reader = SegmentReader::new(Arc::clone(segment), self.config.max_entry_size)?;
        reader.seek(index)?;
        reader.read_next()
    }

    /// Opens a reader positioned before the first record.
    ///
    /// # Errors
    ///
    /// `Closed` if the journal has been closed.
    pub fn open_reader(&self) -> crate::Result<JournalReader> {
        self.ensure_open()?;
        Ok(JournalReader::new(Arc::clone(&self.0)))
    }

    /// Deletes all records after `index` (exclusive).
    ///
    /// Whole trailing segments are removed from disk; the segment containing
    /// `index` is truncated in place. Deleting after the last index or later
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn delete_after(&self, index: u64) -> crate::Result<()> {
        self.ensure_open()?;

        let mut state = self.state.write().expect("lock is poisoned");

        if index >= state.writer.last_index() {
            return Ok(());
        }

        self.delete_after_locked(&mut state, index)
    }

    fn delete_after_locked(&self, state: &mut State, index: u64) -> crate::Result<()> {
        let first_index = state
            .segments
            .keys()
            .next()
            .copied()
            .expect("journal has at least one segment");

        // The earliest segment is always retained; truncating below its
        // first index empties it instead
        let target_key = state
            .segments
            .range(..=index.max(first_index))
            .next_back()
            .map(|(key, _)| *key)
            .expect("journal has at least one segment");

        let removed = state.segments.split_off(&(target_key + 1));

        if !removed.is_empty() {
            let target = state
                .segments
                .get(&target_key)
                .cloned()
                .expect("target segment exists");

            // Reopen the writer on the new tail before its predecessors'
            // files disappear
            state.writer = Writer::open(target, self.config.max_entry_size)?;

            for segment in removed.values() {
                segment.delete()?;
            }
        }

        state.writer.truncate(index)?;

        state.last_asqn = match state.writer.last_entry() {
            Some(record) if record.has_asqn() => record.asqn,
            _ => Self::recover_last_asqn(&state.segments, self.config.max_entry_size)?,
        };

        Ok(())
    }

    /// Discards all segments and starts over at `new_first_index`.
    ///
    /// Readers holding pre-reset positions observe the post-reset journal;
    /// their old indices are gone.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn reset(&self, new_first_index: u64) -> crate::Result<()> {
        self.ensure_open()?;

        assert!(new_first_index > 0, "indices are 1-based");

        let mut state = self.state.write().expect("lock is poisoned");

        log::info!(
            "Resetting journal at {} to first index {new_first_index}",
            self.path.display(),
        );

        let old_segments = std::mem::take(&mut state.segments);
        for segment in old_segments.values() {
            segment.delete()?;
        }

        let (segments, writer) =
            Self::bootstrap_segment(&self.path, &self.config, 1, new_first_index)?;

        state.segments = segments;
        state.writer = writer;
        state.last_asqn = ASQN_UNSPECIFIED;

        Ok(())
    }

    /// Retires whole sealed segments whose last index is below `index`,
    /// freeing their disk space.
    ///
    /// The segment containing `index` and everything after it is retained,
    /// so the record at `index` stays readable.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn delete_until(&self, index: u64) -> crate::Result<()> {
        self.ensure_open()?;

        let mut state = self.state.write().expect("lock is poisoned");

        let active_first = state.writer.first_index();

        let removable: Vec<u64> = state
            .segments
            .range(..active_first)
            .filter(|(_, segment)| segment.last_index() < index)
            .map(|(key, _)| *key)
            .collect();

        for key in removable {
            if let Some(segment) = state.segments.remove(&key) {
                segment.delete()?;
            }
        }

        Ok(())
    }

    /// Returns the index of the first record in the journal.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.0.first_index()
    }

    /// Returns the index of the last record, or `first_index() - 1` if the
    /// journal is empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.0.last_index()
    }

    /// Returns `true` if the journal holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_index() < self.first_index()
    }

    /// Returns `true` until the journal is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0.is_open()
    }

    /// Returns the amount of segments in the journal.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        let state = self.state.read().expect("lock is poisoned");
        state.segments.len()
    }

    /// Syncs all appended records to disk.
    ///
    /// Only records appended before a successful flush are guaranteed to
    /// survive a crash.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn flush(&self) -> crate::Result<()> {
        self.ensure_open()?;

        let state = self.state.read().expect("lock is poisoned");
        state.writer.flush()
    }

    /// Flushes and closes the journal.
    ///
    /// Subsequent operations, including those of open readers, fail with
    /// `Closed`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the final flush fails.
    pub fn close(&self) -> crate::Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let result = self.flush();
        self.is_open.store(false, Ordering::Release);

        result
    }
}
