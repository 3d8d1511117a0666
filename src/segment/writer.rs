// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Segment;
use crate::{
    descriptor::DESCRIPTOR_SIZE,
    frame::{self, Frame},
    record::Record,
    slice::Slice,
};
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Seek, SeekFrom, Write},
    sync::Arc,
};

/// Segment writer
///
/// There is exactly one writer per segment; truncation and appends go
/// through it, so they are mutually exclusive by construction.
pub struct Writer {
    segment: Arc<Segment>,

    file: File,

    /// Next write offset (end of the last committed frame)
    position: u64,

    last_entry: Option<Record>,

    /// Reusable frame buffer, sized for a maximum-size entry
    scratch: Vec<u8>,

    max_entry_size: usize,
}

impl Writer {
    /// Opens the writer for `segment`, re-scanning the live region to
    /// rebuild the last entry and the sparse index.
    ///
    /// Any torn tail left behind by a crash is discarded: the scan stops at
    /// the first frame that fails validation or breaks the index sequence,
    /// and appends continue from there.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn open(segment: Arc<Segment>, max_entry_size: usize) -> crate::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(segment.path())?;

        let mut writer = Self {
            file,
            position: DESCRIPTOR_SIZE as u64,
            last_entry: None,
            scratch: Vec::with_capacity(frame::frame_length(max_entry_size) as usize),
            max_entry_size,
            segment,
        };
        writer.rescan(0)?;

        Ok(writer)
    }

    pub(crate) fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    pub(crate) fn first_index(&self) -> u64 {
        self.segment.first_index()
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.last_entry
            .as_ref()
            .map_or_else(|| self.first_index() - 1, |record| record.index)
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.last_index() + 1
    }

    pub(crate) fn last_entry(&self) -> Option<&Record> {
        self.last_entry.as_ref()
    }

    pub(crate) fn entry_count(&self) -> u64 {
        self.last_index() + 1 - self.first_index()
    }

    /// Returns `true` if the segment cannot accept another record.
    pub(crate) fn is_full(&self) -> bool {
        let max_entries = self.segment.descriptor().max_entries;
        if max_entries > 0 && self.entry_count() >= max_entries {
            return true;
        }

        self.position + frame::frame_length(0) > self.segment.descriptor().max_segment_size
    }

    /// Appends a record with the next index.
    ///
    /// # Errors
    ///
    /// `TooLarge` if the payload exceeds the maximum entry size, `OutOfSpace`
    /// if the segment cannot fit the frame, `Io` on channel failure.
    pub(crate) fn append(&mut self, asqn: u64, data: &[u8]) -> crate::Result<Record> {
        if data.len() > self.max_entry_size {
            return Err(crate::Error::TooLarge {
                size: data.len(),
                max: self.max_entry_size,
            });
        }

        self.check_space(data.len())?;

        let index = self.next_index();
        self.write_frame(index, asqn, data)
    }

    /// Appends an already-indexed record verbatim (replication path).
    ///
    /// The checksum is recomputed over the supplied payload and must match;
    /// the record's index must be exactly the next index of this segment.
    ///
    /// # Errors
    ///
    /// `InvalidChecksum`, `InvalidIndex`, `TooLarge`, `OutOfSpace`, `Io`.
    pub(crate) fn append_record(&mut self, record: &Record) -> crate::Result<Record> {
        if frame::record_checksum(record.index, record.asqn, &record.data) != record.checksum {
            return Err(crate::Error::InvalidChecksum {
                index: record.index,
            });
        }

        if record.index != self.next_index() {
            return Err(crate::Error::InvalidIndex {
                expected: self.next_index(),
                actual: record.index,
            });
        }

        if record.data.len() > self.max_entry_size {
            return Err(crate::Error::TooLarge {
                size: record.data.len(),
                max: self.max_entry_size,
            });
        }

        self.check_space(record.data.len())?;

        self.write_frame(record.index, record.asqn, &record.data)
    }

    fn check_space(&self, data_len: usize) -> crate::Result<()> {
        if self.position + frame::frame_length(data_len) > self.segment.descriptor().max_segment_size
        {
            return Err(crate::Error::OutOfSpace);
        }

        let max_entries = self.segment.descriptor().max_entries;
        if max_entries > 0 && self.entry_count() >= max_entries {
            return Err(crate::Error::OutOfSpace);
        }

        Ok(())
    }

    fn write_frame(&mut self, index: u64, asqn: u64, data: &[u8]) -> crate::Result<Record> {
        let checksum = frame::encode_into(&mut self.scratch, index, asqn, data);

        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.write_all(&self.scratch)?;

        let record = Record {
            index,
            asqn,
            checksum,
            data: Slice::from(data),
        };

        // The in-memory view is only advanced after the channel write
        // returned, so a failed write leaves the journal state untouched
        self.segment.observe(index, self.position);
        self.position += self.scratch.len() as u64;
        self.last_entry = Some(record.clone());
        self.segment.publish_last_index(index);

        Ok(record)
    }

    /// Truncates the segment so that `index` becomes the last index.
    ///
    /// Frames strictly after `index` are zero-filled in place, keeping the
    /// file self-delimiting. Truncating to an index at or past the last
    /// index is a no-op; truncating below the first index empties the
    /// segment entirely.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn truncate(&mut self, index: u64) -> crate::Result<()> {
        if index >= self.last_index() {
            return Ok(());
        }

        log::debug!(
            "Truncating segment #{} from index {} down to {index}",
            self.segment.id(),
            self.last_index(),
        );

        let previous_end = self.position;
        self.last_entry = None;
        self.segment.truncate_index_after(index);

        if index < self.first_index() {
            self.zero_region(DESCRIPTOR_SIZE as u64, previous_end)?;
            self.position = DESCRIPTOR_SIZE as u64;
            self.segment.publish_last_index(self.first_index() - 1);
        } else {
            let (cut, last) = self.scan_to(index)?;
            self.zero_region(cut, previous_end)?;
            self.position = cut;
            self.last_entry = Some(last);
            self.segment.publish_last_index(index);
        }

        self.segment.bump_epoch();
        self.file.seek(SeekFrom::Start(self.position))?;

        Ok(())
    }

    /// Scans the live region until the frame carrying `index` has been
    /// consumed, returning its end offset and the record itself.
    fn scan_to(&mut self, index: u64) -> crate::Result<(u64, Record)> {
        let (mut expected, mut position) = match self.segment.lookup(index) {
            Some(entry) => (entry.index, entry.position),
            None => (self.first_index(), DESCRIPTOR_SIZE as u64),
        };

        let mut reader = BufReader::new(File::open(self.segment.path())?);
        reader.seek(SeekFrom::Start(position))?;

        loop {
            match frame::read_frame(&mut reader, self.max_entry_size)? {
                Frame::Record { record, frame_len } if record.index == expected => {
                    position += frame_len;

                    if record.index == index {
                        return Ok((position, record));
                    }

                    expected += 1;
                }
                _ => {
                    return Err(crate::Error::CorruptJournal(format!(
                        "segment #{} is missing record {expected} before the truncation point",
                        self.segment.id(),
                    )))
                }
            }
        }
    }

    #[allow(clippy::indexing_slicing)]
    fn zero_region(&mut self, from: u64, to: u64) -> crate::Result<()> {
        if to <= from {
            return Ok(());
        }

        const CHUNK: usize = 4_096;
        let zeroes = [0u8; CHUNK];

        self.file.seek(SeekFrom::Start(from))?;

        let mut remaining = to - from;
        while remaining > 0 {
            let n = remaining.min(CHUNK as u64) as usize;
            self.file.write_all(&zeroes[..n])?;
            remaining -= n as u64;
        }

        Ok(())
    }

    /// Re-scans the on-disk frames up to and including `up_to` (0 = all),
    /// rebuilding the last entry and the sparse index from scratch.
    ///
    /// The channel is left positioned just past the last valid frame, so
    /// subsequent appends are contiguous.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn rescan(&mut self, up_to: u64) -> crate::Result<()> {
        self.last_entry = None;
        self.segment.clear_index();
        self.segment.bump_epoch();

        let mut expected = self.first_index();
        let mut position = DESCRIPTOR_SIZE as u64;

        let mut reader = BufReader::new(File::open(self.segment.path())?);
        reader.seek(SeekFrom::Start(position))?;

        while up_to == 0 || expected <= up_to {
            match frame::read_frame(&mut reader, self.max_entry_size)? {
                Frame::Record { record, frame_len } if record.index == expected => {
                    self.segment.observe(record.index, position);
                    position += frame_len;
                    expected += 1;
                    self.last_entry = Some(record);
                }
                Frame::Padding => break,
                _ => {
                    log::warn!(
                        "Discarding torn tail of segment #{} after index {}",
                        self.segment.id(),
                        expected - 1,
                    );
                    break;
                }
            }
        }

        self.position = position;
        self.segment.publish_last_index(expected - 1);
        self.file.seek(SeekFrom::Start(position))?;

        Ok(())
    }

    /// Syncs all written frames to disk.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn flush(&self) -> crate::Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
