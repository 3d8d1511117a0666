// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::Segment;
use crate::{
    descriptor::DESCRIPTOR_SIZE,
    frame::{self, Frame},
    record::Record,
};
use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    sync::Arc,
};

/// Reads through one segment in order.
///
/// Each reader owns its file handle and position, so any number of them can
/// run concurrently with the writer. Iteration is bounded by the segment's
/// published last index and never observes a frame that is still being
/// written.
pub struct Reader {
    segment: Arc<Segment>,

    inner: BufReader<File>,

    /// Offset of the next frame to read
    position: u64,

    next_index: u64,

    /// Segment epoch the buffered bytes belong to
    epoch: u64,

    /// Highest index that was already committed when the buffer was last
    /// dropped; bytes of frames past it may still be stale zero fill
    trusted_through: u64,

    max_entry_size: usize,
}

impl Reader {
    /// Initializes a new segment reader positioned on the first record.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn new(segment: Arc<Segment>, max_entry_size: usize) -> crate::Result<Self> {
        let mut inner = BufReader::new(File::open(segment.path())?);
        inner.seek(SeekFrom::Start(DESCRIPTOR_SIZE as u64))?;

        Ok(Self {
            position: DESCRIPTOR_SIZE as u64,
            next_index: segment.first_index(),
            epoch: segment.epoch(),
            trusted_through: segment.last_index(),
            inner,
            max_entry_size,
            segment,
        })
    }

    pub(crate) fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Positions the cursor so that the next read returns `index`.
    ///
    /// The target is clamped to the segment's live range. The sparse index
    /// is consulted for the greatest known entry at or before the target;
    /// the remaining distance is covered by a forward scan.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn seek(&mut self, index: u64) -> crate::Result<()> {
        let target = index.clamp(self.segment.first_index(), self.segment.last_index() + 1);

        let (next_index, position) = match self.segment.lookup(target) {
            Some(entry) if entry.index <= self.segment.last_index() => {
                (entry.index, entry.position)
            }
            _ => (self.segment.first_index(), DESCRIPTOR_SIZE as u64),
        };

        self.drop_buffer(position)?;
        self.next_index = next_index;

        while self.next_index < target {
            if self.read_next()?.is_none() {
                break;
            }
        }

        Ok(())
    }

    /// Positions the cursor on the last record of the segment.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub(crate) fn seek_to_last(&mut self) -> crate::Result<u64> {
        let last = self.segment.last_index();
        self.seek(last)?;
        Ok(last)
    }

    /// Reads the next record, or `None` at the end of the committed region.
    ///
    /// # Errors
    ///
    /// `CorruptFrame` if a frame inside the committed region fails
    /// validation (media corruption), `Io` on channel failure.
    pub(crate) fn read_next(&mut self) -> crate::Result<Option<Record>> {
        if self.next_index > self.segment.last_index() {
            return Ok(None);
        }

        // Buffered bytes may predate in-place rewrites (truncation), or
        // still be zero fill from before the writer committed this frame;
        // both require re-reading from disk
        if self.epoch != self.segment.epoch() || self.next_index > self.trusted_through {
            self.drop_buffer(self.position)?;
        }

        match frame::read_frame(&mut self.inner, self.max_entry_size)? {
            Frame::Record { record, frame_len } if record.index == self.next_index => {
                self.segment.observe(record.index, self.position);
                self.position += frame_len;
                self.next_index += 1;
                Ok(Some(record))
            }
            _ => Err(crate::Error::CorruptFrame {
                index: self.next_index,
            }),
        }
    }

    /// Discards the internal buffer and repositions the file cursor; bytes
    /// read afterwards reflect everything committed up to this point.
    fn drop_buffer(&mut self, position: u64) -> crate::Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        self.epoch = self.segment.epoch();
        self.trusted_through = self.segment.last_index();
        Ok(())
    }
}
