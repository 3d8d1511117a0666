// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    journal::JournalInner,
    record::Record,
    segment::reader::Reader as SegmentReader,
};
use std::sync::Arc;

/// A cursor over the records of a journal.
///
/// Readers iterate in index order, crossing segment boundaries
/// transparently, and may run concurrently with the writer and with each
/// other. A reader whose segment is truncated or deleted underneath it
/// re-resolves its position against the live journal instead of observing
/// dead frames.
pub struct JournalReader {
    journal: Arc<JournalInner>,

    current: Option<SegmentReader>,

    /// Index of the record the next read will return
    next_index: u64,
}

impl JournalReader {
    pub(crate) fn new(journal: Arc<JournalInner>) -> Self {
        Self {
            next_index: journal.first_index(),
            current: None,
            journal,
        }
    }

    /// Returns `true` if a read would yield a record.
    #[must_use]
    pub fn has_next(&self) -> bool {
        // The journal's head may have moved past us (reset, retention); a
        // read would then resume at the new first index
        let next_index = self.next_index.max(self.journal.first_index());

        self.journal.is_open() && next_index <= self.journal.last_index()
    }

    /// Returns the index of the record the next read will return.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Positions the cursor so that the next read returns `index`.
    ///
    /// The target is clamped to the journal's live range.
    pub fn seek(&mut self, index: u64) {
        self.next_index = index.clamp(self.journal.first_index(), self.journal.last_index() + 1);
        self.current = None;
    }

    /// Positions the cursor on the last record.
    ///
    /// Returns the last index (`first_index - 1` if the journal is empty).
    pub fn seek_to_last(&mut self) -> u64 {
        let last = self.journal.last_index();
        self.seek(last);
        last
    }

    /// Positions the cursor on the last record whose application sequence
    /// number is at most `asqn`, returning its index.
    ///
    /// Records without an asqn are skipped over during the comparison. If no
    /// record qualifies, the cursor rewinds to the start of the journal and
    /// `first_index - 1` is returned.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs or the journal is closed.
    pub fn seek_to_asqn(&mut self, asqn: u64) -> crate::Result<u64> {
        self.seek(self.journal.first_index());

        let mut found = None;

        while let Some(record) = self.read_next()? {
            if record.has_asqn() {
                if record.asqn > asqn {
                    break;
                }

                found = Some(record.index);
            }
        }

        match found {
            Some(index) => {
                self.seek(index);
                Ok(index)
            }
            None => {
                let first_index = self.journal.first_index();
                self.seek(first_index);
                Ok(first_index - 1)
            }
        }
    }

    /// Reads the next record, or `None` at the end of the journal.
    ///
    /// # Errors
    ///
    /// `Closed` if the journal was closed, `CorruptFrame` on media
    /// corruption inside the committed region, `Io` on channel failure.
    pub fn read_next(&mut self) -> crate::Result<Option<Record>> {
        self.journal.ensure_open()?;

        loop {
            if self.next_index > self.journal.last_index() {
                return Ok(None);
            }

            if self.next_index < self.journal.first_index() {
                // Head retention or a reset moved the journal past us
                self.next_index = self.journal.first_index();
            }

            let cursor_matches = self.current.as_ref().is_some_and(|cursor| {
                !cursor.segment().is_deleted()
                    && cursor.next_index() == self.next_index
                    && self.next_index <= cursor.segment().last_index()
            });

            if !cursor_matches {
                let Some(segment) = self.journal.segment_for(self.next_index) else {
                    return Ok(None);
                };

                let mut cursor = SegmentReader::new(segment, self.journal.max_entry_size())?;
                cursor.seek(self.next_index)?;
                self.current = Some(cursor);
            }

            let cursor = self.current.as_mut().expect("cursor was just resolved");

            match cursor.read_next()? {
                Some(record) => {
                    self.next_index = record.index + 1;
                    return Ok(Some(record));
                }
                None => {
                    // Caught up with this segment; if the journal reaches
                    // further, the next loop iteration resolves the
                    // successor segment
                    self.current = None;
                }
            }
        }
    }

    /// Closes the reader, releasing its file handle.
    pub fn close(self) {
        drop(self);
    }
}

impl Iterator for JournalReader {
    type Item = crate::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
