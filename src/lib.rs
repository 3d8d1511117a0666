// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Append-only segmented journal for replicated log storage.
//!
//! > This crate is intended as the storage layer of a consensus-replicated
//! > log. It stores an ordered sequence of opaque binary records on local
//! > disk and guarantees monotonic indexing, per-record integrity and safe
//! > recovery after a crash.
//!
//! The journal's contents are split into fixed-capacity segment files, each
//! holding a contiguous range of record indices:
//!
//! [1..=100][101..=200][201..]
//!
//! Every record is framed with a length word and a CRC32 checksum. The last
//! segment is *active*: it accepts appends until it is full, then the
//! journal rolls over to a fresh segment. Records become durable when
//! [`Journal::flush`] returns; on reopen, a recovery scan discards any torn
//! frames a crash may have left behind the last flush point, so a partially
//! written record is never observable.
//!
//! Appends go through a single writer, enforced internally; any number of
//! readers can iterate concurrently, each on its own file handle. Seeks are
//! accelerated by a sparse in-memory index mapping every k-th record index
//! to its file offset.
//!
//! Records optionally carry an *application sequence number* (asqn), a
//! monotonically increasing caller-supplied label that higher layers can
//! seek by without maintaining a secondary index.
//!
//! # Example usage
//!
//! ```
//! use segmented_journal::{Config, Journal};
//!
//! # fn main() -> segmented_journal::Result<()> {
//! # let folder = tempfile::tempdir()?;
//! // Open or recover a journal from disk
//! let journal = Journal::open(folder.path(), Config::default())?;
//!
//! let record = journal.append(b"hello")?;
//! assert_eq!(1, record.index);
//!
//! journal.flush()?;
//!
//! let mut reader = journal.open_reader()?;
//!
//! while let Some(record) = reader.read_next()? {
//!     assert_eq!(&*record.data, b"hello");
//! }
//! #
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod config;
mod descriptor;
mod error;
mod frame;
mod index;
mod journal;
mod path;
mod reader;
mod record;
mod segment;
mod slice;
mod version;

pub use {
    config::Config,
    error::{Error, Result},
    journal::Journal,
    reader::JournalReader,
    record::{Record, ASQN_UNSPECIFIED},
    slice::Slice,
    version::Version,
};

#[doc(hidden)]
pub use {
    descriptor::{SegmentDescriptor, DESCRIPTOR_SIZE},
    frame::{FRAME_HEADER_SIZE, RECORD_HEADER_SIZE},
};
