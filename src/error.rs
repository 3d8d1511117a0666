// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur in the journal
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Invalid data format version
    InvalidVersion(Option<u8>),

    /// A record index that is out of sequence (gap or duplicate)
    InvalidIndex {
        /// The next index the journal would accept
        expected: u64,

        /// The index that was supplied
        actual: u64,
    },

    /// An application sequence number that is not monotonically increasing
    InvalidAsqn {
        /// The highest application sequence number seen so far
        last: u64,

        /// The sequence number that was supplied
        actual: u64,
    },

    /// A supplied record checksum that does not match its payload
    InvalidChecksum {
        /// Index of the offending record
        index: u64,
    },

    /// A payload larger than the configured maximum entry size
    TooLarge {
        /// Size of the rejected payload in bytes
        size: usize,

        /// The configured maximum entry size
        max: usize,
    },

    /// The active segment has no room left for the entry
    OutOfSpace,

    /// A frame inside the committed region failed validation
    CorruptFrame {
        /// Index of the record that could not be read
        index: u64,
    },

    /// The on-disk segment chain is inconsistent
    CorruptJournal(String),

    /// The journal has been closed
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JournalError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Journal result
pub type Result<T> = std::result::Result<T, Error>;
