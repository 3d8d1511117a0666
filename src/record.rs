// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::slice::Slice;

/// Reserved application sequence number meaning "unspecified".
///
/// Legal caller-supplied sequence numbers start at 1.
pub const ASQN_UNSPECIFIED: u64 = 0;

/// A record stored in the journal
///
/// Records are immutable; the journal never rewrites one in place.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Record {
    /// Dense, 1-based index assigned by the journal
    pub index: u64,

    /// Application sequence number, or [`ASQN_UNSPECIFIED`]
    pub asqn: u64,

    /// CRC32 over the record's on-disk payload
    pub checksum: u32,

    /// Opaque payload bytes
    pub data: Slice,
}

impl Record {
    /// Returns `true` if the record carries an application sequence number.
    #[must_use]
    pub fn has_asqn(&self) -> bool {
        self.asqn != ASQN_UNSPECIFIED
    }
}
