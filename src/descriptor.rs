// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::version::Version;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const DESCRIPTOR_MAGIC: &[u8] = &[b'J', b'R', b'N', b'L'];

/// Size of the fixed descriptor block at the start of every segment file.
///
/// The block size is the same across format versions, so frames always
/// start at this offset.
pub const DESCRIPTOR_SIZE: usize = 64;

const RESERVED_SIZE: usize = DESCRIPTOR_SIZE - DESCRIPTOR_MAGIC.len() - 4 - 8 * 4;

/// Fixed-size header written before any frame of a segment file.
///
/// The descriptor's `first_index` is authoritative: the first frame of the
/// segment carries exactly this index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentDescriptor {
    /// 1-based, monotonically increasing segment id
    pub segment_id: u64,

    /// Index of the first record in the segment
    pub first_index: u64,

    /// Maximum segment file size in bytes
    pub max_segment_size: u64,

    /// Maximum number of entries in the segment (0 = unbounded)
    pub max_entries: u64,
}

impl SegmentDescriptor {
    pub(crate) fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(DESCRIPTOR_MAGIC)?;
        writer.write_u8(Version::V1.into())?;
        writer.write_all(&[0; 3])?;

        writer.write_u64::<LittleEndian>(self.segment_id)?;
        writer.write_u64::<LittleEndian>(self.first_index)?;
        writer.write_u64::<LittleEndian>(self.max_segment_size)?;
        writer.write_u64::<LittleEndian>(self.max_entries)?;

        writer.write_all(&[0; RESERVED_SIZE])?;

        Ok(())
    }

    pub(crate) fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let mut magic = [0; DESCRIPTOR_MAGIC.len()];
        reader.read_exact(&mut magic)?;

        if magic != DESCRIPTOR_MAGIC {
            return Err(crate::Error::InvalidVersion(None));
        }

        let version = reader.read_u8()?;
        if Version::try_from(version).is_err() {
            return Err(crate::Error::InvalidVersion(Some(version)));
        }

        let mut pad = [0; 3];
        reader.read_exact(&mut pad)?;

        let segment_id = reader.read_u64::<LittleEndian>()?;
        let first_index = reader.read_u64::<LittleEndian>()?;
        let max_segment_size = reader.read_u64::<LittleEndian>()?;
        let max_entries = reader.read_u64::<LittleEndian>()?;

        let mut reserved = [0; RESERVED_SIZE];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            segment_id,
            first_index,
            max_segment_size,
            max_entries,
        })
    }
}
