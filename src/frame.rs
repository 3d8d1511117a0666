// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{record::Record, slice::Slice};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// Number of bytes framing each record on disk (length word + checksum).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Number of payload bytes occupied by the record header (index + asqn).
pub const RECORD_HEADER_SIZE: usize = 16;

/// Returns the total on-disk size of a frame holding `data_len` payload bytes.
pub(crate) fn frame_length(data_len: usize) -> u64 {
    (FRAME_HEADER_SIZE + RECORD_HEADER_SIZE + data_len) as u64
}

/// Computes the CRC32 a frame payload for this record would carry.
pub(crate) fn record_checksum(index: u64, asqn: u64, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(&asqn.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// Encodes one complete frame into `buf`, returning the payload checksum.
pub(crate) fn encode_into(buf: &mut Vec<u8>, index: u64, asqn: u64, data: &[u8]) -> u32 {
    let crc = record_checksum(index, asqn, data);

    buf.clear();

    // NOTE: Truncation is okay, payload lengths are bounded by max_entry_size
    #[allow(clippy::cast_possible_truncation)]
    let payload_len = (RECORD_HEADER_SIZE + data.len()) as u32;

    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(&asqn.to_le_bytes());
    buf.extend_from_slice(data);

    crc
}

/// Outcome of decoding a single frame.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A fully validated record.
    Record {
        /// The decoded record
        record: Record,

        /// Total on-disk size of the frame in bytes
        frame_len: u64,
    },

    /// A zero length word: the live region of the segment has ended.
    Padding,

    /// Length out of bounds, short read, or checksum mismatch.
    Invalid,
}

macro_rules! invalid_on_eof {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Frame::Invalid),
            Err(e) => return Err(e),
        }
    };
}

/// Reads and validates one frame.
///
/// A short read is reported as [`Frame::Invalid`], not as an error; whether
/// that means a torn tail or the end of the committed region is for the
/// caller to decide.
pub(crate) fn read_frame<R: Read>(reader: &mut R, max_entry_size: usize) -> std::io::Result<Frame> {
    let len = invalid_on_eof!(reader.read_u32::<LittleEndian>());

    if len == 0 {
        return Ok(Frame::Padding);
    }

    let len = len as usize;

    if len < RECORD_HEADER_SIZE || len > RECORD_HEADER_SIZE + max_entry_size {
        return Ok(Frame::Invalid);
    }

    let stored_crc = invalid_on_eof!(reader.read_u32::<LittleEndian>());

    let mut payload = vec![0; len];
    invalid_on_eof!(reader.read_exact(&mut payload));

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);

    if hasher.finalize() != stored_crc {
        return Ok(Frame::Invalid);
    }

    let mut payload = payload.as_slice();
    let index = payload.read_u64::<LittleEndian>()?;
    let asqn = payload.read_u64::<LittleEndian>()?;

    Ok(Frame::Record {
        record: Record {
            index,
            asqn,
            checksum: stored_crc,
            data: Slice::from(payload),
        },
        frame_len: frame_length(len - RECORD_HEADER_SIZE),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use super::*;
    use test_log::test;

    fn encode(index: u64, asqn: u64, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_into(&mut buf, index, asqn, data);
        buf
    }

    #[test]
    fn frame_round_trip() -> std::io::Result<()> {
        let buf = encode(7, 42, b"hello");
        assert_eq!(buf.len() as u64, frame_length(5));

        let frame = read_frame(&mut &buf[..], 1_024)?;

        match frame {
            Frame::Record { record, frame_len } => {
                assert_eq!(7, record.index);
                assert_eq!(42, record.asqn);
                assert_eq!(&*record.data, b"hello");
                assert_eq!(record.checksum, record_checksum(7, 42, b"hello"));
                assert_eq!(frame_len, buf.len() as u64);
            }
            _ => panic!("expected a record"),
        }

        Ok(())
    }

    #[test]
    fn frame_empty_payload() -> std::io::Result<()> {
        let buf = encode(1, 0, b"");
        let frame = read_frame(&mut &buf[..], 1_024)?;
        assert!(matches!(frame, Frame::Record { record, .. } if record.data.is_empty()));
        Ok(())
    }

    #[test]
    fn frame_zero_word_is_padding() -> std::io::Result<()> {
        let buf = [0u8; 64];
        assert!(matches!(read_frame(&mut &buf[..], 1_024)?, Frame::Padding));
        Ok(())
    }

    #[test]
    fn frame_flipped_byte_is_invalid() -> std::io::Result<()> {
        let mut buf = encode(7, 42, b"hello");
        *buf.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(read_frame(&mut &buf[..], 1_024)?, Frame::Invalid));
        Ok(())
    }

    #[test]
    fn frame_flipped_checksum_is_invalid() -> std::io::Result<()> {
        let mut buf = encode(7, 42, b"hello");
        buf[4] ^= 0x01;
        assert!(matches!(read_frame(&mut &buf[..], 1_024)?, Frame::Invalid));
        Ok(())
    }

    #[test]
    fn frame_short_read_is_invalid() -> std::io::Result<()> {
        let buf = encode(7, 42, b"hello");
        assert!(matches!(
            read_frame(&mut &buf[..buf.len() - 2], 1_024)?,
            Frame::Invalid
        ));
        assert!(matches!(read_frame(&mut &buf[..3], 1_024)?, Frame::Invalid));
        Ok(())
    }

    #[test]
    fn frame_length_overflow_is_invalid() -> std::io::Result<()> {
        let buf = encode(7, 42, &vec![0u8; 100]);
        assert!(matches!(read_frame(&mut &buf[..], 10)?, Frame::Invalid));
        Ok(())
    }
}
