use segmented_journal::{
    Config, Error, Journal, DESCRIPTOR_SIZE, FRAME_HEADER_SIZE, RECORD_HEADER_SIZE,
};
use std::io::{Seek, SeekFrom, Write};
use test_log::test;

/// Returns the file offset of the n-th (0-based) frame, given the payload
/// sizes of the frames before it.
fn frame_offset(preceding_payload_sizes: &[usize]) -> u64 {
    DESCRIPTOR_SIZE as u64
        + preceding_payload_sizes
            .iter()
            .map(|len| (FRAME_HEADER_SIZE + RECORD_HEADER_SIZE + len) as u64)
            .sum::<u64>()
}

fn patch_file(path: &std::path::Path, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[test]
fn flushed_records_survive_reopen() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;

        journal.append_with_asqn(1, b"first")?;
        journal.append_with_asqn(2, b"second")?;
        journal.flush()?;
    }

    let journal = Journal::open(folder.path(), Config::default())?;

    assert_eq!(2, journal.last_index());

    let mut reader = journal.open_reader()?;
    assert_eq!(b"first", &*reader.read_next()?.unwrap().data);
    assert_eq!(b"second", &*reader.read_next()?.unwrap().data);

    Ok(())
}

#[test]
fn reopen_empty_journal() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        assert!(journal.is_empty());
    }

    let journal = Journal::open(folder.path(), Config::default())?;
    assert!(journal.is_empty());
    assert_eq!(1, journal.append(b"data")?.index);

    Ok(())
}

#[test]
fn corrupted_tail_record_is_discarded() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append(b"one")?;
        journal.append(b"two")?;
        journal.close()?;
    }

    // Flip a byte inside the second record's payload
    let offset = frame_offset(&[3]) + (FRAME_HEADER_SIZE + RECORD_HEADER_SIZE) as u64;
    patch_file(&folder.path().join("journal-1.log"), offset, &[0xFF])?;

    let journal = Journal::open(folder.path(), Config::default())?;

    assert_eq!(1, journal.last_index());

    let mut reader = journal.open_reader()?;
    assert_eq!(b"one", &*reader.read_next()?.unwrap().data);
    assert!(reader.read_next()?.is_none());

    // The next append re-assigns the discarded index
    let record = journal.append(b"replacement")?;
    assert_eq!(2, record.index);

    let mut reader = journal.open_reader()?;
    reader.seek(2);
    assert_eq!(b"replacement", &*reader.read_next()?.unwrap().data);

    Ok(())
}

#[test]
fn zeroed_tail_record_is_discarded() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append(b"one")?;
        journal.append(b"two")?;
        journal.close()?;
    }

    let frame_len = FRAME_HEADER_SIZE + RECORD_HEADER_SIZE + 3;
    patch_file(
        &folder.path().join("journal-1.log"),
        frame_offset(&[3]),
        &vec![0u8; frame_len],
    )?;

    let journal = Journal::open(folder.path(), Config::default())?;
    assert_eq!(1, journal.last_index());

    Ok(())
}

#[test]
fn corrupted_sole_record_yields_empty_journal() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append(b"one")?;
        journal.close()?;
    }

    let offset = frame_offset(&[]) + (FRAME_HEADER_SIZE + RECORD_HEADER_SIZE) as u64;
    patch_file(&folder.path().join("journal-1.log"), offset, &[0xFF])?;

    let journal = Journal::open(folder.path(), Config::default())?;

    assert!(journal.is_empty());
    assert_eq!(1, journal.append(b"fresh")?.index);

    Ok(())
}

#[test]
fn torn_tail_only_affects_last_segment() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let config = Config::default().max_segment_size(1_024).max_entry_size(256);

    let (tail_id, tail_first_index) = {
        let journal = Journal::open(folder.path(), config.clone())?;

        for i in 0..100u64 {
            journal.append(&i.to_le_bytes())?;
        }

        journal.flush()?;

        let segments = journal.segment_count() as u64;
        assert!(segments > 1);

        // 30 records of 8 payload bytes per 1 KiB segment
        (segments, (segments - 1) * 30 + 1)
    };

    // Corrupt the first record of the tail segment
    let offset = frame_offset(&[]) + (FRAME_HEADER_SIZE + RECORD_HEADER_SIZE) as u64;
    patch_file(
        &folder.path().join(format!("journal-{tail_id}.log")),
        offset,
        &[0xFF],
    )?;

    let journal = Journal::open(folder.path(), config)?;

    assert_eq!(tail_first_index - 1, journal.last_index());

    // Everything before the tail segment is intact
    let reader = journal.open_reader()?;
    assert_eq!(tail_first_index - 1, reader.count() as u64);

    Ok(())
}

#[test]
fn descriptor_with_bad_magic_is_rejected() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append(b"data")?;
        journal.close()?;
    }

    patch_file(&folder.path().join("journal-1.log"), 0, b"XXXX")?;

    assert!(matches!(
        Journal::open(folder.path(), Config::default()),
        Err(Error::InvalidVersion(None))
    ));

    Ok(())
}

#[test]
fn missing_segment_in_chain_is_rejected() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(
            folder.path(),
            Config::default().max_segment_size(1_024).max_entry_size(256),
        )?;

        for i in 0..100u64 {
            journal.append(&i.to_le_bytes())?;
        }

        assert!(journal.segment_count() > 2);
        journal.close()?;
    }

    std::fs::remove_file(folder.path().join("journal-2.log"))?;

    assert!(matches!(
        Journal::open(
            folder.path(),
            Config::default().max_segment_size(1_024).max_entry_size(256),
        ),
        Err(Error::CorruptJournal(_))
    ));

    Ok(())
}

#[test]
fn unrecognized_files_are_ignored() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append(b"data")?;
        journal.flush()?;
    }

    std::fs::write(folder.path().join("journal-1.log.bak"), b"noise")?;
    std::fs::write(folder.path().join(".DS_Store"), b"noise")?;

    let journal = Journal::open(folder.path(), Config::default())?;
    assert_eq!(1, journal.last_index());

    Ok(())
}

#[test]
fn journals_with_different_names_can_share_a_folder() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let left = Journal::open(folder.path(), Config::default().name("left"))?;
    let right = Journal::open(folder.path(), Config::default().name("right"))?;

    left.append(b"L")?;
    right.append(b"R")?;
    right.append(b"R")?;

    assert_eq!(1, left.last_index());
    assert_eq!(2, right.last_index());

    Ok(())
}
