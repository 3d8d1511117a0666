use segmented_journal::{Config, Error, Journal};
use test_log::test;

#[test]
fn asqn_must_increase() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let journal = Journal::open(folder.path(), Config::default())?;

    journal.append_with_asqn(5, b"a")?;

    assert!(matches!(
        journal.append_with_asqn(5, b"b"),
        Err(Error::InvalidAsqn { last: 5, actual: 5 })
    ));
    assert!(matches!(
        journal.append_with_asqn(4, b"b"),
        Err(Error::InvalidAsqn { last: 5, actual: 4 })
    ));

    // A failed append leaves the journal untouched
    assert_eq!(1, journal.last_index());

    journal.append_with_asqn(6, b"b")?;
    assert_eq!(2, journal.last_index());

    Ok(())
}

#[test]
fn asqn_zero_is_reserved() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let journal = Journal::open(folder.path(), Config::default())?;

    assert!(matches!(
        journal.append_with_asqn(0, b"a"),
        Err(Error::InvalidAsqn { actual: 0, .. })
    ));

    Ok(())
}

#[test]
fn asqn_gap_after_unspecified_records() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let journal = Journal::open(folder.path(), Config::default())?;

    journal.append_with_asqn(10, b"a")?;
    journal.append(b"b")?;
    journal.append(b"c")?;

    // The unspecified records in between do not reset the watermark
    assert!(matches!(
        journal.append_with_asqn(10, b"d"),
        Err(Error::InvalidAsqn {
            last: 10,
            actual: 10
        })
    ));

    journal.append_with_asqn(11, b"d")?;

    Ok(())
}

#[test]
fn asqn_watermark_survives_reopen() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let journal = Journal::open(folder.path(), Config::default())?;
        journal.append_with_asqn(10, b"a")?;
        journal.append(b"b")?;
        journal.flush()?;
    }

    let journal = Journal::open(folder.path(), Config::default())?;

    assert!(matches!(
        journal.append_with_asqn(10, b"c"),
        Err(Error::InvalidAsqn {
            last: 10,
            actual: 10
        })
    ));

    journal.append_with_asqn(20, b"c")?;

    Ok(())
}

#[test]
fn seek_to_asqn() -> segmented_journal::Result<()> {
    let folder = tempfile::tempdir()?;

    let journal = Journal::open(folder.path(), Config::default())?;

    journal.append_with_asqn(10, b"a")?; // index 1
    journal.append(b"b")?; // index 2
    journal.append_with_asqn(20, b"c")?; // index 3
    journal.append_with_asqn(30, b"d")?; // index 4

    let mut reader = journal.open_reader()?;

    // Exact hit
    assert_eq!(3, reader.seek_to_asqn(20)?);
    assert_eq!(b"c", &*reader.read_next()?.unwrap().data);

    // Between two asqns: the lower one wins
    assert_eq!(3, reader.seek_to_asqn(25)?);
    assert_eq!(b"c", &*reader.read_next()?.unwrap().data);

    // Past the end
    assert_eq!(4, reader.seek_to_asqn(1_000)?);

    // Before the first specified asqn
    assert_eq!(0, reader.seek_to_asqn(5)?);
    assert_eq!(1, reader.read_next()?.unwrap().index);

    Ok(())
}
