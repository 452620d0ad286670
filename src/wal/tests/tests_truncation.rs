use tempfile::TempDir;

use crate::wal::tests::helpers::setup;
use crate::wal::{OpKind, WalError};

#[test]
fn test_checkpoint_moves_head_to_post_record_offset() {
    let tmp = TempDir::new().unwrap();
    let (_file, mut superblock, mut wal) = setup(&tmp);

    wal.append_many(&[
        (OpKind::Set, b"a".as_ref(), b"1".as_ref()),
        (OpKind::Set, b"b".as_ref(), b"2".as_ref()),
        (OpKind::Set, b"c".as_ref(), b"3".as_ref()),
        (OpKind::Set, b"d".as_ref(), b"4".as_ref()),
        (OpKind::Set, b"e".as_ref(), b"5".as_ref()),
    ])
    .unwrap();

    let tail = wal.tail();
    wal.checkpoint(3, &mut superblock).unwrap();

    // Records are 24 bytes each; head lands after the third.
    assert_eq!(wal.head(), wal.tail() - 2 * 24);
    assert_eq!(wal.tail(), tail);
    assert_eq!(wal.used(), 48);

    // Only records 4 and 5 remain visible from the head.
    let records = wal.scan(wal.head(), wal.used()).unwrap();
    assert_eq!(
        records.iter().map(|r| r.lsn).collect::<Vec<_>>(),
        vec![4, 5]
    );
}

#[test]
fn test_checkpoint_publishes_superblock() {
    let tmp = TempDir::new().unwrap();
    let (_file, mut superblock, mut wal) = setup(&tmp);

    wal.append_many(&[(OpKind::Set, b"a".as_ref(), b"1".as_ref())])
        .unwrap();
    wal.checkpoint(1, &mut superblock).unwrap();

    let sb = superblock.current().unwrap();
    assert_eq!(sb.checkpoint_lsn, 1);
    assert_eq!(sb.j_head, wal.head());
    assert_eq!(sb.j_tail, wal.tail());
    assert_eq!(sb.epoch, 2);
    assert_eq!(wal.used(), 0);
    assert!(!wal.dirty());
}

#[test]
fn test_checkpoint_prunes_map_entries() {
    let tmp = TempDir::new().unwrap();
    let (_file, mut superblock, mut wal) = setup(&tmp);

    wal.append_many(&[
        (OpKind::Set, b"a".as_ref(), b"1".as_ref()),
        (OpKind::Set, b"b".as_ref(), b"2".as_ref()),
    ])
    .unwrap();

    wal.checkpoint(1, &mut superblock).unwrap();

    // Entries at or below the checkpointed LSN are gone.
    let err = wal.checkpoint(1, &mut superblock).unwrap_err();
    assert!(matches!(err, WalError::LsnNotFound(1)));

    // Later entries still resolve.
    wal.checkpoint(2, &mut superblock).unwrap();
    assert_eq!(wal.used(), 0);
}

#[test]
fn test_checkpoint_unknown_lsn_fails() {
    let tmp = TempDir::new().unwrap();
    let (_file, mut superblock, mut wal) = setup(&tmp);

    let err = wal.checkpoint(42, &mut superblock).unwrap_err();
    assert!(matches!(err, WalError::LsnNotFound(42)));
}

#[test]
fn test_recover_scan_advances_lsn_counter_past_survivors() {
    let tmp = TempDir::new().unwrap();
    let (file, mut superblock, mut wal) = setup(&tmp);

    wal.append_many(&[
        (OpKind::Set, b"a".as_ref(), b"1".as_ref()),
        (OpKind::Set, b"b".as_ref(), b"2".as_ref()),
        (OpKind::Set, b"c".as_ref(), b"3".as_ref()),
    ])
    .unwrap();
    // Truncate through record 1 only: the persisted checkpoint LSN now
    // trails the records still in the journal.
    wal.checkpoint(1, &mut superblock).unwrap();

    let mut reloaded = crate::superblock::SuperblockManager::new(std::sync::Arc::clone(&file));
    let sb = reloaded.load().unwrap();
    assert_eq!(sb.checkpoint_lsn, 1);
    let mut wal2 = crate::wal::RingWal::from_superblock(file, &sb);

    let records = wal2.recover_scan().unwrap();
    assert_eq!(
        records.iter().map(|r| r.lsn).collect::<Vec<_>>(),
        vec![2, 3]
    );
    // The counter moved past the surviving records, so fresh appends
    // cannot reassign their LSNs.
    assert_eq!(wal2.last_lsn(), 3);
    let next = wal2
        .append_many(&[(OpKind::Set, b"d".as_ref(), b"4".as_ref())])
        .unwrap();
    assert_eq!(next, 4);
}

#[test]
fn test_recover_scan_reinstates_offset_map() {
    let tmp = TempDir::new().unwrap();
    let (file, mut superblock, mut wal) = setup(&tmp);

    wal.append_many(&[
        (OpKind::Set, b"a".as_ref(), b"1".as_ref()),
        (OpKind::Set, b"b".as_ref(), b"2".as_ref()),
    ])
    .unwrap();
    // Publish the appended batch the way the submission loop does.
    superblock
        .checkpoint(crate::superblock::CheckpointUpdate {
            checkpoint_lsn: wal.last_lsn(),
            j_head: wal.head(),
            j_tail: wal.tail(),
        })
        .unwrap();

    // Fresh process: restore pointers from the superblock and rescan.
    let mut reloaded = crate::superblock::SuperblockManager::new(std::sync::Arc::clone(&file));
    let sb = reloaded.load().unwrap();
    let mut wal2 = crate::wal::RingWal::from_superblock(file, &sb);

    let records = wal2.recover_scan().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(wal2.last_lsn(), 2);

    // The reinstated map supports truncation at the replayed LSNs.
    wal2.checkpoint(2, &mut reloaded).unwrap();
    assert_eq!(wal2.used(), 0);
}
