use tempfile::TempDir;

use crate::engine::tests::helpers::open_with_threshold;

#[test]
fn test_threshold_flush_produces_level0_table() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_with_threshold(&tmp.path().join("db.bin"), 8);

    for i in 1..=8u32 {
        engine.put(format!("{i}").as_bytes(), b"hi").unwrap();
    }

    // The eighth set crossed the threshold: one level-0 table, journal
    // empty, superblock advanced well past the initial epoch.
    let sb = *engine.superblock().unwrap();
    let heads = engine.tables().agg_heads(0).unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].meta.entry_count, 8);
    assert_eq!(engine.wal().used(), 0);
    assert_eq!(engine.wal().head(), engine.wal().tail());
    assert!(sb.epoch >= 3);
    assert_eq!(sb.checkpoint_lsn, 8);

    // The memtable is empty; reads now come from the table.
    assert_eq!(engine.state().memtable().len(), 0);
    for i in 1..=8u32 {
        assert_eq!(engine.get(format!("{i}").as_bytes()).unwrap(), b"hi");
    }
}

#[test]
fn test_multiple_flushes_accumulate_tables() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_with_threshold(&tmp.path().join("db.bin"), 2);

    for i in 0..6u32 {
        engine
            .put(format!("key-{i}").as_bytes(), format!("v{i}").as_bytes())
            .unwrap();
    }

    assert_eq!(engine.tables().agg_heads(0).unwrap().len(), 3);
    assert_eq!(engine.tables().level_size(0).unwrap(), 6);
    for i in 0..6u32 {
        assert_eq!(
            engine.get(format!("key-{i}").as_bytes()).unwrap(),
            format!("v{i}").into_bytes()
        );
    }
}

#[test]
fn test_newest_table_wins() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_with_threshold(&tmp.path().join("db.bin"), 2);

    engine.put(b"k", b"old").unwrap();
    engine.put(b"pad-1", b"x").unwrap(); // flush #1
    engine.put(b"k", b"new").unwrap();
    engine.put(b"pad-2", b"x").unwrap(); // flush #2

    assert_eq!(engine.tables().agg_heads(0).unwrap().len(), 2);
    assert_eq!(engine.get(b"k").unwrap(), b"new");
}

#[test]
fn test_flushed_tombstone_shadows_older_value() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_with_threshold(&tmp.path().join("db.bin"), 2);

    engine.put(b"k", b"live").unwrap();
    engine.put(b"pad-1", b"x").unwrap(); // flush #1 holds k=live
    engine.delete(b"k").unwrap();
    engine.put(b"pad-2", b"x").unwrap(); // flush #2 holds the tombstone

    // The tombstone in the newer table shadows the older live value.
    assert_eq!(engine.tables().agg_heads(0).unwrap().len(), 2);
    assert!(engine.get(b"k").unwrap().is_empty());
    assert_eq!(engine.get(b"pad-1").unwrap(), b"x");
}

#[test]
fn test_explicit_checkpoint_truncates_journal() {
    let tmp = TempDir::new().unwrap();
    let mut engine = open_with_threshold(&tmp.path().join("db.bin"), 100);

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    assert!(engine.wal().dirty());

    engine.force_checkpoint().unwrap();

    assert_eq!(engine.wal().used(), 0);
    // The memtable is untouched by a journal checkpoint.
    assert_eq!(engine.state().memtable().len(), 2);
    assert_eq!(engine.get(b"a").unwrap(), b"1");

    let sb = engine.superblock().unwrap();
    assert_eq!(sb.checkpoint_lsn, engine.wal().last_lsn());
}
