use tempfile::TempDir;

use crate::engine::tests::helpers::{open, open_with_threshold};

#[test]
fn test_crash_before_flush_replays_journal() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open(&path);
        engine.put(b"a", b"1").unwrap();
        // Drop without a flush: the journal is the only durable copy.
        assert!(engine.wal().dirty());
    }

    let mut engine = open(&path);
    // Recovery enqueued the set; it is replayed, not re-journaled.
    assert_eq!(engine.pending(), 1);
    assert!(engine.state().recover_flush() > 0);
    let used_before = engine.wal().used();

    engine.drain().unwrap();
    assert_eq!(engine.state().recover_flush(), -1);
    assert_eq!(engine.state().memtable().len(), 1);
    // Replay appended nothing to the journal.
    assert_eq!(engine.wal().used(), used_before);

    assert_eq!(engine.get(b"a").unwrap(), b"1");
}

#[test]
fn test_recovery_is_idempotent_across_crashes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open(&path);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
    }
    {
        // Open and crash again without draining: the journal still holds
        // both records because nothing checkpointed past them.
        let engine = open(&path);
        assert_eq!(engine.pending(), 2);
    }

    let mut engine = open(&path);
    assert_eq!(engine.pending(), 2);
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert_eq!(engine.get(b"b").unwrap(), b"2");
}

#[test]
fn test_replay_drives_threshold_flush_and_truncation() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open_with_threshold(&path, 100);
        for i in 0..4u32 {
            engine
                .put(format!("key-{i}").as_bytes(), format!("v{i}").as_bytes())
                .unwrap();
        }
    }

    // Reopen with a lower threshold: the replayed batch alone crosses it,
    // so the flush and journal truncation run against replayed LSNs.
    let mut engine = open_with_threshold(&path, 4);
    engine.drain().unwrap();

    assert_eq!(engine.tables().agg_heads(0).unwrap().len(), 1);
    assert_eq!(engine.tables().level_size(0).unwrap(), 4);
    assert_eq!(engine.wal().used(), 0);
    for i in 0..4u32 {
        assert_eq!(
            engine.get(format!("key-{i}").as_bytes()).unwrap(),
            format!("v{i}").into_bytes()
        );
    }
}

#[test]
fn test_partial_replay_flush_keeps_unapplied_tail_journaled() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    // 40 journaled records — more than one MAX_INFLIGHT batch (32).
    {
        let mut engine = open_with_threshold(&path, 100);
        for i in 0..40u32 {
            engine
                .put(format!("key-{i:02}").as_bytes(), format!("v{i}").as_bytes())
                .unwrap();
        }
        assert_eq!(engine.wal().last_lsn(), 40);
    }

    {
        // A low threshold makes the very first replay batch flush. The
        // flush must cover and truncate only the 32 applied records; the
        // 8-record tail still sits in the queue and must stay journaled.
        let mut engine = open_with_threshold(&path, 8);
        assert_eq!(engine.pending(), 40);

        engine.poll().unwrap();
        assert_eq!(engine.pending(), 8);
        assert!(
            engine.wal().dirty(),
            "un-replayed records must remain in the journal"
        );

        let heads = engine.tables().agg_heads(0).unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].meta.entry_count, 32);
        assert_eq!(heads[0].meta.seq_max, 32);

        // Second simulated crash: drop with the tail still queued.
    }

    let mut engine = open_with_threshold(&path, 100);
    assert_eq!(engine.pending(), 8);
    engine.drain().unwrap();
    assert_eq!(engine.state().memtable().len(), 8);

    for i in 0..40u32 {
        assert_eq!(
            engine.get(format!("key-{i:02}").as_bytes()).unwrap(),
            format!("v{i}").into_bytes(),
            "key-{i:02} lost across the partial-replay flush"
        );
    }

    // Fresh appends continue past the recovered tail, not over it.
    engine.put(b"after", b"x").unwrap();
    assert!(engine.wal().last_lsn() > 40);
}

#[test]
fn test_flushed_tables_survive_reopen_without_replay() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open_with_threshold(&path, 2);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap(); // flush
        assert_eq!(engine.wal().used(), 0);
    }

    let mut engine = open_with_threshold(&path, 2);
    // Nothing to replay: the table carries the data.
    assert_eq!(engine.pending(), 0);
    assert_eq!(engine.tables().agg_heads(0).unwrap().len(), 1);
    assert_eq!(engine.get(b"a").unwrap(), b"1");
    assert_eq!(engine.get(b"b").unwrap(), b"2");
}

#[test]
fn test_replayed_reads_are_no_ops() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open(&path);
        engine.put(b"a", b"1").unwrap();
        // A read journals a get record alongside the set.
        assert_eq!(engine.get(b"a").unwrap(), b"1");
    }

    let mut engine = open(&path);
    // Both records replay; the get replays as a no-op.
    assert_eq!(engine.pending(), 2);
    engine.drain().unwrap();
    assert_eq!(engine.state().memtable().len(), 1);
    assert_eq!(engine.get(b"a").unwrap(), b"1");
}

#[test]
fn test_explicit_checkpoint_forfeits_unflushed_memtable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open(&path);
        engine.put(b"a", b"1").unwrap();
        // An explicit checkpoint truncates the journal past the set
        // without flushing the memtable.
        engine.force_checkpoint().unwrap();
        assert_eq!(engine.wal().used(), 0);
    }

    // After a crash there is nothing to replay and no table: the value is
    // gone. The journal holds records only until a threshold-driven flush
    // or an explicit checkpoint.
    let mut engine = open(&path);
    assert_eq!(engine.pending(), 0);
    assert!(engine.get(b"a").unwrap().is_empty());
}

#[test]
fn test_recovered_engine_continues_lsn_sequence() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.bin");

    {
        let mut engine = open(&path);
        engine.put(b"a", b"1").unwrap();
        engine.put(b"b", b"2").unwrap();
        assert_eq!(engine.wal().last_lsn(), 2);
    }

    let mut engine = open(&path);
    engine.drain().unwrap();
    engine.put(b"c", b"3").unwrap();
    // Fresh appends continue after the recovered counter.
    assert_eq!(engine.wal().last_lsn(), 3);
}
