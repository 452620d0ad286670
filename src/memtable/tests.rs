use crate::memtable::Memtable;

#[test]
fn test_insert_get_overwrite() {
    let mut mem = Memtable::new();
    assert!(mem.is_empty());

    mem.insert(b"a".to_vec(), Some(b"1".to_vec()));
    assert_eq!(mem.get(b"a"), Some(&Some(b"1".to_vec())));
    assert_eq!(mem.len(), 1);

    mem.insert(b"a".to_vec(), Some(b"2".to_vec()));
    assert_eq!(mem.get(b"a"), Some(&Some(b"2".to_vec())));
    assert_eq!(mem.len(), 1);

    assert_eq!(mem.get(b"missing"), None);
}

#[test]
fn test_tombstone_is_present_but_none() {
    let mut mem = Memtable::new();
    mem.insert(b"a".to_vec(), Some(b"1".to_vec()));
    mem.insert(b"a".to_vec(), None);

    assert!(mem.contains(b"a"));
    assert_eq!(mem.get(b"a"), Some(&None));
    // Tombstones count toward the flush threshold.
    assert_eq!(mem.len(), 1);
}

#[test]
fn test_iteration_is_key_ordered() {
    let mut mem = Memtable::new();
    mem.insert(b"c".to_vec(), Some(b"3".to_vec()));
    mem.insert(b"a".to_vec(), Some(b"1".to_vec()));
    mem.insert(b"b".to_vec(), None);

    let keys: Vec<_> = mem.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_freeze_is_an_independent_snapshot() {
    let mut mem = Memtable::new();
    mem.insert(b"a".to_vec(), Some(b"1".to_vec()));

    let frozen = mem.freeze();
    mem.insert(b"b".to_vec(), Some(b"2".to_vec()));
    mem.clear();

    // The snapshot is unaffected by later mutation of the live table.
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen.get(b"a"), Some(&Some(b"1".to_vec())));
    assert_eq!(frozen.get(b"b"), None);
    assert!(mem.is_empty());
}

#[test]
fn test_clear_resets_length() {
    let mut mem = Memtable::new();
    for i in 0..10u8 {
        mem.insert(vec![i], Some(vec![i]));
    }
    assert_eq!(mem.len(), 10);
    mem.clear();
    assert!(mem.is_empty());
}
