//! LSM in-memory state: the live memtable, its frozen snapshot, and the
//! flush threshold.
//!
//! The submission loop is the sole mutator. Reads resolve against the live
//! table first, then the frozen snapshot; the on-disk cascade beyond both
//! is the engine's job.

use crate::layout::DEFAULT_MEMTABLE_MAX;
use crate::memtable::{FrozenMemtable, Memtable};

/// Resolution of a key against the in-memory layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// A live value.
    Found(Vec<u8>),

    /// A tombstone shadows any older on-disk value.
    Deleted,

    /// Not present in memory; on-disk tables may still hold it.
    Unknown,
}

/// The engine's volatile LSM state.
#[derive(Debug)]
pub struct LsmState {
    /// Live write buffer.
    memtable: Memtable,

    /// Snapshot being flushed, if any.
    frozen: Option<FrozenMemtable>,

    /// Entry-count threshold that triggers freeze/flush.
    max_size: usize,

    /// Pre-recovery LSN marker; −1 outside of replay.
    recover_flush: i64,
}

impl LsmState {
    /// Fresh state with the given flush threshold.
    pub fn new(max_size: usize) -> Self {
        Self {
            memtable: Memtable::new(),
            frozen: None,
            max_size: max_size.max(1),
            recover_flush: -1,
        }
    }

    /// Stage a live value.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.memtable.insert(key, Some(value));
    }

    /// Stage a tombstone.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.memtable.insert(key, None);
    }

    /// Resolve a key against the live table, then the frozen snapshot.
    pub fn lookup(&self, key: &[u8]) -> Lookup {
        for layer in [self.memtable.get(key), self.frozen.as_ref().and_then(|f| f.get(key))] {
            match layer {
                Some(Some(value)) => return Lookup::Found(value.clone()),
                Some(None) => return Lookup::Deleted,
                None => {}
            }
        }
        Lookup::Unknown
    }

    /// Whether the live table has reached the flush threshold.
    pub fn needs_flush(&self) -> bool {
        self.memtable.len() >= self.max_size
    }

    /// Clone the live table into the frozen slot.
    pub fn freeze(&mut self) {
        self.frozen = Some(self.memtable.freeze());
    }

    /// Clear the live table (after a freeze).
    pub fn clear_live(&mut self) {
        self.memtable.clear();
    }

    /// The frozen snapshot, if a flush is in progress.
    pub fn frozen(&self) -> Option<&FrozenMemtable> {
        self.frozen.as_ref()
    }

    /// Discard the frozen snapshot once its table is durable.
    pub fn drop_frozen(&mut self) {
        self.frozen = None;
    }

    /// Read access to the live table.
    pub fn memtable(&self) -> &Memtable {
        &self.memtable
    }

    /// Pre-recovery LSN marker; −1 outside of replay.
    pub fn recover_flush(&self) -> i64 {
        self.recover_flush
    }

    /// Set the pre-recovery LSN marker.
    pub fn set_recover_flush(&mut self, lsn: i64) {
        self.recover_flush = lsn;
    }
}

impl Default for LsmState {
    fn default() -> Self {
        Self::new(DEFAULT_MEMTABLE_MAX)
    }
}
