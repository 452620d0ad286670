//! # Memtable Module
//!
//! The in-memory ordered write buffer of the storage engine.
//!
//! ## Design Invariants
//!
//! - Keys map to at most one live value; later insertions overwrite.
//! - Deletes are represented as tombstones (`None`), not physical removal,
//!   so a flushed table can shadow older live values for the same key.
//! - Insertion order is irrelevant for flushing: records are sorted by
//!   sort-key prefix immediately before being written out.
//!
//! ## Frozen Memtable
//!
//! [`Memtable::freeze`] clones the live map into a [`FrozenMemtable`],
//! which exposes no mutating operations — the type system enforces the
//! read-only contract from the moment the snapshot is created until it is
//! discarded. The submission loop clears the live table after freezing.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use tracing::trace;

/// A stored value: `None` is a tombstone left by a delete.
pub type MemValue = Option<Vec<u8>>;

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// The mutable, in-memory write buffer, ordered by raw key bytes.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, MemValue>,
}

impl Memtable {
    /// An empty memtable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key. A `None` value records a tombstone.
    pub fn insert(&mut self, key: Vec<u8>, value: MemValue) {
        trace!(
            key_len = key.len(),
            tombstone = value.is_none(),
            "memtable insert"
        );
        self.map.insert(key, value);
    }

    /// Look up a key. `Some(None)` means the key was deleted here.
    pub fn get(&self, key: &[u8]) -> Option<&MemValue> {
        self.map.get(key)
    }

    /// Whether a key (live or tombstoned) is present.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Number of staged entries, tombstones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no entries are staged.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all staged entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Ordered traversal over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &MemValue)> {
        self.map.iter()
    }

    /// Clone the live contents into a read-only snapshot.
    pub fn freeze(&self) -> FrozenMemtable {
        FrozenMemtable {
            map: self.map.clone(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FrozenMemtable
// ------------------------------------------------------------------------------------------------

/// An immutable snapshot of a memtable, alive from freeze until the flush
/// that persists it completes.
#[derive(Debug)]
pub struct FrozenMemtable {
    map: BTreeMap<Vec<u8>, MemValue>,
}

impl FrozenMemtable {
    /// Look up a key. `Some(None)` means the key was deleted here.
    pub fn get(&self, key: &[u8]) -> Option<&MemValue> {
        self.map.get(key)
    }

    /// Number of snapshot entries, tombstones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ordered traversal over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &MemValue)> {
        self.map.iter()
    }
}
