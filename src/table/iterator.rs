//! Table reader — a restartable sequence over one sealed table.
//!
//! The iterator walks the data blocks of a [`TableHead`] in index order,
//! loading one block at a time into an internal buffer and decoding its
//! count-prefixed records. Yielded keys and values are views over the
//! current block buffer: callers must copy anything that needs to outlive
//! the next [`TableIterator::next`] call. Restart by constructing a fresh
//! iterator from the same head.

use std::sync::Arc;

use crate::codec::{CodecError, Decode};
use crate::io::BlockFile;
use crate::layout::DATA_RECORD_HEADER_SIZE;
use crate::table::{IndexEntry, TableError, TableHead};

/// Forward reader over the records of a single table blob.
#[derive(Debug)]
pub struct TableIterator {
    file: Arc<BlockFile>,

    /// Absolute-offset block index, cloned from the head.
    index: Vec<IndexEntry>,

    /// Current block bytes.
    block: Vec<u8>,

    /// Next index entry to load.
    next_block: usize,

    /// Records left in the current block.
    remaining: u16,

    /// Byte cursor inside the current block.
    cursor: usize,
}

impl TableIterator {
    /// A reader positioned before the first record of the table.
    pub fn new(file: Arc<BlockFile>, head: &TableHead) -> Self {
        Self {
            file,
            index: head.index.clone(),
            block: Vec::new(),
            next_block: 0,
            remaining: 0,
            cursor: 0,
        }
    }

    /// The next `(key, value)` pair, or `None` past the last record.
    ///
    /// The returned slices borrow the internal block buffer and are
    /// invalidated by the next call.
    pub fn next(&mut self) -> Result<Option<(&[u8], &[u8])>, TableError> {
        while self.remaining == 0 {
            if self.next_block >= self.index.len() {
                return Ok(None);
            }
            let entry = &self.index[self.next_block];
            self.block = self
                .file
                .read_exact_at(entry.off, entry.len as usize)?;
            let (count, n) = u16::decode_from(&self.block)?;
            self.remaining = count;
            self.cursor = n;
            self.next_block += 1;
        }

        let (key_len, n) = u16::decode_from(&self.block[self.cursor..])?;
        let (value_len, m) = u32::decode_from(&self.block[self.cursor + n..])?;
        debug_assert_eq!(n + m, DATA_RECORD_HEADER_SIZE);

        let key_start = self.cursor + DATA_RECORD_HEADER_SIZE;
        let value_start = key_start + key_len as usize;
        let value_end = value_start + value_len as usize;
        if value_end > self.block.len() {
            return Err(TableError::Codec(CodecError::UnexpectedEof {
                needed: value_end - self.cursor,
                available: self.block.len() - self.cursor,
            }));
        }

        self.cursor = value_end;
        self.remaining -= 1;
        Ok(Some((
            &self.block[key_start..value_start],
            &self.block[value_start..value_end],
        )))
    }

    /// Linear point lookup over the remaining records.
    ///
    /// Returns the value of the first record whose raw key matches, copied
    /// out of the block buffer.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        while let Some((k, v)) = self.next()? {
            if k == key {
                return Ok(Some(v.to_vec()));
            }
        }
        Ok(None)
    }
}
