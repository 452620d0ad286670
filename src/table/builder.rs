//! Data-block builder — packs prefix-sorted records into sealed blocks.
//!
//! The builder consumes records already sorted by their 16-byte sort-key
//! prefix and produces the data region of a table blob plus the block
//! index describing it. Each data block is exactly one block long: a
//! `count u16` header, `count` records, and zero padding. A record that
//! would not fit the open block seals it and starts a new one — records
//! never straddle block boundaries.

use tracing::trace;

use crate::codec::{Encode, cmp16};
use crate::layout::{
    BLOCK_SIZE, DATA_BLOCK_HEADER_SIZE, DATA_RECORD_HEADER_SIZE, MAX_KEY_SIZE,
};
use crate::table::{IndexEntry, TableError};

/// The composed data region of a table, ready to append after the index.
#[derive(Debug)]
pub(crate) struct BuiltBlocks {
    /// Concatenated, padded data blocks.
    pub data: Vec<u8>,

    /// One index entry per block; offsets relative to the data start.
    pub index: Vec<IndexEntry>,

    /// Total record count.
    pub entry_count: u32,

    /// Smallest sort-key prefix seen.
    pub min_prefix: [u8; 16],

    /// Largest sort-key prefix seen.
    pub max_prefix: [u8; 16],
}

/// Pack `(prefix, key, value)` records — pre-sorted by prefix — into
/// sealed data blocks.
///
/// The records of a nonempty input always produce at least one block; the
/// trailing block is flushed after the last record.
pub(crate) fn build_blocks(
    records: &[([u8; 16], Vec<u8>, Vec<u8>)],
) -> Result<BuiltBlocks, TableError> {
    let mut data = Vec::new();
    let mut index = Vec::new();
    let mut payload: Vec<u8> = Vec::new();
    let mut count: u16 = 0;
    let mut first_key: Option<Vec<u8>> = None;

    let mut min_prefix = [0xFFu8; 16];
    let mut max_prefix = [0u8; 16];

    for (prefix, key, value) in records {
        if key.len() > MAX_KEY_SIZE {
            return Err(TableError::InvalidKeySize(key.len()));
        }
        let record_len = DATA_RECORD_HEADER_SIZE + key.len() + value.len();
        if DATA_BLOCK_HEADER_SIZE + record_len > BLOCK_SIZE {
            // The submission path bounds record sizes; a record that cannot
            // fit a fresh block would compose a broken table.
            return Err(TableError::BrokenTableSize {
                expected: BLOCK_SIZE as u64,
                actual: (DATA_BLOCK_HEADER_SIZE + record_len) as u64,
            });
        }

        if count > 0 && DATA_BLOCK_HEADER_SIZE + payload.len() + record_len > BLOCK_SIZE {
            seal_block(&mut data, &mut index, &mut payload, &mut count, &mut first_key);
        }

        if first_key.is_none() {
            first_key = Some(key.clone());
        }
        (key.len() as u16).encode_to(&mut payload);
        (value.len() as u32).encode_to(&mut payload);
        payload.extend_from_slice(key);
        payload.extend_from_slice(value);
        count += 1;

        if cmp16(prefix, &min_prefix).is_lt() {
            min_prefix = *prefix;
        }
        if cmp16(prefix, &max_prefix).is_gt() {
            max_prefix = *prefix;
        }
    }

    if count > 0 {
        seal_block(&mut data, &mut index, &mut payload, &mut count, &mut first_key);
    }

    trace!(
        blocks = index.len(),
        records = records.len(),
        "built data blocks"
    );
    Ok(BuiltBlocks {
        data,
        index,
        entry_count: records.len() as u32,
        min_prefix,
        max_prefix,
    })
}

/// Seal the open block: prepend the count header, pad to one block, and
/// record its index entry.
fn seal_block(
    data: &mut Vec<u8>,
    index: &mut Vec<IndexEntry>,
    payload: &mut Vec<u8>,
    count: &mut u16,
    first_key: &mut Option<Vec<u8>>,
) {
    let off = data.len() as u64;
    count.encode_to(data);
    data.append(payload);
    data.resize(off as usize + BLOCK_SIZE, 0);

    index.push(IndexEntry {
        first_key: first_key.take().unwrap_or_default(),
        off,
        len: BLOCK_SIZE as u32,
    });
    *count = 0;
}
