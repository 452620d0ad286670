//! Compiled-in file-layout constants.
//!
//! Every page-level structure in the database is sized and placed in terms of
//! the constants below. They are process-wide and immutable; changing any of
//! them is an on-disk format change.

/// On-disk unit of alignment. All page-level structures are exactly this
/// many bytes and the journal region is a whole multiple of it.
pub const BLOCK_SIZE: usize = 4096;

/// Absolute offset of superblock slot A.
pub const SUPER_A_OFF: u64 = 0;

/// Absolute offset of superblock slot B.
pub const SUPER_B_OFF: u64 = BLOCK_SIZE as u64;

/// Absolute offset of the first journal byte.
pub const JOURNAL_OFF: u64 = 2 * BLOCK_SIZE as u64;

/// Journal size in blocks.
pub const JOURNAL_BLOCKS: u64 = 256;

/// Journal size in bytes.
pub const JOURNAL_SIZE: u64 = JOURNAL_BLOCKS * BLOCK_SIZE as u64;

/// Absolute offset one past the last journal byte.
pub const JOURNAL_END: u64 = JOURNAL_OFF + JOURNAL_SIZE;

/// Absolute offset of the manifest page.
pub const MANIFEST_OFF: u64 = JOURNAL_END;

/// Absolute offset of the first table blob.
pub const TABLE_REGION_OFF: u64 = MANIFEST_OFF + BLOCK_SIZE as u64;

/// Preallocated table-region size in blocks (16 MiB). Table admission is
/// checked against the preallocated file size; exhausting the region
/// surfaces a needs-compaction error.
pub const TABLE_REGION_BLOCKS: u64 = 4096;

/// Preallocated table-region size in bytes.
pub const TABLE_REGION_SIZE: u64 = TABLE_REGION_BLOCKS * BLOCK_SIZE as u64;

/// Total preallocated file size at format time.
pub const FORMATTED_FILE_SIZE: u64 = TABLE_REGION_OFF + TABLE_REGION_SIZE;

/// Journal records are padded to this alignment.
pub const RECORD_ALIGN: u64 = 8;

/// Maximum operations drained from the submission queue per loop iteration.
pub const MAX_INFLIGHT: usize = 32;

/// Default memtable entry-count threshold before freeze/flush.
pub const DEFAULT_MEMTABLE_MAX: usize = 1024;

/// Data-block record header: klen (u16) + vlen (u32).
pub const DATA_RECORD_HEADER_SIZE: usize = 6;

/// Data-block header: record count (u16).
pub const DATA_BLOCK_HEADER_SIZE: usize = 2;

/// Keys are bounded by the u16 klen field of data-block records.
pub const MAX_KEY_SIZE: usize = u16::MAX as usize;

/// A data-block record, header included, must fit a single block.
pub const MAX_BLOCK_RECORD_SIZE: usize = BLOCK_SIZE - DATA_BLOCK_HEADER_SIZE;
