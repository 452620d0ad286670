//! Sorted Table Module
//!
//! This module implements **immutable**, sorted, on-disk tables and the
//! [`TableStore`] that admits them into the manifest. A table blob is a
//! contiguous byte range inside the backing file's preallocated table
//! region, produced by flushing one frozen memtable snapshot.
//!
//! # On-disk blob layout
//!
//! ```text
//! [meta page (one block)]
//! [block index, padded to 8-byte alignment]
//! [data block][data block]…          (each exactly one block)
//! ```
//!
//! - **Meta page** — table id, level, LSN range, sizes, index location, and
//!   the min/max sort-key prefixes, plus the extent list covering the blob.
//! - **Block index** — one `[first_key_len u16][off u64][len u32][key…]`
//!   entry per data block; offsets are relative to the data-region start on
//!   disk and absolutized on load.
//! - **Data block** — `[count u16]` followed by `count` records of
//!   `[klen u16][vlen u32][key…][value…]`, zero-padded to the block size. A
//!   record never straddles a block boundary.
//!
//! Records are sorted by the 16-byte sort-key prefix of their raw key;
//! records whose prefixes tie keep their input order (the flush sort is
//! stable). A tombstone is written as a record with an empty value.
//!
//! # Admission protocol
//!
//! [`TableStore::flush_snapshot`] reserves space at the table tail,
//! composes the full blob in memory, writes it with a single positioned
//! write, fsyncs, and only then rewrites the manifest page — a crash
//! before the manifest commit leaves the previous manifest intact and the
//! journal still holding the records.
//!
//! # Concurrency model
//!
//! Sealed tables never mutate, so readers ([`iterator::TableIterator`])
//! may run concurrently with the submission loop over already-admitted
//! blobs.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{CodecError, Decode, Encode, cmp16, sort_key16};
use crate::io::{BlockFile, FileError, align_block, align_up};
use crate::layout::{BLOCK_SIZE, FORMATTED_FILE_SIZE, MANIFEST_OFF, RECORD_ALIGN, TABLE_REGION_OFF};
use crate::manifest::{
    MANIFEST_CAP, ManifestEntry, ManifestError, ManifestPage, decode_page, encode_page,
};
use crate::memtable::FrozenMemtable;

/// Fixed-size portion of the meta page preceding the id and extent bytes.
pub const META_FIXED_SIZE: usize = 84;

/// Encoded size of one extent record.
pub const EXTENT_SIZE: usize = 12;

/// Fixed-size portion of one block-index entry.
pub const INDEX_ENTRY_FIXED_SIZE: usize = 14;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// A key exceeds the u16 length field of data-block records.
    #[error("invalid key size: {0} bytes")]
    InvalidKeySize(usize),

    /// The meta page claims more id bytes than it holds.
    #[error("truncated table id")]
    TruncatedId,

    /// The meta page claims more extents than it holds.
    #[error("truncated extent list")]
    TruncatedExtents,

    /// The manifest page has no room for another table.
    #[error("manifest full")]
    ManifestFull,

    /// The preallocated table region cannot fit the requested blob.
    #[error("needs compaction: {needed} bytes requested, {left} left")]
    NeedsCompaction {
        /// Bytes the new table requires.
        needed: u64,
        /// Bytes left between the table tail and the file end.
        left: u64,
    },

    /// The composed blob length differs from the reserved length.
    #[error("broken table size: reserved {expected}, composed {actual}")]
    BrokenTableSize {
        /// Reserved blob length.
        expected: u64,
        /// Composed blob length.
        actual: u64,
    },

    /// A manifest index past the current entry count.
    #[error("manifest entry {0} does not exist")]
    EntryNotExist(usize),

    /// Manifest codec or admission failure.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Underlying block I/O failure.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Encoding / decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

// ------------------------------------------------------------------------------------------------
// Table meta page
// ------------------------------------------------------------------------------------------------

/// One contiguous run of blocks backing a table blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableExtent {
    /// First block number of the run.
    pub start_block: u64,

    /// Number of blocks in the run.
    pub blocks: u32,
}

/// The decoded meta page of a table blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Human-readable table identifier.
    pub id: Vec<u8>,

    /// LSM level (flushes produce level 0).
    pub level: u16,

    /// Smallest LSN the table covers.
    pub seq_min: u64,

    /// Largest LSN the table covers.
    pub seq_max: u64,

    /// Total blob length in bytes.
    pub size_bytes: u64,

    /// Block size the table was written with.
    pub block_size: u32,

    /// Absolute offset of the block index.
    pub index_off: u64,

    /// Unpadded index length in bytes.
    pub index_len: u32,

    /// Number of records across all data blocks.
    pub entry_count: u32,

    /// Smallest sort-key prefix in the table.
    pub min_key: [u8; 16],

    /// Largest sort-key prefix in the table.
    pub max_key: [u8; 16],

    /// Extents covering the blob.
    pub extents: Vec<TableExtent>,
}

impl TableMeta {
    /// Encode into a full zero-padded meta page.
    pub fn encode_page(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_SIZE);
        (self.id.len() as u16).encode_to(&mut buf);
        self.level.encode_to(&mut buf);
        self.seq_min.encode_to(&mut buf);
        self.seq_max.encode_to(&mut buf);
        self.size_bytes.encode_to(&mut buf);
        self.block_size.encode_to(&mut buf);
        self.index_off.encode_to(&mut buf);
        self.index_len.encode_to(&mut buf);
        self.entry_count.encode_to(&mut buf);
        self.min_key.encode_to(&mut buf);
        self.max_key.encode_to(&mut buf);
        (self.extents.len() as u32).encode_to(&mut buf);
        debug_assert_eq!(buf.len(), META_FIXED_SIZE);
        buf.extend_from_slice(&self.id);
        for extent in &self.extents {
            extent.start_block.encode_to(&mut buf);
            extent.blocks.encode_to(&mut buf);
        }
        debug_assert!(buf.len() <= BLOCK_SIZE);
        buf.resize(BLOCK_SIZE, 0);
        buf
    }

    /// Decode from the beginning of a meta page.
    pub fn decode(buf: &[u8]) -> Result<Self, TableError> {
        let mut off = 0;
        let (id_len, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (level, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (seq_min, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (seq_max, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (size_bytes, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (block_size, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (index_off, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (index_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (entry_count, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (min_key, n) = <[u8; 16]>::decode_from(&buf[off..])?;
        off += n;
        let (max_key, n) = <[u8; 16]>::decode_from(&buf[off..])?;
        off += n;
        let (extent_count, n) = u32::decode_from(&buf[off..])?;
        off += n;

        if off + id_len as usize > buf.len() {
            return Err(TableError::TruncatedId);
        }
        let id = buf[off..off + id_len as usize].to_vec();
        off += id_len as usize;

        if off + extent_count as usize * EXTENT_SIZE > buf.len() {
            return Err(TableError::TruncatedExtents);
        }
        let mut extents = Vec::with_capacity(extent_count as usize);
        for _ in 0..extent_count {
            let (start_block, n) = u64::decode_from(&buf[off..])?;
            off += n;
            let (blocks, n) = u32::decode_from(&buf[off..])?;
            off += n;
            extents.push(TableExtent {
                start_block,
                blocks,
            });
        }

        Ok(Self {
            id,
            level,
            seq_min,
            seq_max,
            size_bytes,
            block_size,
            index_off,
            index_len,
            entry_count,
            min_key,
            max_key,
            extents,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Block index
// ------------------------------------------------------------------------------------------------

/// One block-index entry: the first key of a data block plus its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Raw first key of the referenced block.
    pub first_key: Vec<u8>,

    /// Block offset — relative to the data-region start on disk, absolute
    /// inside a loaded [`TableHead`].
    pub off: u64,

    /// Padded block length in bytes.
    pub len: u32,
}

/// Encode the index; returns the 8-byte-aligned buffer and the unpadded
/// length recorded in the meta page.
pub fn encode_index(entries: &[IndexEntry]) -> (Vec<u8>, u32) {
    let mut buf = Vec::new();
    for entry in entries {
        (entry.first_key.len() as u16).encode_to(&mut buf);
        entry.off.encode_to(&mut buf);
        entry.len.encode_to(&mut buf);
        buf.extend_from_slice(&entry.first_key);
    }
    let unpadded = buf.len() as u32;
    let padded = align_up(unpadded as u64, RECORD_ALIGN) as usize;
    buf.resize(padded, 0);
    (buf, unpadded)
}

/// Decode `index_len` unpadded bytes of index entries.
///
/// Tolerates a padded tail: a truncated trailing entry ends the decode.
pub fn decode_index(buf: &[u8], index_len: u32) -> Result<Vec<IndexEntry>, TableError> {
    let limit = (index_len as usize).min(buf.len());
    let mut entries = Vec::new();
    let mut off = 0;
    while off + INDEX_ENTRY_FIXED_SIZE <= limit {
        let (key_len, n) = u16::decode_from(&buf[off..])?;
        let mut cur = off + n;
        let (block_off, n) = u64::decode_from(&buf[cur..])?;
        cur += n;
        let (block_len, n) = u32::decode_from(&buf[cur..])?;
        cur += n;
        if cur + key_len as usize > limit {
            break;
        }
        let first_key = buf[cur..cur + key_len as usize].to_vec();
        cur += key_len as usize;
        entries.push(IndexEntry {
            first_key,
            off: block_off,
            len: block_len,
        });
        off = cur;
    }
    Ok(entries)
}

/// A loaded table head: decoded meta plus the index with absolute offsets.
#[derive(Debug, Clone)]
pub struct TableHead {
    /// Decoded meta page.
    pub meta: TableMeta,

    /// Block index; entry offsets are absolute file offsets.
    pub index: Vec<IndexEntry>,
}

// ------------------------------------------------------------------------------------------------
// TableStore
// ------------------------------------------------------------------------------------------------

/// Owner of the in-memory manifest page and the table-region tail.
///
/// All table admission goes through this store; it is mutated only by the
/// submission loop.
#[derive(Debug)]
pub struct TableStore {
    file: Arc<BlockFile>,

    /// In-memory manifest, persisted on every admission.
    page: ManifestPage,

    /// Absolute offset of the next free byte for a new blob.
    table_tail: u64,

    /// Loaded heads memoized by meta offset.
    heads: HashMap<u64, TableHead>,
}

impl TableStore {
    /// A store over a file that still needs [`Self::format_initial`] or
    /// [`Self::load`].
    pub fn new(file: Arc<BlockFile>) -> Self {
        Self {
            file,
            page: ManifestPage::empty(),
            table_tail: TABLE_REGION_OFF,
            heads: HashMap::new(),
        }
    }

    /// Write an empty manifest page, preallocate the table region, fsync.
    pub fn format_initial(&mut self, version: u16, epoch: u64) -> Result<(), TableError> {
        self.page = ManifestPage {
            version,
            epoch,
            entries: Vec::new(),
        };
        self.table_tail = TABLE_REGION_OFF;
        self.file.ensure_size(FORMATTED_FILE_SIZE)?;
        self.file.write_at(MANIFEST_OFF, &encode_page(&self.page)?)?;
        self.file.sync()?;
        info!(version, epoch, "formatted initial manifest");
        Ok(())
    }

    /// Decode the on-disk manifest page and recompute the table tail.
    pub fn load(&mut self) -> Result<(), TableError> {
        let buf = self.file.read_exact_at(MANIFEST_OFF, BLOCK_SIZE)?;
        self.page = decode_page(&buf)?;
        self.table_tail = TABLE_REGION_OFF
            + self
                .page
                .entries
                .iter()
                .map(|e| align_block(e.meta_len as u64))
                .sum::<u64>();
        info!(
            tables = self.page.entries.len(),
            table_tail = self.table_tail,
            "loaded manifest"
        );
        Ok(())
    }

    /// Admitted entries, in admission order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.page.entries
    }

    /// Next free byte for a new blob.
    pub fn table_tail(&self) -> u64 {
        self.table_tail
    }

    /// Reserve space for a new table and admit its manifest entry
    /// in memory.
    ///
    /// Chooses `meta_off` at the current table tail and advances the tail
    /// to the next block boundary past the blob. The entry becomes durable
    /// with the next [`Self::commit_manifest`], which callers run after the
    /// blob itself is on disk.
    pub fn request_table(
        &mut self,
        level: u16,
        size: u64,
        min_prefix: &[u8],
        max_prefix: &[u8],
    ) -> Result<ManifestEntry, TableError> {
        let left = self.file.size()?.saturating_sub(self.table_tail);
        if size > left {
            return Err(TableError::NeedsCompaction { needed: size, left });
        }
        if self.page.entries.len() >= MANIFEST_CAP {
            return Err(TableError::ManifestFull);
        }

        let entry = ManifestEntry::new(level, self.table_tail, size as u32, min_prefix, max_prefix)?;
        self.page.entries.push(entry.clone());
        self.table_tail = align_block(entry.meta_off + size);
        Ok(entry)
    }

    /// Rewrite the whole manifest page at its fixed offset and fsync.
    ///
    /// This is the commit point that makes admitted tables visible.
    pub fn commit_manifest(&mut self) -> Result<(), TableError> {
        self.page.epoch += 1;
        self.file.write_at(MANIFEST_OFF, &encode_page(&self.page)?)?;
        self.file.sync()?;
        Ok(())
    }

    /// Flush a frozen memtable snapshot into a new level-0 table.
    ///
    /// Records are sorted stably by sort-key prefix, packed into data
    /// blocks, and written as one contiguous blob (meta ‖ index ‖ data)
    /// with a single positioned write and fsync, followed by the manifest
    /// commit. Returns the admitted entry, or `None` for an empty
    /// snapshot.
    pub fn flush_snapshot(
        &mut self,
        snapshot: &FrozenMemtable,
        seq_min: u64,
        seq_max: u64,
    ) -> Result<Option<ManifestEntry>, TableError> {
        if snapshot.is_empty() {
            warn!("flush of an empty snapshot skipped");
            return Ok(None);
        }

        // Materialize and stably sort by sort-key prefix; tombstones become
        // empty-value records.
        let mut records: Vec<([u8; 16], Vec<u8>, Vec<u8>)> = snapshot
            .iter()
            .map(|(key, value)| {
                (
                    sort_key16(key),
                    key.clone(),
                    value.clone().unwrap_or_default(),
                )
            })
            .collect();
        records.sort_by(|a, b| cmp16(&a.0, &b.0));

        let built = builder::build_blocks(&records)?;
        let (index_buf, index_len) = encode_index(&built.index);
        let size_bytes = (BLOCK_SIZE + index_buf.len() + built.data.len()) as u64;

        let entry = self.request_table(0, size_bytes, &built.min_prefix, &built.max_prefix)?;
        let meta_off = entry.meta_off;

        let meta = TableMeta {
            id: format!("t{:06}", self.page.entries.len() - 1).into_bytes(),
            level: 0,
            seq_min,
            seq_max,
            size_bytes,
            block_size: BLOCK_SIZE as u32,
            index_off: meta_off + BLOCK_SIZE as u64,
            index_len,
            entry_count: built.entry_count,
            min_key: built.min_prefix,
            max_key: built.max_prefix,
            extents: vec![TableExtent {
                start_block: meta_off / BLOCK_SIZE as u64,
                blocks: (align_block(size_bytes) / BLOCK_SIZE as u64) as u32,
            }],
        };

        let mut blob = meta.encode_page();
        blob.extend_from_slice(&index_buf);
        blob.extend_from_slice(&built.data);
        if blob.len() as u64 != size_bytes {
            return Err(TableError::BrokenTableSize {
                expected: size_bytes,
                actual: blob.len() as u64,
            });
        }

        self.file.write_at(meta_off, &blob)?;
        self.file.sync()?;
        self.commit_manifest()?;

        // The freshly written head is already known; memoize it.
        let data_start = meta.index_off + align_up(index_len as u64, RECORD_ALIGN);
        let index = built
            .index
            .iter()
            .map(|e| IndexEntry {
                first_key: e.first_key.clone(),
                off: data_start + e.off,
                len: e.len,
            })
            .collect();
        self.heads.insert(meta_off, TableHead { meta, index });

        info!(
            meta_off,
            size_bytes,
            entries = built.entry_count,
            "flushed snapshot to level-0 table"
        );
        Ok(Some(entry))
    }

    /// Load (or fetch memoized) the head of the `i`-th manifest entry:
    /// decoded meta plus the block index with absolute offsets.
    pub fn read_head(&mut self, i: usize) -> Result<TableHead, TableError> {
        let Some(entry) = self.page.entries.get(i) else {
            return Err(TableError::EntryNotExist(i));
        };
        if let Some(head) = self.heads.get(&entry.meta_off) {
            return Ok(head.clone());
        }

        let meta_buf = self.file.read_exact_at(entry.meta_off, BLOCK_SIZE)?;
        let meta = TableMeta::decode(&meta_buf)?;

        let padded_len = align_up(meta.index_len as u64, RECORD_ALIGN) as usize;
        let index_buf = self.file.read_exact_at(meta.index_off, padded_len)?;
        let data_start = meta.index_off + padded_len as u64;
        let index = decode_index(&index_buf, meta.index_len)?
            .into_iter()
            .map(|e| IndexEntry {
                off: data_start + e.off,
                ..e
            })
            .collect();

        let head = TableHead { meta, index };
        self.heads.insert(entry.meta_off, head.clone());
        Ok(head)
    }

    /// Heads of every admitted table on the given level, in admission
    /// order.
    pub fn agg_heads(&mut self, level: u16) -> Result<Vec<TableHead>, TableError> {
        let mut heads = Vec::new();
        for i in 0..self.page.entries.len() {
            let head = self.read_head(i)?;
            if head.meta.level == level {
                heads.push(head);
            }
        }
        Ok(heads)
    }

    /// Total record count across all tables of a level.
    pub fn level_size(&mut self, level: u16) -> Result<u64, TableError> {
        Ok(self
            .agg_heads(level)?
            .iter()
            .map(|h| h.meta.entry_count as u64)
            .sum())
    }

    /// Largest `seq_max` across all admitted tables (0 when none).
    pub fn max_seq(&mut self) -> Result<u64, TableError> {
        let mut max = 0;
        for i in 0..self.page.entries.len() {
            max = max.max(self.read_head(i)?.meta.seq_max);
        }
        Ok(max)
    }
}
