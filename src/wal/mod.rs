//! Ring-shaped Write-Ahead Journal.
//!
//! The journal is a fixed-size ring of `J` bytes living inside the backing
//! file at `[2B, 2B + J)`. Two pointers track the ring: `head` (oldest live
//! byte) and `tail` (next write position). Appends batch multiple records,
//! fsync exactly once per batch, and assign strictly monotonic LSNs.
//! Truncation happens only through [`RingWal::checkpoint`], which advances
//! the head past a given LSN and publishes the new pointers via the
//! superblock.
//!
//! # On-disk record layout
//!
//! ```text
//! [lsn u64][op u8][klen u32][vlen u32][key…][value…][pad to 8]
//! ```
//!
//! The 17-byte header is followed by the key and value bytes; the whole
//! record is padded up to 8-byte alignment. Opcode 0 is the PAD wrap
//! marker: written at the tail when a batch would cross the ring end, it
//! copies the last used LSN (consuming none) and covers the entire
//! remainder up to the ring end. A remainder too short for a header is
//! zero-filled and reads back as a truncated header.
//!
//! # Scanning
//!
//! [`RingWal::scan`] decodes records from an absolute offset and stops at a
//! PAD marker or a truncated header/body — both mean "end of this
//! segment". The scanner does not itself wrap: the boot-time caller scans
//! `head..jEnd` and then `jStart..tail` when the ring is wrapped
//! (`head > tail`). [`RingWal::recover_scan`] does exactly that and also
//! reinstates the in-memory LSN→offset map so that post-recovery
//! truncation works.
//!
//! # Guarantees
//!
//! - **One fsync per batch** — issued after the last record write and
//!   before any in-memory pointer moves.
//! - **Failed appends mutate nothing** — the free-space check runs before
//!   the first write; a `Full` append leaves head, tail, the LSN counter
//!   and the offset map untouched.
//! - **Monotonic LSNs** — assigned in submission order within a batch,
//!   starting from the counter restored out of the superblock.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::codec::{CodecError, Decode, Encode};
use crate::io::{BlockFile, FileError, align_up};
use crate::layout::{JOURNAL_END, JOURNAL_OFF, JOURNAL_SIZE, RECORD_ALIGN};
use crate::superblock::{CheckpointUpdate, Superblock, SuperblockError, SuperblockManager};

/// Fixed journal record header size: lsn (8) + op (1) + klen (4) + vlen (4).
pub const RECORD_HEADER_SIZE: usize = 17;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by journal operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// The batch (plus any wrap padding) does not fit the free ring space.
    #[error("journal full: need {needed} bytes, {free} free")]
    Full {
        /// Bytes the batch requires, wrap padding included.
        needed: u64,
        /// Free ring bytes at the time of the append.
        free: u64,
    },

    /// A checkpoint targeted an LSN absent from the offset map.
    #[error("LSN {0} not found in journal offset map")]
    LsnNotFound(u64),

    /// Underlying block I/O failure.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Superblock checkpoint failure while truncating.
    #[error("superblock error: {0}")]
    Superblock(#[from] SuperblockError),

    /// Encoding / decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

// ------------------------------------------------------------------------------------------------
// Operation codes
// ------------------------------------------------------------------------------------------------

/// Journal record opcodes.
///
/// `Pad` is reserved for the wrap marker and never admissible as a user
/// operation. Only `Set` and `Del` are materially replayable; `Get` and
/// `Check` are journaled alongside them and replayed as explicit no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    /// Wrap marker; consumes no LSN.
    Pad = 0,
    /// Insert or update a key.
    Set = 1,
    /// Delete a key (tombstone insertion).
    Del = 2,
    /// Non-durable point read.
    Get = 3,
    /// Force a journal checkpoint.
    Check = 4,
}

impl OpKind {
    /// Decode a wire opcode byte.
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(OpKind::Pad),
            1 => Some(OpKind::Set),
            2 => Some(OpKind::Del),
            3 => Some(OpKind::Get),
            4 => Some(OpKind::Check),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Records
// ------------------------------------------------------------------------------------------------

/// One decoded journal record, as yielded by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Sequence number assigned at append time.
    pub lsn: u64,

    /// Operation the record journals.
    pub op: OpKind,

    /// Raw key bytes.
    pub key: Vec<u8>,

    /// Raw value bytes (empty for ops without a value).
    pub value: Vec<u8>,
}

/// Encoded size of a record, padding included.
fn record_size(key_len: usize, value_len: usize) -> u64 {
    align_up(
        (RECORD_HEADER_SIZE + key_len + value_len) as u64,
        RECORD_ALIGN,
    )
}

/// Encode one record into its padded wire form.
fn encode_record(lsn: u64, op: OpKind, key: &[u8], value: &[u8]) -> Vec<u8> {
    let padded = record_size(key.len(), value.len()) as usize;
    let mut buf = Vec::with_capacity(padded);
    lsn.encode_to(&mut buf);
    (op as u8).encode_to(&mut buf);
    (key.len() as u32).encode_to(&mut buf);
    (value.len() as u32).encode_to(&mut buf);
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf.resize(padded, 0);
    buf
}

/// Outcome of parsing one record at a buffer offset.
enum Parsed {
    /// A live record plus its padded on-disk length.
    Record(WalRecord, usize),
    /// A PAD wrap marker; the rest of the segment is padding.
    Pad,
    /// Truncated header or body; end of the segment.
    End,
}

/// Parse the record starting at `buf[off..]`.
fn parse_record(buf: &[u8], off: usize) -> Result<Parsed, WalError> {
    if off + RECORD_HEADER_SIZE > buf.len() {
        return Ok(Parsed::End);
    }
    let mut cur = off;
    let (lsn, n) = u64::decode_from(&buf[cur..])?;
    cur += n;
    let (op_byte, n) = u8::decode_from(&buf[cur..])?;
    cur += n;
    let (klen, n) = u32::decode_from(&buf[cur..])?;
    cur += n;
    let (vlen, _) = u32::decode_from(&buf[cur..])?;

    let Some(op) = OpKind::from_u8(op_byte) else {
        // Garbage opcode: stale or torn bytes, treated as end-of-log.
        warn!(offset = off, op = op_byte, "unknown opcode during scan");
        return Ok(Parsed::End);
    };
    if op == OpKind::Pad {
        return Ok(Parsed::Pad);
    }

    let body = RECORD_HEADER_SIZE + klen as usize + vlen as usize;
    if off + body > buf.len() {
        return Ok(Parsed::End);
    }
    let key_start = off + RECORD_HEADER_SIZE;
    let val_start = key_start + klen as usize;
    let record = WalRecord {
        lsn,
        op,
        key: buf[key_start..val_start].to_vec(),
        value: buf[val_start..val_start + vlen as usize].to_vec(),
    };
    Ok(Parsed::Record(
        record,
        record_size(klen as usize, vlen as usize) as usize,
    ))
}

// ------------------------------------------------------------------------------------------------
// RingWal
// ------------------------------------------------------------------------------------------------

/// The ring journal: pointers, LSN counter, and the LSN→offset map that
/// backs checkpoint truncation.
#[derive(Debug)]
pub struct RingWal {
    file: Arc<BlockFile>,

    /// First byte of the ring (inclusive).
    j_start: u64,

    /// One past the last byte of the ring.
    j_end: u64,

    /// Oldest live byte.
    head: u64,

    /// Next write position.
    tail: u64,

    /// Last assigned LSN; 0 before any record exists.
    last_lsn: u64,

    /// LSN → normalized absolute post-record offset. Pruned on checkpoint.
    offsets: BTreeMap<u64, u64>,
}

impl RingWal {
    /// A fresh, empty journal over a newly formatted file.
    pub fn new(file: Arc<BlockFile>) -> Self {
        Self {
            file,
            j_start: JOURNAL_OFF,
            j_end: JOURNAL_END,
            head: JOURNAL_OFF,
            tail: JOURNAL_OFF,
            last_lsn: 0,
            offsets: BTreeMap::new(),
        }
    }

    /// Restore pointers and the LSN counter from a loaded superblock.
    pub fn from_superblock(file: Arc<BlockFile>, sb: &Superblock) -> Self {
        Self {
            file,
            j_start: JOURNAL_OFF,
            j_end: JOURNAL_END,
            head: sb.j_head,
            tail: sb.j_tail,
            last_lsn: sb.checkpoint_lsn,
            offsets: BTreeMap::new(),
        }
    }

    /// Oldest live byte offset.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Next write position.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Last assigned LSN (0 before any record).
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    /// Live ring bytes: `(tail − head) mod J`.
    pub fn used(&self) -> u64 {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            (self.j_end - self.head) + (self.tail - self.j_start)
        }
    }

    /// Free ring bytes.
    pub fn free(&self) -> u64 {
        JOURNAL_SIZE - self.used()
    }

    /// Whether any live record remains in the ring.
    pub fn dirty(&self) -> bool {
        self.used() > 0
    }

    /// Append a batch of operations as consecutive records.
    ///
    /// Assigns LSNs starting from `last_lsn + 1`, writes a PAD wrap marker
    /// first when the batch would cross the ring end, fsyncs exactly once
    /// after the last record write, then commits tail, LSN counter and the
    /// offset map in memory. Returns the last assigned LSN.
    ///
    /// Fails with [`WalError::Full`] — before touching disk or memory —
    /// when the free space cannot hold the batch plus any wrap padding.
    pub fn append_many(&mut self, ops: &[(OpKind, &[u8], &[u8])]) -> Result<u64, WalError> {
        if ops.is_empty() {
            return Ok(self.last_lsn);
        }

        let mut encoded = Vec::with_capacity(ops.len());
        let mut batch_bytes = 0u64;
        for (i, (op, key, value)) in ops.iter().enumerate() {
            let lsn = self.last_lsn + 1 + i as u64;
            let record = encode_record(lsn, *op, key, value);
            batch_bytes += record.len() as u64;
            encoded.push((lsn, record));
        }

        let needs_wrap = self.tail + batch_bytes > self.j_end;
        let pad_bytes = if needs_wrap { self.j_end - self.tail } else { 0 };

        // The ring cannot be handed out to the last byte: tail == head means
        // empty, so a batch that would consume all free space is rejected.
        if self.free() <= batch_bytes + pad_bytes {
            return Err(WalError::Full {
                needed: batch_bytes + pad_bytes,
                free: self.free(),
            });
        }

        let mut cursor = self.tail;
        if needs_wrap {
            self.write_pad(cursor, pad_bytes)?;
            trace!(at = cursor, bytes = pad_bytes, "journal wrap pad");
            cursor = self.j_start;
        }

        let mut ends = Vec::with_capacity(encoded.len());
        for (lsn, record) in &encoded {
            self.file.write_at(cursor, record)?;
            let end = cursor + record.len() as u64;
            // A batch never straddles the ring end, so only the final
            // record can land exactly on it.
            let normalized = if end == self.j_end { self.j_start } else { end };
            ends.push((*lsn, normalized));
            cursor = normalized;
        }

        self.file.sync()?;

        for (lsn, end) in ends {
            self.offsets.insert(lsn, end);
        }
        self.tail = cursor;
        self.last_lsn += ops.len() as u64;

        trace!(
            records = ops.len(),
            last_lsn = self.last_lsn,
            tail = self.tail,
            "journal append"
        );
        Ok(self.last_lsn)
    }

    /// Decode records from `from` for up to `max_bytes` bytes.
    ///
    /// PAD markers and truncated records terminate the scan cleanly — a
    /// partial trailing record is treated as not-present. The scan never
    /// wraps; wrapped journals take two scans (see [`Self::recover_scan`]).
    pub fn scan(&self, from: u64, max_bytes: u64) -> Result<Vec<WalRecord>, WalError> {
        let buf = self.file.read_at(from, max_bytes as usize)?;
        let mut records = Vec::new();
        let mut off = 0;
        loop {
            match parse_record(&buf, off)? {
                Parsed::Record(record, len) => {
                    records.push(record);
                    off += len;
                }
                Parsed::Pad | Parsed::End => break,
            }
        }
        Ok(records)
    }

    /// Boot-time scan of the whole live region in LSN order.
    ///
    /// Scans `head..jEnd` then `jStart..tail` when the ring is wrapped, and
    /// reinstates the LSN→offset map entry for every live record so that a
    /// later [`Self::checkpoint`] can truncate past replayed records.
    ///
    /// Also advances the LSN counter past the highest scanned record: a
    /// truncation taken mid-replay leaves the persisted checkpoint LSN
    /// behind the surviving journal tail, and fresh appends must not
    /// reassign those LSNs.
    pub fn recover_scan(&mut self) -> Result<Vec<WalRecord>, WalError> {
        let segments: [(u64, u64); 2] = if self.head <= self.tail {
            [(self.head, self.tail - self.head), (0, 0)]
        } else {
            [
                (self.head, self.j_end - self.head),
                (self.j_start, self.tail - self.j_start),
            ]
        };

        let mut records = Vec::new();
        for (seg_off, seg_len) in segments {
            if seg_len == 0 {
                continue;
            }
            let buf = self.file.read_exact_at(seg_off, seg_len as usize)?;
            let mut off = 0;
            loop {
                match parse_record(&buf, off)? {
                    Parsed::Record(record, len) => {
                        off += len;
                        let end = seg_off + off as u64;
                        let normalized = if end == self.j_end { self.j_start } else { end };
                        self.offsets.insert(record.lsn, normalized);
                        self.last_lsn = self.last_lsn.max(record.lsn);
                        records.push(record);
                    }
                    Parsed::Pad | Parsed::End => break,
                }
            }
        }

        info!(
            records = records.len(),
            head = self.head,
            tail = self.tail,
            "journal recovery scan"
        );
        Ok(records)
    }

    /// Truncate the journal up to and including `lsn`, publishing the new
    /// head through a superblock checkpoint.
    ///
    /// The LSN must be present in the offset map; this is the only path
    /// that moves the head.
    pub fn checkpoint(
        &mut self,
        lsn: u64,
        superblock: &mut SuperblockManager,
    ) -> Result<(), WalError> {
        let Some(&offset) = self.offsets.get(&lsn) else {
            return Err(WalError::LsnNotFound(lsn));
        };

        self.head = offset;
        self.offsets = self.offsets.split_off(&(lsn + 1));

        superblock.checkpoint(CheckpointUpdate {
            checkpoint_lsn: lsn,
            j_head: self.head,
            j_tail: self.tail,
        })?;

        info!(lsn, head = self.head, "journal checkpoint");
        Ok(())
    }

    /// Write the wrap marker covering `[at, at + len)` up to the ring end.
    ///
    /// The marker copies the last used LSN and consumes none. A remainder
    /// shorter than a header is zero-filled only.
    fn write_pad(&self, at: u64, len: u64) -> Result<(), WalError> {
        let mut buf = vec![0u8; len as usize];
        if len as usize >= RECORD_HEADER_SIZE {
            let mut header = Vec::with_capacity(RECORD_HEADER_SIZE);
            self.last_lsn.encode_to(&mut header);
            (OpKind::Pad as u8).encode_to(&mut header);
            0u32.encode_to(&mut header);
            0u32.encode_to(&mut header);
            buf[..RECORD_HEADER_SIZE].copy_from_slice(&header);
        }
        self.file.write_at(at, &buf)?;
        Ok(())
    }
}
