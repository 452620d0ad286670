//! Dual-slot superblock checkpoint protocol.
//!
//! Two identical-format superblock pages occupy the first two blocks of the
//! backing file. A checkpoint is persisted by writing the refreshed
//! superblock — with its epoch incremented — to the **inactive** slot,
//! fsyncing, and only then flipping the in-memory active pointer. A crash at
//! any point leaves at least one intact copy: on load, the slot with the
//! larger epoch wins, and a tie resolves to B.
//!
//! # On-disk layout (per slot, one block)
//!
//! ```text
//! [version u16][block_size u16][epoch u64][checkpoint_lsn u64][j_head u64][j_tail u64][zeros…]
//! ```
//!
//! A slot with `version == 0` or a `block_size` different from the global
//! block size is invalid; a zero-filled slot is therefore never selected.
//!
//! # Guarantees
//!
//! - **Monotone epochs** — every successful checkpoint strictly increases
//!   the epoch.
//! - **Crash atomicity** — a failed write or fsync of the inactive slot
//!   leaves the previously active slot untouched, so a subsequent load
//!   still returns the older, consistent state.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{CodecError, Decode, Encode};
use crate::io::{BlockFile, FileError};
use crate::layout::{BLOCK_SIZE, SUPER_A_OFF, SUPER_B_OFF};

/// Current superblock format version.
pub const SUPERBLOCK_VERSION: u16 = 1;

/// Encoded size of the superblock record (the rest of the slot is zero).
pub const SUPERBLOCK_ENCODED_LEN: usize = 36;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by superblock operations.
#[derive(Debug, Error)]
pub enum SuperblockError {
    /// Neither slot decodes to a valid superblock.
    #[error("no valid superblocks")]
    NoValidSuperblock,

    /// An operation requiring a loaded superblock ran before load/format.
    #[error("superblock manager not initialized")]
    NotInitialized,

    /// Underlying block I/O failure.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Encoding / decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

// ------------------------------------------------------------------------------------------------
// Superblock record
// ------------------------------------------------------------------------------------------------

/// One superblock copy: checkpoint state plus journal pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Format version; nonzero for a valid superblock.
    pub version: u16,

    /// Block size this file was formatted with. Must equal [`BLOCK_SIZE`].
    pub block_size: u16,

    /// Monotonically increasing checkpoint epoch.
    pub epoch: u64,

    /// Highest LSN covered by the last checkpoint (0 = none).
    pub checkpoint_lsn: u64,

    /// Absolute offset of the oldest live journal byte.
    pub j_head: u64,

    /// Absolute offset of the next journal write position.
    pub j_tail: u64,
}

impl Superblock {
    /// Whether this copy passes structural validation.
    pub fn is_valid(&self) -> bool {
        self.version != 0 && self.block_size as usize == BLOCK_SIZE
    }

    /// Encode into a full zero-padded slot page.
    pub fn encode_slot(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_SIZE);
        self.version.encode_to(&mut buf);
        self.block_size.encode_to(&mut buf);
        self.epoch.encode_to(&mut buf);
        self.checkpoint_lsn.encode_to(&mut buf);
        self.j_head.encode_to(&mut buf);
        self.j_tail.encode_to(&mut buf);
        debug_assert_eq!(buf.len(), SUPERBLOCK_ENCODED_LEN);
        buf.resize(BLOCK_SIZE, 0);
        buf
    }

    /// Decode from the beginning of a slot page.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut off = 0;
        let (version, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (block_size, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (epoch, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (checkpoint_lsn, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (j_head, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (j_tail, _) = u64::decode_from(&buf[off..])?;
        Ok(Self {
            version,
            block_size,
            epoch,
            checkpoint_lsn,
            j_head,
            j_tail,
        })
    }
}

/// Superblock slot identity. A/B alternation is the atomicity mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// First slot, block 0.
    A,
    /// Second slot, block 1.
    B,
}

impl Slot {
    /// Absolute file offset of the slot.
    pub fn offset(self) -> u64 {
        match self {
            Slot::A => SUPER_A_OFF,
            Slot::B => SUPER_B_OFF,
        }
    }

    /// The other slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Caller-supplied fields of a checkpoint; the manager assigns the epoch.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointUpdate {
    /// Highest durable LSN the checkpoint publishes.
    pub checkpoint_lsn: u64,

    /// New journal head.
    pub j_head: u64,

    /// Current journal tail.
    pub j_tail: u64,
}

// ------------------------------------------------------------------------------------------------
// SuperblockManager
// ------------------------------------------------------------------------------------------------

/// Owner of the in-memory superblock copy and the active-slot pointer.
#[derive(Debug)]
pub struct SuperblockManager {
    file: Arc<BlockFile>,
    current: Option<Superblock>,
    active: Slot,
}

impl SuperblockManager {
    /// A manager with no loaded state; call [`Self::format_initial`] or
    /// [`Self::load`] before anything else.
    pub fn new(file: Arc<BlockFile>) -> Self {
        Self {
            file,
            current: None,
            active: Slot::A,
        }
    }

    /// Format a fresh file: identical superblocks in both slots, one fsync
    /// after both writes. The active slot becomes A.
    pub fn format_initial(&mut self, journal_start: u64, epoch: u64) -> Result<(), SuperblockError> {
        let sb = Superblock {
            version: SUPERBLOCK_VERSION,
            block_size: BLOCK_SIZE as u16,
            epoch,
            checkpoint_lsn: 0,
            j_head: journal_start,
            j_tail: journal_start,
        };

        let page = sb.encode_slot();
        self.file.write_at(Slot::A.offset(), &page)?;
        self.file.write_at(Slot::B.offset(), &page)?;
        self.file.sync()?;

        self.current = Some(sb);
        self.active = Slot::A;
        info!(epoch, journal_start, "formatted initial superblocks");
        Ok(())
    }

    /// Load the newest valid copy of the two slots.
    ///
    /// The larger epoch wins; a tie resolves to B. Fails with
    /// [`SuperblockError::NoValidSuperblock`] when neither slot decodes to a
    /// valid record — a single corrupt copy is tolerated.
    pub fn load(&mut self) -> Result<Superblock, SuperblockError> {
        let a = self.read_slot(Slot::A)?;
        let b = self.read_slot(Slot::B)?;

        let (sb, slot) = match (a, b) {
            (Some(a), Some(b)) => {
                if a.epoch > b.epoch {
                    (a, Slot::A)
                } else {
                    (b, Slot::B)
                }
            }
            (Some(a), None) => {
                warn!("superblock slot B invalid, loading from A");
                (a, Slot::A)
            }
            (None, Some(b)) => {
                warn!("superblock slot A invalid, loading from B");
                (b, Slot::B)
            }
            (None, None) => return Err(SuperblockError::NoValidSuperblock),
        };

        self.current = Some(sb);
        self.active = slot;
        info!(
            epoch = sb.epoch,
            checkpoint_lsn = sb.checkpoint_lsn,
            slot = ?slot,
            "loaded superblock"
        );
        Ok(sb)
    }

    /// Persist a checkpoint: write the refreshed record — epoch incremented
    /// by one — to the inactive slot, fsync, then flip the active pointer.
    ///
    /// A failed write or fsync leaves the previously active slot intact, so
    /// a subsequent [`Self::load`] still returns the older state.
    pub fn checkpoint(&mut self, update: CheckpointUpdate) -> Result<(), SuperblockError> {
        let current = self.current.ok_or(SuperblockError::NotInitialized)?;

        let next = Superblock {
            version: current.version,
            block_size: current.block_size,
            epoch: current.epoch + 1,
            checkpoint_lsn: update.checkpoint_lsn,
            j_head: update.j_head,
            j_tail: update.j_tail,
        };

        let target = self.active.other();
        self.file.write_at(target.offset(), &next.encode_slot())?;
        self.file.sync()?;

        self.active = target;
        self.current = Some(next);
        info!(
            epoch = next.epoch,
            checkpoint_lsn = next.checkpoint_lsn,
            slot = ?target,
            "superblock checkpoint"
        );
        Ok(())
    }

    /// The last loaded or written superblock, if any.
    pub fn current(&self) -> Option<&Superblock> {
        self.current.as_ref()
    }

    /// The slot the in-memory view matches.
    pub fn active_slot(&self) -> Slot {
        self.active
    }

    /// Read one slot, returning `None` for an unreadable or invalid copy.
    fn read_slot(&self, slot: Slot) -> Result<Option<Superblock>, SuperblockError> {
        let page = match self.file.read_exact_at(slot.offset(), BLOCK_SIZE) {
            Ok(page) => page,
            Err(FileError::ShortRead { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match Superblock::decode(&page) {
            Ok(sb) if sb.is_valid() => Ok(Some(sb)),
            Ok(_) | Err(_) => Ok(None),
        }
    }
}
