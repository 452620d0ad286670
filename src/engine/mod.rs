//! # Submission Loop Engine
//!
//! The engine is the single mutator of all persistent state. Clients
//! enqueue point operations into a FIFO submission queue; the loop drains
//! them in bounded batches and drives every batch through a fixed pipeline:
//!
//! ```text
//! received → journaled → superblock-advanced → applied
//!          → [maybe: frozen → flushed → journal-truncated] → completed
//! ```
//!
//! 1. **Journal append** — the whole batch is appended to the ring journal
//!    with one fsync. Batches re-enqueued by boot-time recovery are already
//!    journaled and skip this step.
//! 2. **Superblock checkpoint** — the journal pointers and the last LSN are
//!    published through the dual-slot superblock, making the batch's
//!    durability visible to recovery.
//! 3. **Apply** — `set`/`del` mutate the memtable and acknowledge; `get`
//!    acknowledges with the cascaded read (memtable → frozen snapshot →
//!    level-0 tables, newest first); `check` truncates the journal at the
//!    current LSN. Replayed `get`/`check` records are explicit no-ops.
//! 4. **Freeze/flush** — when the memtable reaches its threshold it is
//!    cloned into a frozen snapshot, the live table is cleared, the
//!    snapshot becomes a level-0 table, and the journal is truncated past
//!    everything the new table covers.
//!
//! ## Concurrency model
//!
//! Single-threaded and cooperatively scheduled: the engine suspends only
//! inside positioned I/O and fsync. Within a batch, applies run strictly
//! after the journal fsync and superblock checkpoint have returned, so an
//! acknowledged operation is always recoverable. Across batches the order
//! is strict; there is no cross-batch reordering.
//!
//! ## Failure semantics
//!
//! A full journal and an exhausted table region are fatal for the process
//! (the database needs compaction or a larger journal); the loop surfaces
//! them to the driver. Short reads during the boot-time scan are treated
//! as end-of-log, never as errors.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

pub mod queue;
pub mod state;

pub use queue::{Completion, Operation, Reply, SubmissionQueue};
pub use state::{Lookup, LsmState};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, trace};

use crate::clock::{ClockError, MonotonicClock};
use crate::codec::{cmp16, sort_key16};
use crate::io::{BlockFile, FileError};
use crate::layout::{
    DATA_RECORD_HEADER_SIZE, DEFAULT_MEMTABLE_MAX, JOURNAL_OFF, MAX_BLOCK_RECORD_SIZE,
    MAX_INFLIGHT, MAX_KEY_SIZE, TABLE_REGION_OFF,
};
use crate::manifest::MANIFEST_VERSION;
use crate::superblock::{CheckpointUpdate, Superblock, SuperblockError, SuperblockManager};
use crate::table::iterator::TableIterator;
use crate::table::{TableError, TableStore};
use crate::wal::{OpKind, RingWal, WalError};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Superblock load or checkpoint failure.
    #[error("superblock error: {0}")]
    Superblock(#[from] SuperblockError),

    /// Journal append, scan, or truncation failure.
    #[error("journal error: {0}")]
    Wal(#[from] WalError),

    /// Table flush or manifest failure.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// Underlying block I/O failure.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Monotonic clock failure.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// A submitted key exceeds the on-disk key length field.
    #[error("key too large: {0} bytes")]
    KeyTooLarge(usize),

    /// A submitted record would not fit a single data block.
    #[error("record too large: {0} bytes")]
    RecordTooLarge(usize),

    /// The PAD opcode is reserved for the journal wrap marker.
    #[error("opcode PAD is reserved")]
    ReservedOpcode,
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Runtime-tunable engine settings.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Memtable entry-count threshold before freeze/flush.
    pub memtable_max: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memtable_max: DEFAULT_MEMTABLE_MAX,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

/// The storage engine: one backing file, one submission loop.
#[derive(Debug)]
pub struct Engine {
    file: Arc<BlockFile>,
    superblock: SuperblockManager,
    wal: RingWal,
    tables: TableStore,
    state: LsmState,
    queue: SubmissionQueue,
    clock: MonotonicClock,

    /// Highest LSN whose operation has been applied. During replay this
    /// lags the journal's restored counter until the backlog drains, and
    /// it — not the counter — bounds what a flush may truncate.
    applied_lsn: u64,

    /// Highest LSN already covered by a flushed table.
    last_flush_lsn: u64,
}

impl Engine {
    /// Open (or create) the database backed by the file at `path`.
    ///
    /// A fresh file is formatted: both superblocks, a zeroed journal
    /// region, an empty manifest, and the preallocated table region. An
    /// existing file is loaded from its newest valid superblock and the
    /// journal is replayed through the submission queue; replayed
    /// mutations are applied by the next loop iterations without being
    /// re-journaled.
    pub fn open<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self, EngineError> {
        let file = Arc::new(BlockFile::create(path.as_ref())?);
        let fresh = file.size()? == 0;

        let mut superblock = SuperblockManager::new(Arc::clone(&file));
        let mut tables = TableStore::new(Arc::clone(&file));
        let clock = MonotonicClock::new()?;

        if fresh {
            // Zero-fill superblocks, journal and manifest, then format.
            file.ensure_size(TABLE_REGION_OFF)?;
            superblock.format_initial(JOURNAL_OFF, 1)?;
            tables.format_initial(MANIFEST_VERSION, 1)?;

            info!(path = %path.as_ref().display(), "formatted fresh database");
            Ok(Self {
                wal: RingWal::new(Arc::clone(&file)),
                file,
                superblock,
                tables,
                state: LsmState::new(config.memtable_max),
                queue: SubmissionQueue::new(),
                clock,
                applied_lsn: 0,
                last_flush_lsn: 0,
            })
        } else {
            let sb = superblock.load()?;
            let wal = RingWal::from_superblock(Arc::clone(&file), &sb);
            tables.load()?;
            let last_flush_lsn = tables.max_seq()?;

            let mut engine = Self {
                file,
                superblock,
                wal,
                tables,
                state: LsmState::new(config.memtable_max),
                queue: SubmissionQueue::new(),
                clock,
                applied_lsn: 0,
                last_flush_lsn,
            };
            engine.recover()?;
            info!(path = %path.as_ref().display(), "opened existing database");
            Ok(engine)
        }
    }

    // --------------------------------------------------------------------------------------------
    // Submission interface
    // --------------------------------------------------------------------------------------------

    /// Enqueue one operation for the submission loop.
    ///
    /// Rejects the reserved PAD opcode and operations whose key or whole
    /// record would overflow the on-disk format.
    pub fn submit(
        &mut self,
        op: OpKind,
        key: Vec<u8>,
        value: Vec<u8>,
        on_complete: Option<Completion>,
    ) -> Result<(), EngineError> {
        if op == OpKind::Pad {
            return Err(EngineError::ReservedOpcode);
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(EngineError::KeyTooLarge(key.len()));
        }
        let record = DATA_RECORD_HEADER_SIZE + key.len() + value.len();
        if record > MAX_BLOCK_RECORD_SIZE {
            return Err(EngineError::RecordTooLarge(record));
        }

        let timestamp = self.clock.now()?;
        self.queue.push(Operation {
            op,
            key,
            value,
            timestamp,
            lsn: None,
            replay: false,
            on_complete,
        });
        Ok(())
    }

    /// One submission-loop iteration; `Ok(false)` when the queue is empty.
    pub fn poll(&mut self) -> Result<bool, EngineError> {
        let mut batch = self.queue.pop_batch(MAX_INFLIGHT);
        if batch.is_empty() {
            return Ok(false);
        }
        trace!(ops = batch.len(), replay = batch[0].replay, "batch taken");

        if batch[0].replay {
            // Replayed operations are already journaled; once the replay
            // prefix drains, recovery is over.
            if self.queue.front_replay() != Some(true) {
                self.state.set_recover_flush(-1);
            }
        } else {
            let ops: Vec<(OpKind, &[u8], &[u8])> = batch
                .iter()
                .map(|op| (op.op, op.key.as_slice(), op.value.as_slice()))
                .collect();
            let last = self.wal.append_many(&ops)?;

            // Stamp each operation with the LSN the append assigned to it.
            let first = last + 1 - batch.len() as u64;
            for (i, op) in batch.iter_mut().enumerate() {
                op.lsn = Some(first + i as u64);
            }
        }

        self.superblock.checkpoint(CheckpointUpdate {
            checkpoint_lsn: self.wal.last_lsn(),
            j_head: self.wal.head(),
            j_tail: self.wal.tail(),
        })?;

        for op in batch {
            self.apply(op)?;
        }

        if self.state.needs_flush() {
            self.flush()?;
        }
        Ok(true)
    }

    /// Run loop iterations until the queue empties or the wall-clock
    /// budget elapses.
    pub fn run_for(&mut self, budget: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + budget;
        while Instant::now() < deadline {
            if !self.poll()? {
                break;
            }
        }
        Ok(())
    }

    /// Run loop iterations until the queue empties.
    pub fn drain(&mut self) -> Result<(), EngineError> {
        while self.poll()? {}
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Convenience operations (submit + drain)
    // --------------------------------------------------------------------------------------------

    /// Durably store `key → value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.submit(OpKind::Set, key.to_vec(), value.to_vec(), None)?;
        self.drain()
    }

    /// Durably delete `key` (tombstone insertion).
    pub fn delete(&mut self, key: &[u8]) -> Result<(), EngineError> {
        self.submit(OpKind::Del, key.to_vec(), Vec::new(), None)?;
        self.drain()
    }

    /// Read `key`; missing or deleted keys read as empty.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>, EngineError> {
        let slot = Rc::new(RefCell::new(Vec::new()));
        let capture = Rc::clone(&slot);
        self.submit(
            OpKind::Get,
            key.to_vec(),
            Vec::new(),
            Some(Box::new(move |reply| {
                if let Reply::Value(value) = reply {
                    *capture.borrow_mut() = value;
                }
            })),
        )?;
        self.drain()?;
        let value = slot.take();
        Ok(value)
    }

    /// Force a journal checkpoint at the current LSN.
    pub fn force_checkpoint(&mut self) -> Result<(), EngineError> {
        self.submit(OpKind::Check, Vec::new(), Vec::new(), None)?;
        self.drain()
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// The ring journal.
    pub fn wal(&self) -> &RingWal {
        &self.wal
    }

    /// The table store.
    pub fn tables(&mut self) -> &mut TableStore {
        &mut self.tables
    }

    /// The current superblock, if loaded.
    pub fn superblock(&self) -> Option<&Superblock> {
        self.superblock.current()
    }

    /// The volatile LSM state.
    pub fn state(&self) -> &LsmState {
        &self.state
    }

    /// Pending operations not yet drained.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    /// Re-enqueue every live journal record for replay.
    fn recover(&mut self) -> Result<(), EngineError> {
        let records = self.wal.recover_scan()?;
        if records.is_empty() {
            return Ok(());
        }

        let pre_recovery_lsn = self.wal.last_lsn();
        let count = records.len();
        for record in records {
            let timestamp = self.clock.now()?;
            self.queue.push(Operation {
                op: record.op,
                key: record.key,
                value: record.value,
                timestamp,
                lsn: Some(record.lsn),
                replay: true,
                on_complete: None,
            });
        }
        self.state.set_recover_flush(pre_recovery_lsn as i64);

        info!(records = count, pre_recovery_lsn, "journal replay enqueued");
        Ok(())
    }

    /// Apply one operation against the LSM state.
    fn apply(&mut self, op: Operation) -> Result<(), EngineError> {
        // The record is consumed here (no-op replays included); its LSN no
        // longer needs the journal once a later flush truncates up to it.
        if let Some(lsn) = op.lsn {
            self.applied_lsn = self.applied_lsn.max(lsn);
        }

        match op.op {
            OpKind::Set => {
                self.state.put(op.key, op.value);
                if let Some(done) = op.on_complete {
                    done(Reply::Done);
                }
            }
            OpKind::Del => {
                self.state.delete(op.key);
                if let Some(done) = op.on_complete {
                    done(Reply::Done);
                }
            }
            OpKind::Get => {
                // Replayed reads have no caller; their replay is a no-op.
                if !op.replay {
                    let value = self.read(&op.key)?;
                    if let Some(done) = op.on_complete {
                        done(Reply::Value(value));
                    }
                }
            }
            OpKind::Check => {
                // Replayed checkpoints are no-ops as well.
                if !op.replay {
                    let lsn = self.wal.last_lsn();
                    self.wal.checkpoint(lsn, &mut self.superblock)?;
                    if let Some(done) = op.on_complete {
                        done(Reply::Done);
                    }
                }
            }
            OpKind::Pad => {
                // Unreachable: submit() refuses PAD and the scanner never
                // yields it.
            }
        }
        Ok(())
    }

    /// Cascaded point read: memtable → frozen snapshot → level-0 tables,
    /// newest first. Missing keys read as empty.
    fn read(&mut self, key: &[u8]) -> Result<Vec<u8>, EngineError> {
        match self.state.lookup(key) {
            Lookup::Found(value) => Ok(value),
            Lookup::Deleted => Ok(Vec::new()),
            Lookup::Unknown => {
                let token = sort_key16(key);
                let heads = self.tables.agg_heads(0)?;
                for head in heads.iter().rev() {
                    if cmp16(&token, &head.meta.min_key).is_lt()
                        || cmp16(&token, &head.meta.max_key).is_gt()
                    {
                        continue;
                    }
                    let mut iter = TableIterator::new(Arc::clone(&self.file), head);
                    if let Some(value) = iter.find(key)? {
                        return Ok(value);
                    }
                }
                Ok(Vec::new())
            }
        }
    }

    /// Freeze the memtable, flush it as a level-0 table, truncate the
    /// journal past everything the new table covers.
    ///
    /// The truncation target is the applied high-water mark, not the
    /// journal's LSN counter: mid-replay the counter already sits at the
    /// end of the whole backlog, and truncating that far would drop
    /// records whose only remaining copy is the volatile queue.
    fn flush(&mut self) -> Result<(), EngineError> {
        self.state.freeze();
        self.state.clear_live();

        let seq_min = self.last_flush_lsn + 1;
        let seq_max = self.applied_lsn;
        if let Some(snapshot) = self.state.frozen() {
            self.tables.flush_snapshot(snapshot, seq_min, seq_max)?;
        }

        self.wal.checkpoint(self.applied_lsn, &mut self.superblock)?;
        self.state.drop_frozen();
        self.last_flush_lsn = self.applied_lsn;

        info!(seq_min, seq_max, "memtable flushed and journal truncated");
        Ok(())
    }
}
