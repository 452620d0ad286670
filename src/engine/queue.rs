//! The FIFO submission queue feeding the submission loop.
//!
//! Clients (and boot-time recovery) enqueue [`Operation`]s; the loop drains
//! them in bounded batches. A batch never mixes replayed and fresh
//! operations — replayed ones are already journaled and must not be
//! re-appended, and they form a strict prefix of the queue after recovery.

use std::collections::VecDeque;
use std::fmt;

use crate::wal::OpKind;

/// What an operation's completion continuation receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The result of a `get`: the stored bytes, empty for a missing or
    /// deleted key.
    Value(Vec<u8>),

    /// Acknowledgement of a `set`, `del`, or `check`.
    Done,
}

/// Completion continuation invoked during apply.
pub type Completion = Box<dyn FnOnce(Reply)>;

/// One submitted point operation.
pub struct Operation {
    /// Operation code; never [`OpKind::Pad`].
    pub op: OpKind,

    /// Raw key bytes.
    pub key: Vec<u8>,

    /// Raw value bytes (empty for ops without a value).
    pub value: Vec<u8>,

    /// Monotonic submission timestamp in nanoseconds.
    pub timestamp: u64,

    /// Journal LSN: assigned at append time for fresh operations, carried
    /// over from the scanned record for replayed ones. `None` until the
    /// operation has been journaled.
    pub lsn: Option<u64>,

    /// Whether this operation was re-enqueued by journal replay.
    pub replay: bool,

    /// Continuation to run once the operation is applied.
    pub on_complete: Option<Completion>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("op", &self.op)
            .field("key_len", &self.key.len())
            .field("value_len", &self.value.len())
            .field("timestamp", &self.timestamp)
            .field("lsn", &self.lsn)
            .field("replay", &self.replay)
            .field("has_completion", &self.on_complete.is_some())
            .finish()
    }
}

/// FIFO of pending operations.
#[derive(Debug, Default)]
pub struct SubmissionQueue {
    ops: VecDeque<Operation>,
}

impl SubmissionQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an operation at the back.
    pub fn push(&mut self, op: Operation) {
        self.ops.push_back(op);
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no operations are pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The replay flag of the front operation, if any.
    pub fn front_replay(&self) -> Option<bool> {
        self.ops.front().map(|op| op.replay)
    }

    /// Dequeue up to `max` operations, stopping early rather than mixing
    /// replayed and fresh operations in one batch.
    pub fn pop_batch(&mut self, max: usize) -> Vec<Operation> {
        let mut batch: Vec<Operation> = Vec::new();
        while batch.len() < max {
            let same_kind = match (self.ops.front(), batch.first()) {
                (Some(front), Some(first)) => front.replay == first.replay,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !same_kind {
                break;
            }
            match self.ops.pop_front() {
                Some(op) => batch.push(op),
                None => break,
            }
        }
        batch
    }
}
