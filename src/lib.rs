//! # RingDB
//!
//! An embeddable, **single-file**, crash-recoverable key-value store built on
//! a **Log-Structured Merge Tree (LSM)** architecture. One regular file backs
//! the entire database: two alternating superblocks, a fixed-size ring-shaped
//! write-ahead journal, a manifest page, and a region of immutable sorted
//! tables.
//!
//! ## On-disk layout
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────┬───────────────┬──────────────────┐
//! │ Superblock A │ Superblock B │   Journal (ring)    │ Manifest page │  Table blobs …   │
//! │   [0, B)     │   [B, 2B)    │    [2B, 2B + J)     │  [.., .. + B) │ [.., region end) │
//! └──────────────┴──────────────┴─────────────────────┴───────────────┴──────────────────┘
//! ```
//!
//! `B` is the 4096-byte block size and `J` the journal size, both compiled-in
//! constants (see [`layout`]).
//!
//! ## Architecture
//!
//! Clients submit point operations (`set`, `del`, `get`, `check`) through a
//! FIFO submission queue. A single submission loop — the sole mutator of
//! persistent state — drains the queue in bounded batches and drives, in
//! order: journal append (one fsync per batch), superblock checkpoint
//! (epoch-ordered A/B flip), in-memory apply, and threshold-driven
//! freeze/flush of the memtable into a level-0 table followed by journal
//! truncation.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Submission queue, LSM state, and the submission loop |
//! | [`wal`] | Ring-shaped write-ahead journal with LSN tracking |
//! | [`superblock`] | Dual-slot superblock checkpoint protocol |
//! | [`manifest`] | Fixed-size manifest page codecs |
//! | [`table`] | Immutable sorted table writer, reader, and store |
//! | [`memtable`] | In-memory ordered write buffer with freeze semantics |
//! | [`io`] | Positioned block I/O over the backing file |
//! | [`codec`] | Little-endian wire primitives and the 16-byte sort key |
//! | [`layout`] | Compiled-in file-layout constants |
//! | [`clock`] | Monotonic timestamp source for submitted operations |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringdb::{Engine, EngineConfig};
//!
//! let mut engine = Engine::open("/tmp/my.db", EngineConfig::default()).unwrap();
//!
//! engine.put(b"hello", b"world").unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), b"world".to_vec());
//!
//! // Missing keys read as empty.
//! assert!(engine.get(b"absent").unwrap().is_empty());
//!
//! // Force a journal checkpoint.
//! engine.force_checkpoint().unwrap();
//! ```
//!
//! ## Key Properties
//!
//! - **Durability** — operations are acknowledged only after the journal
//!   append for their batch has been fsynced and published via a superblock
//!   checkpoint.
//! - **Crash recovery** — on open, the journal is replayed from the head
//!   recorded in the newest valid superblock; replayed mutations are not
//!   re-journaled.
//! - **Single mutator** — exactly one submission loop owns all mutable
//!   persistent state; readers over sealed tables never observe rewrites.

pub mod clock;
pub mod codec;
pub mod engine;
pub mod io;
pub mod layout;
pub mod manifest;
pub mod memtable;
pub mod superblock;
pub mod table;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError, Reply};
pub use wal::OpKind;
